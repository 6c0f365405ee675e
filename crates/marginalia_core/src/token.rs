//! crates/marginalia_core/src/token.rs
//!
//! Token addressing. Every word is addressed by the `(block_id, word_index)`
//! pair; the pair is stable for the lifetime of the block and is the only
//! identity the engine ever uses for a word. Rendering is a pure projection
//! of the in-memory [`TokenIndex`]; token metadata is never looked up from
//! presentation state.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::{Block, Word};

/// The universal address of one word token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenAddress {
    pub block_id: String,
    /// Zero-based position within the owning block.
    pub word_index: usize,
}

impl TokenAddress {
    pub fn new(block_id: impl Into<String>, word_index: usize) -> Self {
        Self {
            block_id: block_id.into(),
            word_index,
        }
    }
}

impl fmt::Display for TokenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.block_id, self.word_index)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid token address: {0}")]
pub struct InvalidTokenAddress(pub String);

impl FromStr for TokenAddress {
    type Err = InvalidTokenAddress;

    /// Parses `{block_id}-{index}`. Block ids may themselves contain
    /// dashes, so the index is the last `-`-separated segment.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (block_id, index) = s
            .rsplit_once('-')
            .ok_or_else(|| InvalidTokenAddress(s.to_string()))?;
        if block_id.is_empty() {
            return Err(InvalidTokenAddress(s.to_string()));
        }
        let word_index = index
            .parse::<usize>()
            .map_err(|_| InvalidTokenAddress(s.to_string()))?;
        Ok(TokenAddress::new(block_id, word_index))
    }
}

/// Derives the ordered token addresses of a block.
///
/// Pure and total: a block with zero words (or an image block) yields an
/// empty token set, never an error.
pub fn tokens_for(block: &Block) -> Vec<TokenAddress> {
    (0..block.word_count())
        .map(|index| TokenAddress::new(block.id.clone(), index))
        .collect()
}

/// In-memory index from block id to its materialized words, populated as
/// blocks load.
#[derive(Debug, Default)]
pub struct TokenIndex {
    words: HashMap<String, Arc<[Word]>>,
}

impl TokenIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_block(&mut self, block: &Block) {
        self.words
            .insert(block.id.clone(), block.words().to_vec().into());
    }

    pub fn remove_block(&mut self, block_id: &str) {
        self.words.remove(block_id);
    }

    /// The full word list of a loaded block.
    pub fn block_words(&self, block_id: &str) -> Option<Arc<[Word]>> {
        self.words.get(block_id).cloned()
    }

    /// The word a token address points at, if its block is loaded.
    pub fn lookup(&self, addr: &TokenAddress) -> Option<&Word> {
        self.words
            .get(&addr.block_id)
            .and_then(|words| words.get(addr.word_index))
    }

    pub fn word_count(&self, block_id: &str) -> Option<usize> {
        self.words.get(block_id).map(|words| words.len())
    }
}
