//! crates/marginalia_core/src/loader.rs
//!
//! Paginated block loading with look-ahead prefetch.
//!
//! The loader owns the session's page map and the token index derived from
//! it, tracks the highest contiguously requested page, and is the single
//! place where the reader's one-based visible page counter is translated to
//! the zero-based page numbers blocks are addressed by.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::Block;
use crate::error::FetchError;
use crate::ports::BackendService;
use crate::token::TokenIndex;

/// Page-distance from the loaded boundary that triggers the next batch.
pub const LOOKAHEAD_PAGES: u32 = 3;
/// Maximum pages fetched per batch (also the size of the initial load).
pub const BATCH_PAGES: u32 = 10;

pub struct BlockLoader {
    backend: Arc<dyn BackendService>,
    doc_id: String,
    total_pages: u32,
    /// Zero-based page number to the page's blocks, in render order.
    pages: BTreeMap<u32, Vec<Block>>,
    tokens: TokenIndex,
    highest_loaded_page: Option<u32>,
    /// Gates the prefetch trigger: only one batch fetch in flight at a time.
    fetch_in_flight: bool,
}

impl BlockLoader {
    pub fn new(backend: Arc<dyn BackendService>, doc_id: impl Into<String>, total_pages: u32) -> Self {
        Self {
            backend,
            doc_id: doc_id.into(),
            total_pages,
            pages: BTreeMap::new(),
            tokens: TokenIndex::new(),
            highest_loaded_page: None,
            fetch_in_flight: false,
        }
    }

    /// Loads the first batch, pages `0..=min(BATCH_PAGES - 1, last)`.
    pub async fn load_initial(&mut self) -> Result<(), FetchError> {
        if self.total_pages == 0 {
            return Ok(());
        }
        let end = (BATCH_PAGES - 1).min(self.total_pages - 1);
        self.load_range(0, end).await
    }

    /// Fetches all blocks whose page number falls in the inclusive
    /// zero-based range and merges them into the page map.
    ///
    /// All-or-nothing: a failed call commits no partial batch, and the
    /// loaded boundary does not advance.
    pub async fn load_range(&mut self, start_page: u32, end_page: u32) -> Result<(), FetchError> {
        self.fetch_in_flight = true;
        let result = self
            .backend
            .get_block_range(&self.doc_id, start_page, end_page)
            .await;
        self.fetch_in_flight = false;

        let blocks = result?;
        debug!(start_page, end_page, count = blocks.len(), "block range loaded");

        let mut by_page: BTreeMap<u32, Vec<Block>> = BTreeMap::new();
        for block in blocks {
            by_page.entry(block.page_number).or_default().push(block);
        }
        for (page, mut page_blocks) in by_page {
            page_blocks.sort_by_key(|b| b.block_order);
            for block in &page_blocks {
                self.tokens.insert_block(block);
            }
            self.pages.insert(page, page_blocks);
        }

        // Pages with no blocks still count as loaded: the boundary is the
        // end of the requested range, not the last non-empty page.
        let top = end_page.min(self.total_pages.saturating_sub(1));
        self.highest_loaded_page = Some(self.highest_loaded_page.map_or(top, |h| h.max(top)));
        Ok(())
    }

    /// Reacts to the reader's one-based visible page counter, issuing at
    /// most one look-ahead batch when the view nears the loaded boundary.
    ///
    /// Returns whether a batch was fetched.
    pub async fn visible_page_changed(&mut self, visible_page: u32) -> Result<bool, FetchError> {
        let Some((start, end)) = self.next_prefetch(visible_page) else {
            return Ok(false);
        };
        info!(start, end, "prefetching block range");
        self.load_range(start, end).await?;
        Ok(true)
    }

    /// The batch the prefetch policy calls for, if any. Suppressed while a
    /// fetch is already in flight.
    fn next_prefetch(&self, visible_page: u32) -> Option<(u32, u32)> {
        if self.fetch_in_flight {
            return None;
        }
        let highest = self.highest_loaded_page?;
        if highest >= self.total_pages - 1 {
            return None;
        }
        // One-based counter from the reader chrome; blocks are addressed
        // zero-based. This is the only place the offset is translated.
        let visible_index = visible_page.saturating_sub(1);
        if highest.saturating_sub(visible_index) > LOOKAHEAD_PAGES {
            return None;
        }
        let start = highest + 1;
        let end = (start + BATCH_PAGES - 1).min(self.total_pages - 1);
        Some((start, end))
    }

    /// Blocks of a zero-based page, in render order. `None` while unloaded.
    pub fn page_blocks(&self, page: u32) -> Option<&[Block]> {
        self.pages.get(&page).map(Vec::as_slice)
    }

    pub fn block(&self, block_id: &str) -> Option<&Block> {
        self.pages.values().flatten().find(|b| b.id == block_id)
    }

    pub fn tokens(&self) -> &TokenIndex {
        &self.tokens
    }

    pub fn highest_loaded_page(&self) -> Option<u32> {
        self.highest_loaded_page
    }

    pub fn is_fetch_in_flight(&self) -> bool {
        self.fetch_in_flight
    }

    /// Substitutes the two replacement blocks a backend split returned for
    /// the original, preserving render position.
    pub fn replace_block(&mut self, old_id: &str, first: Block, second: Block) {
        let slot = self.pages.iter().find_map(|(page, blocks)| {
            blocks
                .iter()
                .position(|b| b.id == old_id)
                .map(|pos| (*page, pos))
        });
        let Some((page, pos)) = slot else {
            warn!(old_id, "split replacement for a block that is not loaded");
            return;
        };

        self.tokens.remove_block(old_id);
        self.tokens.insert_block(&first);
        self.tokens.insert_block(&second);

        if let Some(blocks) = self.pages.get_mut(&page) {
            blocks.remove(pos);
            blocks.insert(pos, second);
            blocks.insert(pos, first);
        }
    }
}
