//! services/client/src/bin/reader.rs
//!
//! A terminal front end for the reader engine: opens a document, renders one
//! page with its highlights, and prints the accumulated reading stats.

use std::sync::Arc;
use std::time::Duration;

use client_lib::{adapters::HttpBackend, config::Config, error::AppError};
use marginalia_core::domain::{Block, BlockContent};
use marginalia_core::ports::BackendService;
use marginalia_core::session::ReaderSession;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let doc_id = args.next().ok_or_else(|| {
        AppError::Internal("usage: reader <document-id> [page]".to_string())
    })?;
    let visible_page: u32 = match args.next() {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Internal(format!("'{raw}' is not a page number")))?,
        None => 1,
    };
    if visible_page == 0 {
        return Err(AppError::Internal("pages are numbered from 1".to_string()));
    }

    // --- 2. Initialize the Backend Adapter ---
    let backend = Arc::new(HttpBackend::new(
        config.api_base_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
    )?) as Arc<dyn BackendService>;
    info!(api_base_url = %config.api_base_url, "backend adapter ready");

    // --- 3. Open the Reader Session ---
    let mut session = ReaderSession::open(backend, &doc_id, config.user_id.clone()).await?;
    let document = session.document();
    println!(
        "{} ({} pages, theme: {})",
        document.title, document.total_pages, document.theme
    );
    for entry in &document.toc {
        println!(
            "{}{} .... p{}",
            "  ".repeat(entry.level as usize),
            entry.title,
            entry.page + 1
        );
    }

    // --- 4. Render the Requested Page ---
    session.visible_page_changed(visible_page).await;
    let blocks: Vec<Block> = session.page_blocks(visible_page - 1).to_vec();
    println!("\n--- page {visible_page} ---");
    for block in &blocks {
        print_block(&session, block);
    }

    // --- 5. Reading Stats & Teardown ---
    if let Ok(stats) = session.reading_stats().await {
        println!(
            "\nread {}s across {} sessions",
            stats.total_seconds, stats.total_sessions
        );
    }
    session.close().await;
    Ok(())
}

/// Prints one block, marking highlighted tokens with brackets and noted
/// tokens with an asterisk.
fn print_block(session: &ReaderSession, block: &Block) {
    match &block.content {
        BlockContent::Image { path } => println!("[image: {path}]"),
        BlockContent::Text { words } => {
            let visuals = session.render_block(&block.id);
            let mut line = String::new();
            for (word, visual) in words.iter().zip(&visuals) {
                if !line.is_empty() && !line.ends_with('\n') {
                    line.push(' ');
                }
                if visual.fill.is_some() || visual.underline.is_some() {
                    line.push('[');
                    line.push_str(&word.text);
                    line.push(']');
                } else {
                    line.push_str(&word.text);
                }
                if visual.note.is_some() {
                    line.push('*');
                }
                if visual.line_break {
                    line.push('\n');
                }
            }
            println!("{line}");
        }
    }
}
