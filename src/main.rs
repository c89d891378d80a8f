//! # Feed Digest
//!
//! A scheduled content digest generator: pulls article metadata from a fixed
//! set of RSS-derived CSV feeds, deduplicates against previously seen items,
//! asks a generative text model to review and consolidate newly-seen content
//! into categorized news stories, and renders the result as a static HTML
//! page plus a JSON cache for the next run.
//!
//! ## Usage
//!
//! ```sh
//! feed_digest --feeds-file feeds.txt --output public/digest.html
//! ```
//!
//! ## Architecture
//!
//! The application follows a linear pipeline:
//! 1. **Loading**: Fetch each feed CSV snapshot and normalize rows
//! 2. **Filtering**: Keep recent, unseen, deduplicated records with content
//! 3. **Review**: Send fixed-size batches to the model, merging accepted
//!    items sequentially (later batches see earlier batches' dedup state)
//! 4. **Consolidation**: One final model call merging everything accepted
//!    today into categorized stories (all-or-nothing)
//! 5. **Output**: Persist the day cache, then write the HTML digest
//!
//! Reruns within the same day are incremental and idempotent: the per-day
//! cache records every reviewed URL, so a link seen once is never sent to
//! the model again that day.

use chrono::Local;
use clap::Parser;
use std::collections::HashSet;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod api;
mod cli;
mod feeds;
mod filter;
mod models;
mod pipeline;
mod prompts;
mod render;
mod store;
mod utils;

use api::GeminiClient;
use cli::Cli;
use utils::ensure_writable_dir;

const FEED_FETCH_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // .env first: it may carry GEMINI_API_KEY and RUST_LOG
    dotenvy::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("feed_digest starting up");

    // Parse CLI. A missing API credential aborts here, before any work.
    let args = Cli::parse();
    debug!(
        ?args.feeds_file,
        args.days_back,
        args.batch_size,
        ?args.data_dir,
        ?args.output,
        "Parsed CLI arguments"
    );

    // Early check: ensure the data dir is writable
    if let Err(e) = ensure_writable_dir(&args.data_dir).await {
        error!(
            path = %args.data_dir,
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let now = Local::now().naive_local();
    let today = now.date();

    // ---- Load today's cache and feed list ----
    let mut cache = store::load_day_cache(&args.data_dir, today).await;
    let seen_titles: HashSet<String> = cache
        .valid_articles
        .iter()
        .map(|a| a.title.clone())
        .collect();

    let feed_urls = feeds::read_feed_list(&args.feeds_file).await?;
    if feed_urls.is_empty() {
        return Err(format!("feed list {} contains no sources", args.feeds_file).into());
    }
    info!(feeds = feed_urls.len(), "Loaded feed source list");

    // ---- Fetch and filter (any feed failure is fatal) ----
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(FEED_FETCH_TIMEOUT_SECS))
        .build()?;
    let records = feeds::fetch_feeds(&http, &feed_urls).await?;

    let candidates = filter::filter_records(records, &cache.reviewed_urls, args.days_back, now);
    if candidates.is_empty() {
        info!("No new candidate records; exiting");
        return Ok(());
    }

    // Every candidate counts as reviewed from here on, accepted or not.
    cache
        .reviewed_urls
        .extend(candidates.iter().map(|r| r.link.clone()));

    // ---- Review batches sequentially ----
    let client = api::with_backoff(GeminiClient::new(&args.model, &args.api_key)?);

    let batches = pipeline::chunk(candidates, args.batch_size);
    info!(batches = batches.len(), "Processing review batches");

    let outcome = pipeline::review_batches(&client, &batches, seen_titles, &args.data_dir).await;
    info!(
        accepted = outcome.accepted.len(),
        failed_batches = outcome.failed_batches,
        "Review stage complete"
    );
    cache.valid_articles.extend(outcome.accepted);

    if cache.valid_articles.is_empty() {
        info!("No valid articles accepted; exiting without output");
        return Ok(());
    }

    // ---- Consolidate (all-or-nothing) ----
    let stories = match pipeline::consolidate(&client, &cache.valid_articles, &args.data_dir).await
    {
        Ok(stories) => stories,
        Err(e) => {
            error!(error = %e, "Consolidation failed; aborting without writing any output");
            return Err(e);
        }
    };

    let known_links: HashSet<String> = cache
        .valid_articles
        .iter()
        .map(|a| a.link.clone())
        .collect();
    let stories = pipeline::sanitize_stories(stories, &known_links);
    if stories.is_empty() {
        error!("Consolidation produced no usable stories; aborting without writing any output");
        return Err("no usable stories after consolidation".into());
    }

    // ---- Persist cache, then render ----
    store::save_day_cache(&args.data_dir, today, &cache).await?;

    let html = render::render_digest(&stories, today);
    if let Some(parent) = Path::new(&args.output).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(&args.output, html).await?;
    info!(path = %args.output, stories = stories.len(), "Wrote digest HTML");

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
