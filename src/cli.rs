//! Command-line interface definitions for the digest generator.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Credentials and the model name can be provided via environment variables
//! (a `.env` file is loaded before parsing).

use clap::Parser;

/// Command-line arguments for the feed digest generator.
///
/// # Examples
///
/// ```sh
/// # Basic usage with a feed list and credentials from the environment
/// feed_digest --feeds-file feeds.txt
///
/// # Wider lookback window and a custom output path
/// feed_digest --feeds-file feeds.txt --days-back 3 --output public/index.html
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a text file listing feed CSV URLs, one per line.
    /// Blank lines and lines starting with '#' are ignored.
    #[arg(short, long)]
    pub feeds_file: String,

    /// Lookback window in days for the recency filter
    #[arg(long, default_value_t = 1)]
    pub days_back: i64,

    /// Maximum number of records per review batch
    #[arg(long, default_value_t = 30)]
    pub batch_size: usize,

    /// Directory for the per-day JSON cache and the generation error log
    #[arg(short, long, default_value = "data")]
    pub data_dir: String,

    /// Path of the rendered HTML digest (overwritten wholesale each run)
    #[arg(short, long, default_value = "digest.html")]
    pub output: String,

    /// Generative model API key. The run fails fast if absent.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Generative model name
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-1.5-pro-latest")]
    pub model: String,
}
