//! Per-day JSON cache persistence and the generation error log.
//!
//! The cache file is keyed by calendar date (`data_YYYY_MM_DD.json`) so each
//! day starts fresh. Saves replace the whole document atomically (write to a
//! temp file, then rename), and the caller only saves after a successful
//! consolidation, so a failed run never corrupts the day's cache.
//!
//! Malformed model responses are recorded verbatim in an append-only
//! `generation_error.log` next to the cache files for manual inspection.

use crate::models::DayCache;
use chrono::{Local, NaiveDate};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

const ERROR_LOG_FILE: &str = "generation_error.log";

/// Path of the cache file for one calendar day.
pub fn cache_path(data_dir: &str, date: NaiveDate) -> PathBuf {
    Path::new(data_dir).join(format!("data_{}.json", date.format("%Y_%m_%d")))
}

/// Load the cache for the given day.
///
/// An absent file yields an empty state. An unreadable or corrupt file is
/// logged and also yields an empty state: the run re-reviews the day's feeds
/// rather than aborting on a damaged cache.
#[instrument(level = "info", skip_all, fields(%data_dir, %date))]
pub async fn load_day_cache(data_dir: &str, date: NaiveDate) -> DayCache {
    let path = cache_path(data_dir, date);

    let raw = match fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No cache for today; starting fresh");
            return DayCache::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read day cache; starting fresh");
            return DayCache::new();
        }
    };

    match serde_json::from_str::<DayCache>(&raw) {
        Ok(cache) => {
            info!(
                path = %path.display(),
                articles = cache.valid_articles.len(),
                urls = cache.reviewed_urls.len(),
                "Loaded day cache"
            );
            cache
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt day cache; starting fresh");
            DayCache::new()
        }
    }
}

/// Persist the cache for the given day, pretty-printed, replacing the whole
/// document atomically.
#[instrument(level = "info", skip_all, fields(%data_dir, %date))]
pub async fn save_day_cache(
    data_dir: &str,
    date: NaiveDate,
    cache: &DayCache,
) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(data_dir).await?;

    let path = cache_path(data_dir, date);
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(cache)?;

    fs::write(&tmp_path, json).await?;
    fs::rename(&tmp_path, &path).await?;

    info!(
        path = %path.display(),
        articles = cache.valid_articles.len(),
        urls = cache.reviewed_urls.len(),
        "Wrote day cache"
    );
    Ok(())
}

/// Append a malformed prompt/response pair to the generation error log.
#[instrument(level = "info", skip_all, fields(%data_dir))]
pub async fn log_generation_error(
    data_dir: &str,
    prompt: &str,
    response: &str,
) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(data_dir).await?;
    let path = Path::new(data_dir).join(ERROR_LOG_FILE);

    let entry = format!(
        "Error occurred at {}:\nPROMPT:\n{}\nRESPONSE:\n{}\n",
        Local::now(),
        prompt,
        response
    );

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(entry.as_bytes()).await?;
    file.flush().await?;

    info!(path = %path.display(), "Recorded generation error");
    Ok(())
}
