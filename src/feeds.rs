//! Feed loading and row normalization.
//!
//! Each feed source is an RSS-derived CSV snapshot fetched over HTTP with the
//! columns `Title, Date, Description, Plain Description, Link`. All sources
//! are concatenated into a single ordered record sequence; any unreachable or
//! malformed source fails the whole run (no partial-success policy).
//!
//! # Normalization
//!
//! Applied per row, in order:
//! 1. Parse `Date` into a calendar timestamp and strip the timezone so
//!    cross-source comparisons are well-defined.
//! 2. Fill an empty `Description` from the `Plain Description` fallback.
//! 3. Truncate the description to at most 1000 characters.
//! 4. Precompute the `YYYY-MM-DD` display date.

use crate::models::FeedRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use tracing::{debug, info, instrument};

const MAX_DESCRIPTION_CHARS: usize = 1000;

/// One raw CSV row as published by the feed export.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Description", default)]
    description: String,
    #[serde(rename = "Plain Description", default)]
    plain_description: String,
    #[serde(rename = "Link")]
    link: String,
}

/// A malformed feed row. Carries the source URL and row number for the log.
#[derive(Debug)]
pub struct MalformedRow {
    source: String,
    row: usize,
    reason: String,
}

impl fmt::Display for MalformedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed row {} in feed {}: {}",
            self.row, self.source, self.reason
        )
    }
}

impl Error for MalformedRow {}

/// Read the ordered feed source list from a text file.
///
/// One URL per line; blank lines and `#` comments are ignored.
pub async fn read_feed_list(path: &str) -> Result<Vec<String>, Box<dyn Error>> {
    let body = tokio::fs::read_to_string(path).await?;
    Ok(parse_feed_list(&body))
}

fn parse_feed_list(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Fetch every feed source and concatenate the normalized rows.
///
/// Sources are fetched and appended in the given order. The first source that
/// is unreachable, returns a non-success status, or contains a row that fails
/// normalization aborts the run.
#[instrument(level = "info", skip_all, fields(feed_count = urls.len()))]
pub async fn fetch_feeds(
    client: &reqwest::Client,
    urls: &[String],
) -> Result<Vec<FeedRecord>, Box<dyn Error>> {
    let mut records = Vec::new();

    for url in urls {
        let body = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let rows = parse_feed_csv(url, &body)?;
        debug!(%url, count = rows.len(), "Parsed feed snapshot");
        records.extend(rows);
    }

    info!(count = records.len(), "Loaded records from all feeds");
    Ok(records)
}

/// Parse one feed snapshot body into normalized records.
pub fn parse_feed_csv(source: &str, body: &str) -> Result<Vec<FeedRecord>, Box<dyn Error>> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let mut records = Vec::new();

    for (i, row) in reader.deserialize::<RawRow>().enumerate() {
        let row = row?;
        records.push(normalize_row(source, i + 1, row)?);
    }

    Ok(records)
}

fn normalize_row(source: &str, row_no: usize, row: RawRow) -> Result<FeedRecord, Box<dyn Error>> {
    let malformed = |reason: &str| MalformedRow {
        source: source.to_string(),
        row: row_no,
        reason: reason.to_string(),
    };

    if row.title.trim().is_empty() {
        return Err(Box::new(malformed("empty Title")));
    }
    if row.link.trim().is_empty() {
        return Err(Box::new(malformed("empty Link")));
    }

    let published_at = match parse_feed_date(&row.date) {
        Some(dt) => dt,
        None => {
            return Err(Box::new(malformed(&format!(
                "unparseable Date {:?}",
                row.date
            ))));
        }
    };

    let mut description = if row.description.trim().is_empty() {
        row.plain_description
    } else {
        row.description
    };
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        description = description.chars().take(MAX_DESCRIPTION_CHARS).collect();
    }

    Ok(FeedRecord {
        title: row.title,
        date: published_at.format("%Y-%m-%d").to_string(),
        published_at,
        description,
        link: row.link,
    })
}

/// Parse a feed date string into a naive timestamp.
///
/// Feed exports are not consistent about their date format, so several are
/// tried in order: RFC 3339, RFC 2822, then common naive layouts. For zoned
/// inputs the offset is stripped and the wall-clock reading kept, matching
/// how dates are displayed at the source.
pub fn parse_feed_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }

    None
}
