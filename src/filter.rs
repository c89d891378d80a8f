//! Recency filtering and de-duplication of feed records.
//!
//! [`filter_records`] narrows the unified record set to candidates worth
//! sending to the review stage: recent, not previously reviewed, deduplicated
//! and carrying usable content. The function is pure (`now` is a parameter)
//! so every step is testable in isolation.

use crate::models::FeedRecord;
use chrono::{Duration, NaiveDateTime};
use itertools::Itertools;
use std::collections::HashSet;
use tracing::{debug, info, instrument};
use url::Url;

/// Filter and deduplicate records into the run's candidate set.
///
/// Steps, in order (the order matters):
/// 1. Keep only records with `published_at` in `[now - days_back, now]`
///    inclusive.
/// 2. Sort descending by `published_at` (stable).
/// 3. Drop exact full-record duplicates.
/// 4. Drop records whose `link` was already reviewed on a previous run today.
/// 5. Drop records sharing `(title, link)` with an earlier survivor.
/// 6. Drop records with an empty description, unless the link points at a
///    known micro-blog host whose value is in the link itself.
///
/// An empty result is a legitimate "nothing new" outcome, handled by the
/// caller as a clean early exit.
#[instrument(level = "info", skip_all, fields(input = records.len(), days_back))]
pub fn filter_records(
    records: Vec<FeedRecord>,
    reviewed_urls: &[String],
    days_back: i64,
    now: NaiveDateTime,
) -> Vec<FeedRecord> {
    // A window too large to represent degenerates to an unbounded lookback.
    let before = Duration::try_days(days_back).and_then(|d| now.checked_sub_signed(d));
    let reviewed: HashSet<&str> = reviewed_urls.iter().map(String::as_str).collect();

    let mut recent: Vec<FeedRecord> = records
        .into_iter()
        .filter(|r| before.is_none_or(|b| r.published_at >= b) && r.published_at <= now)
        .collect();
    recent.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    let candidates: Vec<FeedRecord> = recent
        .into_iter()
        .unique()
        .filter(|r| !reviewed.contains(r.link.as_str()))
        .unique_by(|r| (r.title.clone(), r.link.clone()))
        .filter(|r| !r.description.trim().is_empty() || is_social_link(&r.link))
        .collect();

    info!(count = candidates.len(), "Filtered candidate records");
    debug!(links = ?candidates.iter().map(|r| &r.link).collect::<Vec<_>>(), "Candidate links");
    candidates
}

/// Whether a link points at a known micro-blog host.
///
/// Posts from these hosts routinely ship without a description; they are
/// allowed through the empty-description filter because the link itself is
/// the content.
pub fn is_social_link(link: &str) -> bool {
    let Ok(url) = Url::parse(link) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();

    ["twitter.com", "x.com"]
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}
