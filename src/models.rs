//! Data models for feed records, reviewed items, and consolidated stories.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`FeedRecord`]: one normalized row from a feed CSV snapshot
//! - [`ReviewedItem`]: an item accepted by the review stage
//! - [`Story`]: a consolidated, categorized output unit
//! - [`DayCache`]: the per-day persisted state enabling idempotent reruns
//!
//! The reviewed/consolidated models use PascalCase field names to match the
//! JSON schema the generative model is instructed to emit, hence the
//! `#[serde(rename_all = "PascalCase")]` attributes.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A normalized article/post row from one feed source.
///
/// Created by parsing one CSV row, immutable after normalization. The `link`
/// is the record's external identity and the de-duplication key across runs;
/// `(title, link)` is the secondary de-duplication key within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedRecord {
    /// The article title/headline.
    pub title: String,
    /// Publication timestamp, timezone stripped so cross-source comparison
    /// is well-defined.
    pub published_at: NaiveDateTime,
    /// Display date in `YYYY-MM-DD` format, derived from `published_at`.
    pub date: String,
    /// Article description, possibly filled from the plain-text fallback
    /// column and truncated to at most 1000 characters.
    pub description: String,
    /// The article URL. Unique external identity of the record.
    pub link: String,
}

/// An item accepted by the review stage of the generative model.
///
/// Field names match the JSON keys the model is instructed to produce.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReviewedItem {
    pub title: String,
    pub description: String,
    pub link: String,
}

/// A consolidated, categorized story produced by the consolidation stage.
///
/// `links` holds 1-3 URLs, all drawn verbatim from [`ReviewedItem::link`]
/// values of the run's accumulated items, never synthesized. The guard in
/// [`crate::pipeline::sanitize_stories`] enforces this after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Story {
    pub title: String,
    /// Single high-level label. One real-world event maps to exactly one
    /// category section in the rendered digest.
    pub category: String,
    pub description: String,
    pub links: Vec<String>,
}

/// Persisted state for one calendar day.
///
/// Loaded at run start (empty if the file is absent), appended to during the
/// run, and serialized wholesale after a successful consolidation. A new
/// cache begins fresh on each new calendar day; there is no cross-day merge.
///
/// # Schema
///
/// The canonical field names are `valid_articles` and `reviewed_urls`,
/// versioned via `schema_version`. Older caches written with the legacy
/// `existing_data`/`processed_urls` names are accepted on load through serde
/// aliases but are always re-written in the canonical shape.
///
/// # Invariant
///
/// `reviewed_urls` is a superset of the links of `valid_articles` and of
/// every record considered this run, accepted or not. Once a link is seen in
/// a run it is never reconsidered that day.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DayCache {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(default, alias = "existing_data")]
    pub valid_articles: Vec<ReviewedItem>,
    #[serde(default, alias = "processed_urls")]
    pub reviewed_urls: Vec<String>,
}

fn schema_version() -> u32 {
    1
}

impl DayCache {
    pub fn new() -> Self {
        Self {
            schema_version: schema_version(),
            valid_articles: Vec::new(),
            reviewed_urls: Vec::new(),
        }
    }
}
