//! The review/consolidation pipeline core.
//!
//! Candidates are partitioned into fixed-size batches and reviewed strictly
//! sequentially: batch *i+1* is not sent until batch *i*'s response (or
//! failure) is fully handled, because the duplicate-title check depends on
//! the accumulated result of all prior batches in the same run. The
//! accumulator is threaded explicitly through the fold, never held as
//! ambient mutable state, so merge order is reproducible in tests.
//!
//! A failed batch (transport error after retries, or an unparseable reply)
//! contributes zero items and is recorded verbatim in the generation error
//! log; the remaining batches still run. Consolidation is the opposite:
//! all-or-nothing, since a partial story list would silently lose
//! cross-references between merged items.

use crate::api::{parse_item_list, GenerateContent};
use crate::models::{FeedRecord, ReviewedItem, Story};
use crate::prompts;
use crate::store::log_generation_error;
use crate::utils::truncate_for_log;
use std::collections::HashSet;
use std::error::Error;
use tracing::{info, instrument, warn};

/// Result of reviewing all batches of one run.
#[derive(Debug, Default)]
pub struct ReviewOutcome {
    /// Newly accepted items, in batch order, unique by title.
    pub accepted: Vec<ReviewedItem>,
    /// Number of batches that contributed nothing due to a failure.
    pub failed_batches: usize,
}

/// Split records into contiguous, order-preserving chunks of at most
/// `batch_size`. A zero batch size degenerates to a single chunk.
pub fn chunk(records: Vec<FeedRecord>, batch_size: usize) -> Vec<Vec<FeedRecord>> {
    if records.is_empty() {
        return Vec::new();
    }
    if batch_size == 0 {
        return vec![records];
    }
    records
        .chunks(batch_size)
        .map(|c| c.to_vec())
        .collect()
}

/// Review every batch sequentially, folding accepted items into an
/// accumulator.
///
/// `seen_titles` seeds the duplicate-title filter with titles already
/// accepted on earlier runs today; items the model re-accepts under a known
/// title are silently dropped. Later batches observe the dedup state left by
/// earlier batches.
#[instrument(level = "info", skip_all, fields(batches = batches.len()))]
pub async fn review_batches<C: GenerateContent>(
    client: &C,
    batches: &[Vec<FeedRecord>],
    mut seen_titles: HashSet<String>,
    data_dir: &str,
) -> ReviewOutcome {
    let mut outcome = ReviewOutcome::default();

    for (i, batch) in batches.iter().enumerate() {
        let prompt = prompts::review_prompt(batch);

        let raw = match client.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(batch = i, error = %e, "Review call failed; skipping batch");
                record_failure(data_dir, &prompt, &format!("(no response) {e}")).await;
                outcome.failed_batches += 1;
                continue;
            }
        };

        let items = match parse_item_list::<ReviewedItem>(&raw) {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    batch = i,
                    error = %e,
                    response_preview = %truncate_for_log(&raw, 300),
                    "Review reply was not a JSON list; skipping batch"
                );
                record_failure(data_dir, &prompt, &raw).await;
                outcome.failed_batches += 1;
                continue;
            }
        };

        let mut added = 0usize;
        for item in items {
            if seen_titles.insert(item.title.clone()) {
                outcome.accepted.push(item);
                added += 1;
            }
        }
        info!(batch = i, added, "Merged batch review results");
    }

    info!(
        accepted = outcome.accepted.len(),
        failed_batches = outcome.failed_batches,
        "Completed batch review"
    );
    outcome
}

/// Consolidate the full accumulated item list into categorized stories.
///
/// Invoked once, after all batches, over everything accepted today (not just
/// this run's additions). Any failure here is fatal for the run: the caller
/// must not write the cache or the HTML artifact.
#[instrument(level = "info", skip_all, fields(items = valid_articles.len()))]
pub async fn consolidate<C: GenerateContent>(
    client: &C,
    valid_articles: &[ReviewedItem],
    data_dir: &str,
) -> Result<Vec<Story>, Box<dyn Error>> {
    let items_json = serde_json::to_string_pretty(valid_articles)?;
    let prompt = prompts::consolidate_prompt(&items_json);

    let raw = match client.generate(&prompt).await {
        Ok(raw) => raw,
        Err(e) => {
            record_failure(data_dir, &prompt, &format!("(no response) {e}")).await;
            return Err(e);
        }
    };

    match parse_item_list::<Story>(&raw) {
        Ok(stories) => {
            info!(stories = stories.len(), "Consolidation produced stories");
            Ok(stories)
        }
        Err(e) => {
            warn!(
                error = %e,
                response_preview = %truncate_for_log(&raw, 300),
                "Consolidation reply was not a JSON list"
            );
            record_failure(data_dir, &prompt, &raw).await;
            Err(Box::new(e))
        }
    }
}

/// Enforce the link-fidelity invariant on consolidated stories.
///
/// Every story link must be one of the accumulated `ReviewedItem` links,
/// verbatim. Links the model invented are dropped, duplicates are collapsed
/// preserving order, and at most three links are kept per story. A story
/// left with no links is dropped entirely.
pub fn sanitize_stories(stories: Vec<Story>, known_links: &HashSet<String>) -> Vec<Story> {
    stories
        .into_iter()
        .filter_map(|mut story| {
            let mut kept = Vec::new();
            for link in story.links.drain(..) {
                if !known_links.contains(&link) {
                    warn!(title = %story.title, %link, "Dropping link not present in reviewed items");
                    continue;
                }
                if !kept.contains(&link) {
                    kept.push(link);
                }
            }
            kept.truncate(3);

            if kept.is_empty() {
                warn!(title = %story.title, "Dropping story with no verifiable links");
                return None;
            }
            story.links = kept;
            Some(story)
        })
        .collect()
}

async fn record_failure(data_dir: &str, prompt: &str, response: &str) {
    if let Err(e) = log_generation_error(data_dir, prompt, response).await {
        warn!(error = %e, "Failed to append to generation error log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn scratch_dir(label: &str) -> String {
        let n = DIR_SEQ.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir()
            .join(format!(
                "feed_digest_pipeline_{}_{}_{}",
                label,
                std::process::id(),
                n
            ))
            .to_string_lossy()
            .into_owned()
    }

    /// Queue-backed test double for the generative model.
    struct MockClient {
        responses: Mutex<VecDeque<Result<String, String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl MockClient {
        fn new(responses: Vec<Result<String, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl GenerateContent for MockClient {
        async fn generate(&self, prompt: &str) -> Result<String, Box<dyn Error>> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(raw)) => Ok(raw),
                Some(Err(e)) => Err(e.into()),
                None => Err("mock response queue is empty".into()),
            }
        }
    }

    fn record(title: &str, link: &str) -> FeedRecord {
        FeedRecord {
            title: title.to_string(),
            published_at: NaiveDate::from_ymd_opt(2025, 5, 6)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            date: "2025-05-06".to_string(),
            description: "desc".to_string(),
            link: link.to_string(),
        }
    }

    fn item_json(title: &str, link: &str) -> String {
        format!(
            "{{\"Title\": \"{title}\", \"Description\": \"d\", \"Link\": \"{link}\"}}"
        )
    }

    #[test]
    fn test_chunk_partitions_in_order() {
        let records: Vec<FeedRecord> = (0..7)
            .map(|i| record(&format!("t{i}"), &format!("https://a.com/{i}")))
            .collect();
        let batches = chunk(records, 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[2].len(), 1);
        assert_eq!(batches[0][0].title, "t0");
        assert_eq!(batches[2][0].title, "t6");
    }

    #[test]
    fn test_chunk_zero_size_is_one_batch() {
        let records = vec![record("a", "https://a.com/1"), record("b", "https://a.com/2")];
        let batches = chunk(records, 0);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[test]
    fn test_chunk_empty_input() {
        assert!(chunk(Vec::new(), 5).is_empty());
    }

    #[tokio::test]
    async fn test_review_merges_batches_unique_by_title() {
        let client = MockClient::new(vec![
            Ok(format!("[{}]", item_json("A", "https://a.com/1"))),
            Ok(format!(
                "[{}, {}]",
                item_json("A", "https://a.com/other"),
                item_json("B", "https://a.com/2")
            )),
        ]);
        let batches = vec![
            vec![record("a", "https://a.com/1")],
            vec![record("b", "https://a.com/2")],
        ];

        let outcome = review_batches(&client, &batches, HashSet::new(), &scratch_dir("merge")).await;

        let titles: Vec<&str> = outcome.accepted.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, ["A", "B"]);
        assert_eq!(outcome.failed_batches, 0);
    }

    #[tokio::test]
    async fn test_review_skips_titles_already_in_cache() {
        let client = MockClient::new(vec![Ok(format!(
            "[{}, {}]",
            item_json("Known", "https://a.com/1"),
            item_json("Fresh", "https://a.com/2")
        ))]);
        let batches = vec![vec![record("x", "https://a.com/1")]];
        let seen: HashSet<String> = ["Known".to_string()].into_iter().collect();

        let outcome = review_batches(&client, &batches, seen, &scratch_dir("seeded")).await;

        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].title, "Fresh");
    }

    // One bad batch out of three: the other two still contribute, and the
    // error log records exactly what was lost.
    #[tokio::test]
    async fn test_batch_failure_is_isolated_and_logged() {
        let dir = scratch_dir("isolated");
        let client = MockClient::new(vec![
            Ok(format!("[{}]", item_json("One", "https://a.com/1"))),
            Ok("{\"not\": \"a list\"}".to_string()),
            Ok(format!("[{}]", item_json("Three", "https://a.com/3"))),
        ]);
        let batches = vec![
            vec![record("one", "https://a.com/1")],
            vec![record("two", "https://a.com/2")],
            vec![record("three", "https://a.com/3")],
        ];

        let outcome = review_batches(&client, &batches, HashSet::new(), &dir).await;

        let titles: Vec<&str> = outcome.accepted.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, ["One", "Three"]);
        assert_eq!(outcome.failed_batches, 1);

        let log =
            std::fs::read_to_string(std::path::Path::new(&dir).join("generation_error.log"))
                .unwrap();
        assert_eq!(log.matches("Error occurred at").count(), 1);
        assert!(log.contains("Source: https://a.com/2"));
        assert!(log.contains("{\"not\": \"a list\"}"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    // A reply with a multibyte char straddling the log-preview cut point
    // must be skipped like any other unparseable reply, not panic the run.
    // A subscriber is installed so the warn! preview field is evaluated,
    // as it is in production.
    #[tokio::test]
    async fn test_multibyte_garbage_reply_is_skipped_not_fatal() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = scratch_dir("multibyte");
        let garbage = format!("{}é definitely not json", "x".repeat(299));
        let client = MockClient::new(vec![
            Ok(garbage.clone()),
            Ok(format!("[{}]", item_json("Two", "https://a.com/2"))),
        ]);
        let batches = vec![
            vec![record("one", "https://a.com/1")],
            vec![record("two", "https://a.com/2")],
        ];

        let outcome = review_batches(&client, &batches, HashSet::new(), &dir).await;

        assert_eq!(outcome.failed_batches, 1);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].title, "Two");

        let log =
            std::fs::read_to_string(std::path::Path::new(&dir).join("generation_error.log"))
                .unwrap();
        assert!(log.contains(&garbage));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_transport_failure_does_not_abort_run() {
        let client = MockClient::new(vec![
            Err("connection reset".to_string()),
            Ok(format!("[{}]", item_json("B", "https://a.com/2"))),
        ]);
        let batches = vec![
            vec![record("a", "https://a.com/1")],
            vec![record("b", "https://a.com/2")],
        ];
        let dir = scratch_dir("transport");

        let outcome = review_batches(&client, &batches, HashSet::new(), &dir).await;

        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.failed_batches, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_batches_are_sent_sequentially_in_order() {
        let client = MockClient::new(vec![Ok("[]".to_string()), Ok("[]".to_string())]);
        let batches = vec![
            vec![record("first", "https://a.com/1")],
            vec![record("second", "https://a.com/2")],
        ];

        review_batches(&client, &batches, HashSet::new(), &scratch_dir("order")).await;

        let prompts = client.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("first"));
        assert!(prompts[1].contains("second"));
    }

    #[tokio::test]
    async fn test_consolidate_parses_stories() {
        let client = MockClient::new(vec![Ok(
            "[{\"Title\": \"S\", \"Category\": \"SEO\", \"Description\": \"d\", \
             \"Links\": [\"https://a.com/1\"]}]"
                .to_string(),
        )]);
        let items = vec![ReviewedItem {
            title: "S".to_string(),
            description: "d".to_string(),
            link: "https://a.com/1".to_string(),
        }];

        let stories = consolidate(&client, &items, &scratch_dir("consolidate"))
            .await
            .unwrap();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].category, "SEO");

        // The prompt carries the accumulated items as JSON.
        assert!(client.prompts()[0].contains("\"Title\": \"S\""));
    }

    #[tokio::test]
    async fn test_consolidate_failure_is_fatal_and_logged() {
        let dir = scratch_dir("consolidate_fail");
        let client = MockClient::new(vec![Ok("not json at all".to_string())]);
        let items = vec![ReviewedItem {
            title: "S".to_string(),
            description: "d".to_string(),
            link: "https://a.com/1".to_string(),
        }];

        assert!(consolidate(&client, &items, &dir).await.is_err());

        let log =
            std::fs::read_to_string(std::path::Path::new(&dir).join("generation_error.log"))
                .unwrap();
        assert!(log.contains("not json at all"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_sanitize_drops_invented_links_and_empty_stories() {
        let known: HashSet<String> =
            ["https://a.com/1".to_string(), "https://a.com/2".to_string()]
                .into_iter()
                .collect();
        let stories = vec![
            Story {
                title: "Good".to_string(),
                category: "SEO".to_string(),
                description: "d".to_string(),
                links: vec![
                    "https://a.com/1".to_string(),
                    "https://invented.example/zzz".to_string(),
                    "https://a.com/1".to_string(),
                    "https://a.com/2".to_string(),
                ],
            },
            Story {
                title: "All invented".to_string(),
                category: "SEO".to_string(),
                description: "d".to_string(),
                links: vec!["https://invented.example/abc".to_string()],
            },
        ];

        let out = sanitize_stories(stories, &known);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].links,
            vec!["https://a.com/1".to_string(), "https://a.com/2".to_string()]
        );
    }

    #[test]
    fn test_sanitize_caps_links_at_three() {
        let known: HashSet<String> = (0..5).map(|i| format!("https://a.com/{i}")).collect();
        let stories = vec![Story {
            title: "Busy".to_string(),
            category: "SEO".to_string(),
            description: "d".to_string(),
            links: (0..5).map(|i| format!("https://a.com/{i}")).collect(),
        }];

        let out = sanitize_stories(stories, &known);
        assert_eq!(out[0].links.len(), 3);
    }
}
