//! Prompt construction for the review and consolidation stages.
//!
//! Prompts are built deterministically: the same batch always produces the
//! same prompt text, byte for byte.

use crate::models::FeedRecord;
use std::fmt::Write;

/// Separator between records in a review prompt.
const RECORD_SEPARATOR: &str = "\n--------------------\n";

const REVIEW_PROMPT: &str = "Please review the following content published recently and combine \
into a concise list of core events, news items, or other important updates.
Please follow the following guidelines:
1. Ignore content that is promotional or not serious.
2. Be thorough and attempt to cover as many new items as possible.
3. Items should be relevant to digital marketing, SEO, and paid marketing.
4. Pick the best example where there are duplicate items covering the same content.
5. Provide a link to the source of the content.
6. DO NOT include any markdown formatting in your response, otherwise it will be interpreted as an error.

Output should be valid JSON with a list of objects with the following keys:
- Title
- Description
- Link

Content:
{content}

Valid JSON:
";

const CONSOLIDATE_PROMPT: &str = "Please consolidate the following reviewed news items into a \
final list of distinct stories.
Please follow the following guidelines:
1. Merge items covering the same real-world event into a single story.
2. Assign each story exactly one high-level category; never split one event across two categories.
3. Keep descriptions concise and factual.
4. Include 1 to 3 source links per story, copied verbatim from the Link values of the input items. Never invent links.
5. DO NOT include any markdown formatting in your response, otherwise it will be interpreted as an error.

Output should be valid JSON with a list of objects with the following keys:
- Title
- Category
- Description
- Links (a list of 1 to 3 URLs)

Items:
{content}

Valid JSON:
";

/// Format a batch of records into the prompt's content block.
///
/// One block per record (`Title`, date, description, `Source: link`), joined
/// with a fixed separator.
pub fn format_records(records: &[FeedRecord]) -> String {
    let mut blocks = Vec::with_capacity(records.len());
    for r in records {
        let mut block = String::new();
        write!(
            block,
            "{}\n{}\n{}\nSource: {}",
            r.title, r.date, r.description, r.link
        )
        .unwrap();
        blocks.push(block);
    }
    blocks.join(RECORD_SEPARATOR)
}

/// Build the review prompt for one batch of candidate records.
pub fn review_prompt(batch: &[FeedRecord]) -> String {
    REVIEW_PROMPT.replace("{content}", &format_records(batch))
}

/// Build the consolidation prompt from the accumulated items, serialized as
/// pretty-printed JSON.
pub fn consolidate_prompt(items_json: &str) -> String {
    CONSOLIDATE_PROMPT.replace("{content}", items_json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

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

    #[test]
    fn test_format_records_separator_and_fields() {
        let batch = vec![
            record("First", "https://a.com/1"),
            record("Second", "https://a.com/2"),
        ];
        let out = format_records(&batch);
        assert_eq!(
            out,
            "First\n2025-05-06\ndesc\nSource: https://a.com/1\
             \n--------------------\n\
             Second\n2025-05-06\ndesc\nSource: https://a.com/2"
        );
    }

    #[test]
    fn test_format_records_is_deterministic() {
        let batch = vec![record("First", "https://a.com/1")];
        assert_eq!(format_records(&batch), format_records(&batch));
    }

    #[test]
    fn test_review_prompt_embeds_content() {
        let batch = vec![record("Headline", "https://a.com/1")];
        let prompt = review_prompt(&batch);
        assert!(prompt.contains("Headline"));
        assert!(prompt.contains("Source: https://a.com/1"));
        assert!(!prompt.contains("{content}"));
    }

    #[test]
    fn test_consolidate_prompt_embeds_json() {
        let prompt = consolidate_prompt("[{\"Title\": \"T\"}]");
        assert!(prompt.contains("[{\"Title\": \"T\"}]"));
        assert!(prompt.contains("Links (a list of 1 to 3 URLs)"));
        assert!(!prompt.contains("{content}"));
    }
}
