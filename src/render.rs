//! Static HTML rendering of the consolidated digest.
//!
//! Pure presentation: the renderer takes the final story list and a date and
//! produces one standalone HTML document, grouped by category. Its one
//! load-bearing rule is that every `href` it emits comes verbatim from
//! [`Story::links`]; links are never inferred or modified here.

use crate::models::Story;
use chrono::NaiveDate;
use html_escape::{encode_double_quoted_attribute, encode_text};
use std::collections::BTreeMap;
use std::fmt::Write;
use tracing::{info, instrument};

/// Render the digest page for one day.
///
/// Stories are grouped by category; each category appears exactly once, in
/// alphabetical order, and each story appears under exactly one category.
#[instrument(level = "info", skip_all, fields(stories = stories.len(), %date))]
pub fn render_digest(stories: &[Story], date: NaiveDate) -> String {
    let mut by_category: BTreeMap<&str, Vec<&Story>> = BTreeMap::new();
    for story in stories {
        by_category
            .entry(story.category.as_str())
            .or_default()
            .push(story);
    }

    let mut html = String::new();
    writeln!(html, "<!DOCTYPE html>").unwrap();
    writeln!(html, "<html lang=\"en\">").unwrap();
    writeln!(html, "<head>").unwrap();
    writeln!(html, "<meta charset=\"utf-8\">").unwrap();
    writeln!(
        html,
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">"
    )
    .unwrap();
    writeln!(html, "<title>News Digest {}</title>", date.format("%Y-%m-%d")).unwrap();
    writeln!(html, "<style>").unwrap();
    writeln!(
        html,
        "body {{ font-family: system-ui, sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; line-height: 1.5; }}"
    )
    .unwrap();
    writeln!(html, "h2 {{ border-bottom: 1px solid #ccc; padding-bottom: 0.25rem; }}").unwrap();
    writeln!(html, "article {{ margin-bottom: 1.5rem; }}").unwrap();
    writeln!(html, "ul.links {{ font-size: 0.9rem; }}").unwrap();
    writeln!(html, "</style>").unwrap();
    writeln!(html, "</head>").unwrap();
    writeln!(html, "<body>").unwrap();
    writeln!(html, "<h1>News Digest</h1>").unwrap();
    writeln!(html, "<p class=\"date\">{}</p>", date.format("%Y-%m-%d")).unwrap();

    for (category, stories) in &by_category {
        writeln!(html, "<section>").unwrap();
        writeln!(html, "<h2>{}</h2>", encode_text(category)).unwrap();

        for story in stories {
            writeln!(html, "<article>").unwrap();
            writeln!(html, "<h3>{}</h3>", encode_text(&story.title)).unwrap();
            writeln!(html, "<p>{}</p>", encode_text(&story.description)).unwrap();
            writeln!(html, "<ul class=\"links\">").unwrap();
            for link in &story.links {
                writeln!(
                    html,
                    "<li><a href=\"{}\">{}</a></li>",
                    encode_double_quoted_attribute(link),
                    encode_text(link)
                )
                .unwrap();
            }
            writeln!(html, "</ul>").unwrap();
            writeln!(html, "</article>").unwrap();
        }

        writeln!(html, "</section>").unwrap();
    }

    writeln!(html, "</body>").unwrap();
    writeln!(html, "</html>").unwrap();

    info!(categories = by_category.len(), "Rendered digest document");
    html
}
