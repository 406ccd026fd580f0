//! Article body extraction.
//!
//! Linked articles live on many different publisher sites, so extraction is
//! a chain of common selectors rather than anything site-specific.

use crate::browser::PageSource;
use crate::scrapers::cards::visible_text;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const UNTITLED: &str = "Untitled";

static TITLE_SELECTORS: Lazy<Vec<Selector>> =
    Lazy::new(|| selectors(&["h1", ".article-title", ".post-title", "title"]));

static BODY_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        "article",
        ".article-content",
        ".post-content",
        ".content",
        "main",
        ".rich-text",
    ])
});

static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("static selector"));

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter()
        .map(|css| Selector::parse(css).expect("static selector"))
        .collect()
}

/// Title and body text of an article page as
/// `Title: {title}\n\nContent:\n{body}`.
///
/// The body comes from the first container selector present in the page;
/// when that yields nothing, every non-empty paragraph is used instead.
pub fn extract_article_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let title = TITLE_SELECTORS
        .iter()
        .flat_map(|sel| document.select(sel))
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    let mut body = BODY_SELECTORS
        .iter()
        .find_map(|sel| document.select(sel).next())
        .map(visible_text)
        .unwrap_or_default();

    if body.is_empty() {
        body = document
            .select(&PARAGRAPH)
            .map(|p| p.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
    }

    format!("Title: {title}\n\nContent:\n{body}")
}

/// Load `url` and extract its text. Any failure yields an empty string.
#[instrument(level = "debug", skip(browser, timeout))]
pub async fn fetch_article_content(
    browser: &dyn PageSource,
    url: &str,
    timeout: Duration,
) -> String {
    match browser.page_html(url, timeout).await {
        Ok(html) => {
            let text = extract_article_text(&html);
            debug!(chars = text.len(), "Extracted article text");
            text
        }
        Err(e) => {
            warn!(%url, error = %e, "Article fetch failed");
            String::new()
        }
    }
}
