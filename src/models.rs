//! Data models for collected and processed articles.
//!
//! - [`Article`]: one card scraped from a listing page
//! - [`ProcessedArticle`]: an article with its fetched body and LLM summary
//! - [`RunOutcome`]: what a single pipeline run produced
//!
//! Records live only for the duration of a run and are written out in bulk
//! (JSON cache, PDF, dashboard) at the end. The URL is the only identity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Title used when no heuristic produced anything better.
pub const UNTITLED_ARTICLE: &str = "Untitled Article";
/// Publisher used when the card carries no recognizable publisher.
pub const UNKNOWN_PUBLISHER: &str = "Unknown Publisher";
/// Summary stored when the LLM call fails for any reason.
pub const ANALYSIS_FAILED: &str = "Analysis failed";

/// An article card as collected from a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Heuristically extracted title.
    pub title: String,
    /// Publisher name, or [`UNKNOWN_PUBLISHER`].
    pub publisher: String,
    /// Absolute URL of the full article.
    pub url: String,
    /// Category tab the card was collected under.
    pub tab: String,
    /// Local collection time, `YYYY-MM-DD HH:MM:SS`.
    pub scraped_at: String,
}

/// An article after its body was fetched and summarized.
///
/// Serializes flat: the article fields sit next to `content` and `summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedArticle {
    #[serde(flatten)]
    pub article: Article,
    /// Extracted page text, `Title: …\n\nContent:\n…`.
    pub content: String,
    /// LLM output, or [`ANALYSIS_FAILED`].
    pub summary: String,
}

impl ProcessedArticle {
    pub fn new(article: Article, content: String, summary: String) -> Self {
        Self {
            article,
            content,
            summary,
        }
    }

    /// Whitespace-separated words in the summary.
    pub fn summary_word_count(&self) -> usize {
        self.summary.split_whitespace().count()
    }

    /// First `max` characters of the summary, with `...` when cut.
    pub fn summary_preview(&self, max: usize) -> String {
        if self.summary.chars().count() > max {
            let head: String = self.summary.chars().take(max).collect();
            format!("{head}...")
        } else {
            self.summary.clone()
        }
    }
}

/// Distinct categories across a set of processed articles, sorted.
pub fn distinct_tabs(articles: &[ProcessedArticle]) -> BTreeSet<&str> {
    articles.iter().map(|a| a.article.tab.as_str()).collect()
}

/// Totals for one end-to-end run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Articles collected before processing.
    pub total_articles: usize,
    /// Articles that came back with a body and a summary.
    pub processed_articles: usize,
    pub pdf_path: Option<PathBuf>,
    pub website_path: Option<PathBuf>,
    /// Categories the run searched (empty for homepage sampling).
    pub selected_tags: Vec<String>,
    pub elapsed_secs: f64,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn article(n: usize) -> Article {
        Article {
            title: format!("How teams win deal number {n}"),
            publisher: "Gong".to_string(),
            url: format!("https://example.com/articles/{n}"),
            tab: if n % 2 == 0 { "Sales" } else { "AI" }.to_string(),
            scraped_at: "2025-06-30 16:12:38".to_string(),
        }
    }

    pub fn processed(n: usize) -> ProcessedArticle {
        ProcessedArticle::new(
            article(n),
            format!("Title: Article {n}\n\nContent:\nBody {n}"),
            format!("TL;DR: Article {n} explains pipeline reviews.\n1. Review weekly\n2. Track stages"),
        )
    }
}
