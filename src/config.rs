//! Runtime settings.
//!
//! Everything that describes the target site (selectors, marker text, known
//! publishers) and every tuning constant for the pipeline lives here, so that
//! a markup change on the site is a config edit rather than a code edit.
//!
//! Settings are read from an optional YAML file. Every section and field has a
//! default, so an empty file (or no file at all) yields a working setup:
//!
//! ```yaml
//! site:
//!   base_url: https://www.theb2bvault.com/
//! processing:
//!   batch_size: 4
//! llm:
//!   model: sonar-pro
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

/// Top-level settings document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub site: SiteConfig,
    pub llm: LlmConfig,
    pub processing: ProcessingConfig,
}

/// Description of the scraped site and its markup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Display name used in report headers and artifact file names.
    pub name: String,
    pub base_url: String,
    /// One article card on a listing page.
    pub card_selector: String,
    /// Category labels inside a card.
    pub card_tag_selector: String,
    /// The "read full article" button inside a card.
    pub card_link_selector: String,
    /// Anchor texts accepted when the primary link selector finds nothing.
    pub link_text_fallbacks: Vec<String>,
    /// Attribute carrying the category name on tab anchors.
    pub tab_attribute: String,
    /// Text that precedes the publisher name in a card.
    pub publisher_marker: String,
    pub known_publishers: Vec<String>,
    pub default_tags: Vec<String>,
    /// Scrolling used when collecting a single category tab.
    #[serde(deserialize_with = "tab_scroll")]
    pub tab_scroll: ScrollPolicy,
    /// Scrolling used when sampling the homepage.
    #[serde(deserialize_with = "homepage_scroll")]
    pub homepage_scroll: ScrollPolicy,
    /// Page-load timeout for listing pages, in seconds.
    pub listing_timeout_secs: u64,
}

/// How long to keep scrolling a lazily-loaded listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScrollPolicy {
    /// Stop after this many consecutive scrolls that load no new cards.
    pub max_idle_scrolls: u32,
    /// Pause after each scroll, in milliseconds.
    pub pause_ms: u64,
}

pub const TAB_SCROLL: ScrollPolicy = ScrollPolicy {
    max_idle_scrolls: 20,
    pause_ms: 3000,
};

pub const HOMEPAGE_SCROLL: ScrollPolicy = ScrollPolicy {
    max_idle_scrolls: 3,
    pause_ms: 2000,
};

/// A scroll section as written in YAML; absent fields keep the section's
/// own default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScrollOverride {
    max_idle_scrolls: Option<u32>,
    pause_ms: Option<u64>,
}

impl ScrollOverride {
    fn over(self, base: ScrollPolicy) -> ScrollPolicy {
        ScrollPolicy {
            max_idle_scrolls: self.max_idle_scrolls.unwrap_or(base.max_idle_scrolls),
            pause_ms: self.pause_ms.unwrap_or(base.pause_ms),
        }
    }
}

fn tab_scroll<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<ScrollPolicy, D::Error> {
    Ok(ScrollOverride::deserialize(d)?.over(TAB_SCROLL))
}

fn homepage_scroll<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<ScrollPolicy, D::Error> {
    Ok(ScrollOverride::deserialize(d)?.over(HOMEPAGE_SCROLL))
}

/// Chat-completion endpoint used for summaries.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Retries on top of the first attempt. Zero means a single attempt.
    pub max_retries: usize,
    /// Only this many characters of article text are sent.
    pub max_input_chars: usize,
    /// Never serialized back out; supplied by `--api-key` / environment.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

/// Batch sizes and concurrency limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub batch_size: usize,
    pub summarize_workers: usize,
    /// How many articles the sequential fallback processes.
    pub fallback_limit: usize,
    /// Pause between articles in the sequential fallback, in milliseconds.
    pub fallback_pause_ms: u64,
    /// Article page-load timeout, in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "B2B Vault".to_string(),
            base_url: "https://www.theb2bvault.com/".to_string(),
            card_selector: "div.w-dyn-item".to_string(),
            card_tag_selector: "div.text-block-3".to_string(),
            card_link_selector: "a.button-primary-small".to_string(),
            link_text_fallbacks: to_strings(&["Read Full", "Read Article", "Full Article"]),
            tab_attribute: "data-w-tab".to_string(),
            publisher_marker: "Published by:".to_string(),
            known_publishers: to_strings(&[
                "ProductLed",
                "Growth Unhinged",
                "Gong",
                "Klue",
                "April Dunford",
                "Navattic",
                "Chili Piper",
                "Trigify",
                "HeyReach",
                "MRR Unlocked",
                "HockeyStack",
                "Crossbeam",
                "UserGems",
                "The CMO",
                "Marketing Week",
                "Demand Curve",
            ]),
            default_tags: crate::scrapers::tags::DEFAULT_TAGS
                .iter()
                .map(|t| t.to_string())
                .collect(),
            tab_scroll: TAB_SCROLL,
            homepage_scroll: HOMEPAGE_SCROLL,
            listing_timeout_secs: 30,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.perplexity.ai/chat/completions".to_string(),
            model: "sonar".to_string(),
            timeout_secs: 15,
            max_tokens: 600,
            temperature: 0.5,
            max_retries: 0,
            max_input_chars: 4000,
            api_key: None,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            summarize_workers: 5,
            fallback_limit: 10,
            fallback_pause_ms: 1000,
            fetch_timeout_secs: 20,
        }
    }
}

impl SiteConfig {
    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_secs)
    }

    /// File-name friendly form of the site name, e.g. `b2b_vault`.
    pub fn slug(&self) -> String {
        crate::utils::slugify_title(&self.name).replace('-', "_")
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ProcessingConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Settings {
    /// Load settings from `path`, or defaults when no path is given.
    ///
    /// A missing file named explicitly is an error; zero-sized batches are
    /// clamped to one so the pipeline can always make progress.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)?;
                let parsed = Self::from_yaml(&raw)?;
                info!(path = %p.display(), "Loaded settings file");
                parsed
            }
            None => Settings::default(),
        };
        settings.processing.batch_size = settings.processing.batch_size.max(1);
        settings.processing.summarize_workers = settings.processing.summarize_workers.max(1);
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.site.base_url)?;
        Url::parse(&self.llm.endpoint)?;
        if self.site.card_selector.trim().is_empty() {
            return Err(Error::Config("site.card_selector must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Settings::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
