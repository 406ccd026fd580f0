//! Category tag enumeration.
//!
//! Tags come either from the built-in list or from the tab anchors on the
//! live listing page. Live discovery never fails: any error, or a page with
//! no tabs, falls back to the configured defaults.

use crate::browser::{ListingRequest, PageSource};
use crate::config::{ScrollPolicy, SiteConfig};
use crate::error::Result;
use crate::scrapers::cards::parse_selector;
use itertools::Itertools;
use scraper::Html;
use std::collections::BTreeSet;
use tracing::{info, instrument, warn};

/// Pseudo-tag that stands for every available tag.
pub const ALL_TAGS: &str = "All";

/// Categories the site is known to have.
pub const DEFAULT_TAGS: &[&str] = &[
    "Content Marketing",
    "Demand Generation",
    "ABM & GTM",
    "Paid Marketing",
    "Marketing Ops",
    "Event Marketing",
    "AI",
    "Product Marketing",
    "Sales",
    "General",
    "Affiliate & Partnerships",
    "Copy & Positioning",
    "Leadership",
    "Strategy",
    "Customer Success",
    "Operations",
    "Finance",
    "HR",
    "Technology",
];

/// Tab names carried by `a[{attribute}]` anchors, de-duplicated and sorted.
pub fn parse_tab_names(html: &str, attribute: &str) -> Result<Vec<String>> {
    let selector = parse_selector(&format!("a[{attribute}]"))?;
    let document = Html::parse_document(html);
    let names: BTreeSet<String> = document
        .select(&selector)
        .filter_map(|a| a.value().attr(attribute))
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect();
    Ok(names.into_iter().collect())
}

/// Query the live site for its tabs, falling back to `site.default_tags`.
#[instrument(level = "info", skip_all, fields(url = %site.base_url))]
pub async fn discover_tags(browser: &dyn PageSource, site: &SiteConfig) -> Vec<String> {
    let request = ListingRequest {
        url: site.base_url.clone(),
        tab: None,
        tab_attribute: site.tab_attribute.clone(),
        card_selector: site.card_selector.clone(),
        scroll: ScrollPolicy {
            max_idle_scrolls: 0,
            pause_ms: 0,
        },
        timeout: site.listing_timeout(),
    };

    let found = match browser.listing_html(&request).await {
        Ok(html) => parse_tab_names(&html, &site.tab_attribute),
        Err(e) => Err(e),
    };

    match found {
        Ok(tags) if !tags.is_empty() => {
            info!(count = tags.len(), "Discovered tags from site");
            tags
        }
        Ok(_) => {
            warn!("No tabs found on page; using default tag list");
            site.default_tags.clone()
        }
        Err(e) => {
            warn!(error = %e, "Tag discovery failed; using default tag list");
            site.default_tags.clone()
        }
    }
}

/// Resolve a user selection against the available tags.
///
/// [`ALL_TAGS`] anywhere in the selection expands to every available tag;
/// otherwise the selection is kept in order with blanks and duplicates
/// removed.
pub fn expand_selection(selected: &[String], available: &[String]) -> Vec<String> {
    if selected.iter().any(|t| t.trim() == ALL_TAGS) {
        return available
            .iter()
            .filter(|t| t.as_str() != ALL_TAGS)
            .cloned()
            .collect();
    }
    selected
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .unique()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fakes::FakePages;

    const TABS_HTML: &str = r#"
        <div class="w-tab-menu">
          <a data-w-tab="Sales" class="w-tab-link">Sales</a>
          <a data-w-tab="AI" class="w-tab-link">AI</a>
          <a data-w-tab="ABM & GTM" class="w-tab-link">ABM &amp; GTM</a>
          <a data-w-tab="Sales" class="w-tab-link">Sales</a>
          <a data-w-tab=" " class="w-tab-link">blank</a>
          <a href="/about">About</a>
        </div>"#;

    #[test]
    fn test_parse_tab_names() {
        let names = parse_tab_names(TABS_HTML, "data-w-tab").unwrap();
        assert_eq!(names, vec!["ABM & GTM", "AI", "Sales"]);
    }

    #[tokio::test]
    async fn test_discover_tags_live() {
        let pages = FakePages {
            listing: TABS_HTML.to_string(),
            ..Default::default()
        };
        let tags = discover_tags(&pages, &SiteConfig::default()).await;
        assert_eq!(tags, vec!["ABM & GTM", "AI", "Sales"]);
    }

    #[tokio::test]
    async fn test_discover_tags_falls_back_when_empty() {
        let pages = FakePages {
            listing: "<html><body>maintenance</body></html>".to_string(),
            ..Default::default()
        };
        let site = SiteConfig::default();
        let tags = discover_tags(&pages, &site).await;
        assert_eq!(tags, site.default_tags);
    }

    #[tokio::test]
    async fn test_discover_tags_falls_back_on_error() {
        let mut site = SiteConfig::default();
        site.tab_attribute = "data-[broken".to_string();
        let pages = FakePages {
            listing: TABS_HTML.to_string(),
            ..Default::default()
        };
        let tags = discover_tags(&pages, &site).await;
        assert_eq!(tags.len(), DEFAULT_TAGS.len());
    }

    #[test]
    fn test_expand_selection_all() {
        let available: Vec<String> = vec!["All".into(), "Sales".into(), "AI".into()];
        let picked = expand_selection(&["All".to_string()], &available);
        assert_eq!(picked, vec!["Sales", "AI"]);
    }

    #[test]
    fn test_expand_selection_dedupes() {
        let available: Vec<String> = vec!["Sales".into(), "AI".into()];
        let selected: Vec<String> = vec![" AI ".into(), "".into(), "AI".into(), "Sales".into()];
        assert_eq!(expand_selection(&selected, &available), vec!["AI", "Sales"]);
    }
}
