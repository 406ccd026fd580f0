//! Article collection from listing pages.
//!
//! Three entry points, all returning [`Article`]s unique by URL:
//!
//! - [`collect_tab`]: one category tab, cards filtered by their labels
//! - [`collect_all_tabs`]: several tabs in turn, failures skipped
//! - [`collect_homepage`]: the unfiltered homepage, randomly sampled

use crate::browser::{ListingRequest, PageSource};
use crate::config::{ScrollPolicy, SiteConfig};
use crate::error::Result;
use crate::models::Article;
use crate::scrapers::cards::{Card, card_publisher, card_title, parse_cards};
use crate::utils::local_timestamp;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use tracing::{debug, error, info, instrument};

/// Category assigned to homepage cards without a label.
pub const GENERAL_CATEGORY: &str = "General";

fn listing_request(site: &SiteConfig, tab: Option<&str>, scroll: ScrollPolicy) -> ListingRequest {
    ListingRequest {
        url: site.base_url.clone(),
        tab: tab.map(str::to_string),
        tab_attribute: site.tab_attribute.clone(),
        card_selector: site.card_selector.clone(),
        scroll,
        timeout: site.listing_timeout(),
    }
}

/// An absolute link not yet in `seen`. Records it when accepted.
fn accept_link<'a>(card: &'a Card, seen: &mut HashSet<String>) -> Option<&'a str> {
    let link = card.link.as_deref()?;
    (link.starts_with("http") && seen.insert(link.to_string())).then_some(link)
}

fn to_article(card: &Card, url: &str, tab: String, site: &SiteConfig) -> Article {
    Article {
        title: card_title(&card.text, &site.publisher_marker, &site.known_publishers),
        publisher: card_publisher(&card.text, &site.publisher_marker, &site.known_publishers),
        url: url.to_string(),
        tab,
        scraped_at: local_timestamp(),
    }
}

/// Articles shown under one category tab.
///
/// Cards are kept when one of their labels mentions `tab`, their link is
/// absolute and not already in `seen`.
#[instrument(level = "info", skip(browser, site, seen), fields(seen = seen.len()))]
pub async fn collect_tab(
    browser: &dyn PageSource,
    site: &SiteConfig,
    tab: &str,
    seen: &mut HashSet<String>,
) -> Result<Vec<Article>> {
    let request = listing_request(site, Some(tab), site.tab_scroll);
    let html = browser.listing_html(&request).await?;
    let cards = parse_cards(&html, site)?;
    let total = cards.len();

    let articles: Vec<Article> = cards
        .iter()
        .filter(|card| card.has_tag(tab))
        .filter_map(|card| {
            let url = accept_link(card, seen)?;
            Some(to_article(card, url, tab.to_string(), site))
        })
        .collect();

    info!(cards = total, kept = articles.len(), "Collected tab");
    Ok(articles)
}

/// Per-tab notifications from [`collect_all_tabs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabEvent<'a> {
    Started { index: usize, tab: &'a str },
    Collected { tab: &'a str, found: usize },
    Failed { tab: &'a str },
}

/// Collect every tab in `tabs`, sharing one de-duplication set.
///
/// `on_tab` hears about each tab before it loads and after it finishes.
#[instrument(level = "info", skip_all, fields(tabs = tabs.len()))]
pub async fn collect_all_tabs(
    browser: &dyn PageSource,
    site: &SiteConfig,
    tabs: &[String],
    mut on_tab: impl FnMut(TabEvent<'_>) + Send,
) -> Vec<Article> {
    let mut seen = HashSet::new();
    let mut all = Vec::new();
    for (index, tab) in tabs.iter().enumerate() {
        on_tab(TabEvent::Started { index, tab });
        match collect_tab(browser, site, tab, &mut seen).await {
            Ok(mut articles) => {
                on_tab(TabEvent::Collected {
                    tab,
                    found: articles.len(),
                });
                all.append(&mut articles);
            }
            Err(e) => {
                error!(%tab, error = %e, "Tab collection failed; skipping");
                on_tab(TabEvent::Failed { tab });
            }
        }
    }
    info!(count = all.len(), "Collected all tabs");
    all
}

/// Sample up to `limit` articles from the homepage.
///
/// Every linked card is taken regardless of category; the category is the
/// card's first label, or [`GENERAL_CATEGORY`]. When more than `limit` are
/// found the list is shuffled before truncation.
#[instrument(level = "info", skip(browser, site))]
pub async fn collect_homepage(
    browser: &dyn PageSource,
    site: &SiteConfig,
    limit: usize,
) -> Result<Vec<Article>> {
    let request = listing_request(site, None, site.homepage_scroll);
    let html = browser.listing_html(&request).await?;
    let cards = parse_cards(&html, site)?;

    let mut seen = HashSet::new();
    let mut articles: Vec<Article> = cards
        .iter()
        .filter_map(|card| {
            let url = accept_link(card, &mut seen)?;
            let tab = card
                .tags
                .first()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| GENERAL_CATEGORY.to_string());
            Some(to_article(card, url, tab, site))
        })
        .collect();

    let found = articles.len();
    if found > limit {
        articles.shuffle(&mut rand::rng());
        articles.truncate(limit);
        info!(found, selected = limit, "Randomly sampled homepage articles");
    } else {
        debug!(found, limit, "Using every homepage article");
    }
    Ok(articles)
}
