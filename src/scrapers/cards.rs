//! Listing cards and the text heuristics that pull fields out of them.
//!
//! The site gives cards no structured title or publisher element, only a run
//! of visible text along the lines of:
//!
//! ```text
//! Sales
//! Published by:
//! Gong
//! How top reps run discovery calls. A breakdown of ...
//! Read Summary
//! Read Full Article
//! ```
//!
//! [`card_publisher`] and [`card_title`] recover the fields from that text.
//! Both are best-effort and always return something: degenerate input gives
//! the [`UNKNOWN_PUBLISHER`] / [`UNTITLED_ARTICLE`] placeholders.

use crate::config::SiteConfig;
use crate::error::{Error, Result};
use crate::models::{UNKNOWN_PUBLISHER, UNTITLED_ARTICLE};
use crate::utils::collapse_whitespace;
use scraper::{ElementRef, Html, Selector};

/// Words that end a title when scanning text with no known publisher.
const TITLE_STOP_WORDS: &[&str] = &[
    "read", "make", "most", "many", "want", "looking", "if", "in", "this",
];

/// Line prefixes that mark tag, button or label text rather than a title.
const NON_TITLE_PREFIXES: &[&str] = &[
    "copy",
    "positioning",
    "sales",
    "published by",
    "read full",
    "read summary",
];

/// Button labels cut off the end of a title candidate.
const BUTTON_LABELS: &[&str] = &["Read Full Article", "Read Summary"];

/// One article card from a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// Visible text, one trimmed text node per line.
    pub text: String,
    /// Category labels shown on the card.
    pub tags: Vec<String>,
    /// Target of the card's article button, if any.
    pub link: Option<String>,
}

impl Card {
    /// Whether any of the card's labels mentions `tab` (case-insensitive).
    pub fn has_tag(&self, tab: &str) -> bool {
        let needle = tab.to_lowercase();
        self.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }
}

/// Parse every card on a listing page.
pub fn parse_cards(html: &str, site: &SiteConfig) -> Result<Vec<Card>> {
    let card_sel = parse_selector(&site.card_selector)?;
    let tag_sel = parse_selector(&site.card_tag_selector)?;
    let link_sel = parse_selector(&site.card_link_selector)?;
    let anchor_sel = parse_selector("a[href]")?;

    let document = Html::parse_document(html);
    let cards = document
        .select(&card_sel)
        .map(|card| {
            let tags = card
                .select(&tag_sel)
                .map(|t| collapse_whitespace(&visible_text(t)))
                .filter(|t| !t.is_empty())
                .collect();
            let link = card
                .select(&link_sel)
                .find_map(|a| a.value().attr("href"))
                .or_else(|| {
                    card.select(&anchor_sel).find_map(|a| {
                        let label = a.text().collect::<String>();
                        site.link_text_fallbacks
                            .iter()
                            .any(|f| label.contains(f.as_str()))
                            .then(|| a.value().attr("href"))
                            .flatten()
                    })
                })
                .map(|href| href.trim().to_string());
            Card {
                text: visible_text(card),
                tags,
                link,
            }
        })
        .collect();
    Ok(cards)
}

/// Text nodes of `element`, trimmed, blank ones dropped, one per line.
pub fn visible_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Selector(format!("{css}: {e}")))
}

/// Text following the publisher marker, trimmed. `None` without a marker.
fn after_marker<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    text.split_once(marker).map(|(_, rest)| rest.trim())
}

/// Publisher named on a card.
///
/// A known publisher at the start of the text after the marker wins;
/// otherwise the first word, or the first two when the second is
/// capitalized.
pub fn card_publisher(text: &str, marker: &str, known_publishers: &[String]) -> String {
    let Some(after) = after_marker(text, marker) else {
        return UNKNOWN_PUBLISHER.to_string();
    };

    if let Some(known) = known_publishers.iter().find(|p| after.starts_with(p.as_str())) {
        return known.clone();
    }

    let words: Vec<&str> = after.split_whitespace().collect();
    match words.as_slice() {
        [] => UNKNOWN_PUBLISHER.to_string(),
        [first, second, ..] if second.chars().next().is_some_and(char::is_uppercase) => {
            format!("{first} {second}")
        }
        [first, ..] => first.to_string(),
    }
}

/// Title of a card, see the module docs for the text shape.
///
/// Branches, first hit wins:
/// 1. text after a known publisher: its first sentence, else its first 15 words
/// 2. text after the marker: a run of words from index 1 or 2 up to a stop word
/// 3. any line of the whole card that looks like a title
/// 4. [`UNTITLED_ARTICLE`]
pub fn card_title(text: &str, marker: &str, known_publishers: &[String]) -> String {
    if let Some(after) = after_marker(text, marker) {
        if let Some(title) = title_after_known_publisher(after, known_publishers) {
            return title;
        }
        if let Some(title) = title_from_word_run(after) {
            return title;
        }
    }
    title_from_lines(text).unwrap_or_else(|| UNTITLED_ARTICLE.to_string())
}

fn title_after_known_publisher(after: &str, known_publishers: &[String]) -> Option<String> {
    let publisher = known_publishers.iter().find(|p| after.starts_with(p.as_str()))?;
    let mut rest = after[publisher.len()..].trim();
    for label in BUTTON_LABELS {
        if let Some((head, _)) = rest.split_once(label) {
            rest = head.trim();
        }
    }

    let first_sentence = rest.split('.').next().unwrap_or("").trim();
    let len = char_len(first_sentence);
    if len > 10 && len < 200 {
        return Some(first_sentence.to_string());
    }

    let words: Vec<&str> = rest.split_whitespace().collect();
    if words.len() >= 4 {
        let candidate = words.iter().take(15).copied().collect::<Vec<_>>().join(" ");
        let len = char_len(&candidate);
        if len > 20 && len < 200 {
            return Some(candidate);
        }
    }
    None
}

fn title_from_word_run(after: &str) -> Option<String> {
    let words: Vec<&str> = after.split_whitespace().collect();
    if words.len() <= 3 {
        return None;
    }
    // Skip the publisher (one or two words), then read until a stop word.
    for start in 1..words.len().min(3) {
        let mut taken: Vec<&str> = Vec::new();
        for word in words[start..].iter().copied() {
            if TITLE_STOP_WORDS.contains(&word.to_lowercase().as_str()) {
                break;
            }
            taken.push(word);
            if char_len(&taken.join(" ")) > 60 {
                break;
            }
        }
        if taken.len() >= 4 {
            let candidate = taken.join(" ");
            let len = char_len(&candidate);
            if len > 15 && len < 200 {
                return Some(candidate);
            }
        }
    }
    None
}

fn title_from_lines(text: &str) -> Option<String> {
    text.lines().map(str::trim).find_map(|line| {
        let len = char_len(line);
        let lower = line.to_lowercase();
        let is_label = NON_TITLE_PREFIXES.iter().any(|p| lower.starts_with(p));
        (len > 20 && len < 150 && !is_label).then(|| line.to_string())
    })
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "Published by:";

    fn publishers() -> Vec<String> {
        SiteConfig::default().known_publishers
    }

    #[test]
    fn test_publisher_known_prefix() {
        let text = "Sales\nPublished by:\nGrowth Unhinged\nWhy PLG stalls. More text.\nRead Full Article";
        assert_eq!(card_publisher(text, MARKER, &publishers()), "Growth Unhinged");
    }

    #[test]
    fn test_publisher_two_capitalized_words() {
        let text = "Published by: Acme Corp writes about pipelines";
        assert_eq!(card_publisher(text, MARKER, &publishers()), "Acme Corp");
    }

    #[test]
    fn test_publisher_single_word() {
        let text = "Published by: acme writes about pipelines";
        assert_eq!(card_publisher(text, MARKER, &publishers()), "acme");
    }

    #[test]
    fn test_publisher_placeholders() {
        assert_eq!(card_publisher("", MARKER, &publishers()), UNKNOWN_PUBLISHER);
        assert_eq!(card_publisher("no marker here", MARKER, &publishers()), UNKNOWN_PUBLISHER);
        assert_eq!(card_publisher("Published by:   ", MARKER, &publishers()), UNKNOWN_PUBLISHER);
    }

    #[test]
    fn test_title_first_sentence_after_known_publisher() {
        let text = "Sales\nPublished by:\nGong\nHow top reps run discovery calls. A breakdown of forty calls.\nRead Summary\nRead Full Article";
        assert_eq!(
            card_title(text, MARKER, &publishers()),
            "How top reps run discovery calls"
        );
    }

    #[test]
    fn test_title_word_fallback_after_known_publisher() {
        // First "sentence" is too short, so the first 15 words are used.
        let text = "Published by: Klue Short. then a much longer run of words that keeps going on and on without stopping at all";
        let title = card_title(text, MARKER, &publishers());
        assert_eq!(title.split_whitespace().count(), 15);
        assert!(title.starts_with("Short. then a much"));
    }

    #[test]
    fn test_title_cuts_button_labels() {
        let text = "Published by: Navattic Interactive demos that convert Read Full Article";
        assert_eq!(
            card_title(text, MARKER, &publishers()),
            "Interactive demos that convert"
        );
    }

    #[test]
    fn test_title_word_run_unknown_publisher() {
        let text = "Published by: Acme Pricing pages that close enterprise deals faster Read more";
        assert_eq!(
            card_title(text, MARKER, &publishers()),
            "Pricing pages that close enterprise deals faster"
        );
    }

    #[test]
    fn test_title_word_run_stops_after_sixty_chars() {
        let text = "Published by: Acme alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima mike november";
        let title = card_title(text, MARKER, &publishers());
        assert!(title.chars().count() > 60);
        assert!(title.chars().count() < 70);
        assert!(title.starts_with("alpha bravo"));
    }

    #[test]
    fn test_title_from_lines_without_marker() {
        let text = "Sales\nCopy & Positioning tips for founders\nThe definitive guide to outbound in 2025\nRead Full Article";
        assert_eq!(
            card_title(text, MARKER, &publishers()),
            "The definitive guide to outbound in 2025"
        );
    }

    #[test]
    fn test_title_placeholder_for_degenerate_input() {
        assert_eq!(card_title("", MARKER, &publishers()), UNTITLED_ARTICLE);
        assert_eq!(card_title("Published by:", MARKER, &publishers()), UNTITLED_ARTICLE);
        assert_eq!(card_title("Sales\nRead Summary", MARKER, &publishers()), UNTITLED_ARTICLE);
        assert!(!card_title("x", MARKER, &[]).is_empty());
    }

    #[test]
    fn test_parse_cards() {
        let html = r#"
            <div class="w-dyn-item">
              <div class="text-block-3">Sales</div>
              <div>Published by:</div><div>Gong</div>
              <div>How top reps run discovery calls. More.</div>
              <a class="button-primary-small" href=" https://gong.io/blog/discovery ">Read Full Article</a>
            </div>
            <div class="w-dyn-item">
              <div class="text-block-3">AI</div>
              <div class="text-block-3">Content Marketing</div>
              <a href="https://example.com/x">Read Full Article</a>
            </div>
            <div class="w-dyn-item"><div class="text-block-3"> </div><p>No link</p></div>
        "#;
        let cards = parse_cards(html, &SiteConfig::default()).unwrap();
        assert_eq!(cards.len(), 3);

        assert_eq!(cards[0].tags, vec!["Sales"]);
        assert_eq!(cards[0].link.as_deref(), Some("https://gong.io/blog/discovery"));
        assert!(cards[0].text.starts_with("Sales\nPublished by:\nGong\n"));

        assert_eq!(cards[1].link.as_deref(), Some("https://example.com/x"));
        assert!(cards[1].has_tag("content marketing"));
        assert!(!cards[1].has_tag("Sales"));

        assert!(cards[2].tags.is_empty());
        assert_eq!(cards[2].link, None);
    }

    #[test]
    fn test_bad_selector_is_error() {
        let mut site = SiteConfig::default();
        site.card_selector = "div[".to_string();
        assert!(matches!(parse_cards("<p></p>", &site), Err(Error::Selector(_))));
    }
}
