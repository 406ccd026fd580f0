//! Scraping of the article directory and the articles it links to.
//!
//! Work happens in two phases, mirroring how the site is built:
//!
//! 1. **Collection**: render listing pages, parse their cards and turn each
//!    card into an [`Article`](crate::models::Article) ([`collector`], using
//!    the heuristics in [`cards`])
//! 2. **Fetching**: load each linked article and extract its text
//!    ([`content`])
//!
//! Category names come from [`tags`]: a built-in list, or whatever tabs the
//! live page currently shows.
//!
//! All page access goes through [`PageSource`](crate::browser::PageSource),
//! so every function here can be driven by canned HTML in tests.

pub mod cards;
pub mod collector;
pub mod content;
pub mod tags;
