//! Headless browser access.
//!
//! The site renders its listings client-side and lazy-loads cards on scroll,
//! so every page goes through a real Chrome instance. Two traits keep the
//! rest of the crate independent of Chrome:
//!
//! - [`PageSource`]: rendered HTML for listing and article pages
//! - [`PdfRenderer`]: HTML string in, PDF bytes out
//!
//! [`ChromeBrowser`] implements both on top of `headless_chrome`. Its API is
//! blocking, so each operation runs on the tokio blocking pool with a fresh
//! tab that is closed afterwards.

use crate::config::ScrollPolicy;
use crate::error::{Error, Result};
use crate::utils::file_timestamp;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Settle time after the first navigation to a listing page.
const LISTING_SETTLE: Duration = Duration::from_millis(1000);
/// Settle time after clicking a category tab.
const TAB_SETTLE: Duration = Duration::from_millis(2000);

/// What to load when asking for a listing page.
#[derive(Debug, Clone)]
pub struct ListingRequest {
    pub url: String,
    /// Category tab to click before scrolling, by its attribute value.
    pub tab: Option<String>,
    /// Attribute that names tabs, e.g. `data-w-tab`.
    pub tab_attribute: String,
    /// Selector counted after each scroll to detect newly loaded cards.
    pub card_selector: String,
    pub scroll: ScrollPolicy,
    pub timeout: Duration,
}

/// Source of rendered page HTML.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// HTML of an article page once the DOM is ready.
    async fn page_html(&self, url: &str, timeout: Duration) -> Result<String>;

    /// HTML of a listing page after activating the requested tab and
    /// scrolling until no more cards load.
    async fn listing_html(&self, request: &ListingRequest) -> Result<String>;
}

/// HTML to PDF conversion.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    /// Render `html` to PDF bytes. `scratch_dir` may be used for temporary
    /// files.
    async fn render_pdf(&self, html: &str, scratch_dir: &Path) -> Result<Vec<u8>>;
}

/// A lazily (re)launched value shared between blocking workers.
///
/// Chrome's connection closes after a stretch without traffic, so a handle
/// held across scheduled runs or an idle server goes stale. [`open`] hands
/// out the current instance and, when the first operation on it fails,
/// relaunches once and retries on the fresh instance.
///
/// [`open`]: Relauncher::open
pub struct Relauncher<B> {
    slot: Mutex<Option<Arc<B>>>,
    launch: Box<dyn Fn() -> Result<B> + Send + Sync>,
}

impl<B> Relauncher<B> {
    pub fn new(launch: impl Fn() -> Result<B> + Send + Sync + 'static) -> Self {
        Self {
            slot: Mutex::new(None),
            launch: Box::new(launch),
        }
    }

    fn current(&self) -> Result<Arc<B>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(instance) = slot.as_ref() {
            return Ok(Arc::clone(instance));
        }
        let instance = Arc::new((self.launch)()?);
        *slot = Some(Arc::clone(&instance));
        Ok(instance)
    }

    /// Drop `stale` unless another caller already replaced it.
    fn discard(&self, stale: &Arc<B>) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, stale)) {
            *slot = None;
        }
    }

    /// Run `op` against the current instance, relaunching once if it fails.
    pub fn open<T>(&self, op: impl Fn(&B) -> Result<T>) -> Result<T> {
        let instance = self.current()?;
        match op(instance.as_ref()) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(error = %e, "Browser handle unusable; relaunching");
                self.discard(&instance);
                op(self.current()?.as_ref())
            }
        }
    }
}

/// A headless Chrome process, relaunched when its connection has gone away.
#[derive(Clone)]
pub struct ChromeBrowser {
    browser: Arc<Relauncher<Browser>>,
}

impl std::fmt::Debug for ChromeBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromeBrowser").finish_non_exhaustive()
    }
}

fn launch_chrome(headless: bool) -> Result<Browser> {
    let options = LaunchOptions::default_builder()
        .headless(headless)
        .sandbox(false)
        .idle_browser_timeout(Duration::from_secs(600))
        .args(vec![OsStr::new("--disable-blink-features=AutomationControlled")])
        .build()
        .map_err(Error::browser)?;
    let browser = Browser::new(options).map_err(Error::browser)?;
    info!(headless, "Chrome launched");
    Ok(browser)
}

impl ChromeBrowser {
    /// Launch Chrome. `headless = false` opens a visible window, which is
    /// what preview runs use.
    #[instrument(level = "info")]
    pub fn launch(headless: bool) -> Result<Self> {
        let browser = Relauncher::new(move || launch_chrome(headless));
        // Fail fast when Chrome is missing instead of on the first page.
        browser.open(|_| Ok(()))?;
        Ok(Self {
            browser: Arc::new(browser),
        })
    }

    async fn with_tab<T, F>(&self, timeout: Duration, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
    {
        let browser = Arc::clone(&self.browser);
        tokio::task::spawn_blocking(move || {
            let tab = browser.open(|b| b.new_tab().map_err(Error::browser))?;
            tab.set_default_timeout(timeout);
            let result = work(&tab);
            if let Err(e) = tab.close(true) {
                warn!(error = %e, "Failed to close tab");
            }
            result
        })
        .await?
    }
}

#[async_trait]
impl PageSource for ChromeBrowser {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn page_html(&self, url: &str, timeout: Duration) -> Result<String> {
        let url = url.to_string();
        self.with_tab(timeout, move |tab| {
            tab.navigate_to(&url).map_err(Error::browser)?;
            tab.wait_until_navigated().map_err(Error::browser)?;
            tab.get_content().map_err(Error::browser)
        })
        .await
    }

    #[instrument(level = "info", skip_all, fields(url = %request.url, tab = ?request.tab))]
    async fn listing_html(&self, request: &ListingRequest) -> Result<String> {
        let request = request.clone();
        self.with_tab(request.timeout, move |tab| load_listing(tab, &request))
            .await
    }
}

#[async_trait]
impl PdfRenderer for ChromeBrowser {
    #[instrument(level = "info", skip_all, fields(bytes = html.len()))]
    async fn render_pdf(&self, html: &str, scratch_dir: &Path) -> Result<Vec<u8>> {
        let scratch = scratch_dir.join(format!(".report_{}.html", file_timestamp()));
        tokio::fs::write(&scratch, html).await?;
        let absolute = tokio::fs::canonicalize(&scratch).await?;
        let file_url = Url::from_file_path(&absolute)
            .map_err(|_| Error::Config(format!("not an absolute path: {}", absolute.display())))?;

        let result = self
            .with_tab(Duration::from_secs(60), move |tab| {
                tab.navigate_to(file_url.as_str()).map_err(Error::browser)?;
                tab.wait_until_navigated().map_err(Error::browser)?;
                tab.print_to_pdf(None).map_err(Error::browser)
            })
            .await;

        if let Err(e) = tokio::fs::remove_file(&scratch).await {
            debug!(error = %e, path = %scratch.display(), "Could not remove scratch HTML");
        }
        result
    }
}

/// Blocking body of [`PageSource::listing_html`] for Chrome.
fn load_listing(tab: &Tab, request: &ListingRequest) -> Result<String> {
    tab.navigate_to(&request.url).map_err(Error::browser)?;
    tab.wait_until_navigated().map_err(Error::browser)?;
    sleep(LISTING_SETTLE);

    if let Some(name) = &request.tab {
        let selector = tab_selector(&request.tab_attribute, name);
        debug!(%selector, "Clicking tab");
        tab.wait_for_element(&selector)
            .map_err(Error::browser)?
            .click()
            .map_err(Error::browser)?;
        sleep(TAB_SETTLE);
    }

    let count_js = card_count_script(&request.card_selector);
    let pause = Duration::from_millis(request.scroll.pause_ms);
    let mut tracker = ScrollTracker::new(request.scroll.max_idle_scrolls);
    while !tracker.settled() {
        tab.evaluate("window.scrollTo(0, document.body.scrollHeight)", false)
            .map_err(Error::browser)?;
        sleep(pause);
        let current = tab
            .evaluate(&count_js, false)
            .map_err(Error::browser)?
            .value
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if tracker.observe(current) {
            debug!(cards = current, "More cards loaded");
        }
    }
    info!(cards = tracker.cards(), "Listing fully scrolled");

    tab.get_content().map_err(Error::browser)
}

/// Card counts seen while scrolling a listing. Settled once
/// `max_idle` consecutive scrolls load nothing new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollTracker {
    cards: u64,
    idle: u32,
    max_idle: u32,
}

impl ScrollTracker {
    pub fn new(max_idle: u32) -> Self {
        Self {
            cards: 0,
            idle: 0,
            max_idle,
        }
    }

    /// Record the card count after a scroll. Returns `true` when it grew,
    /// which resets the idle streak.
    pub fn observe(&mut self, count: u64) -> bool {
        if count == self.cards {
            self.idle += 1;
            false
        } else {
            self.cards = count;
            self.idle = 0;
            true
        }
    }

    pub fn settled(&self) -> bool {
        self.idle >= self.max_idle
    }

    pub fn cards(&self) -> u64 {
        self.cards
    }
}

/// CSS selector for the tab anchor named `name`.
pub fn tab_selector(attribute: &str, name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("a[{attribute}=\"{escaped}\"]")
}

/// JavaScript expression returning the number of elements matching `selector`.
fn card_count_script(selector: &str) -> String {
    // A JSON string literal is a valid JavaScript string literal.
    let quoted = serde_json::Value::String(selector.to_string()).to_string();
    format!("document.querySelectorAll({quoted}).length")
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeChrome {
        id: usize,
        closed: AtomicBool,
    }

    fn new_tab(chrome: &FakeChrome) -> Result<usize> {
        if chrome.closed.load(Ordering::SeqCst) {
            Err(Error::browser("connection is closed"))
        } else {
            Ok(chrome.id)
        }
    }

    fn counting_launcher(launches: Arc<AtomicUsize>) -> Relauncher<FakeChrome> {
        Relauncher::new(move || {
            Ok(FakeChrome {
                id: launches.fetch_add(1, Ordering::SeqCst),
                closed: AtomicBool::new(false),
            })
        })
    }

    #[test]
    fn test_relauncher_reuses_live_instance() {
        let launches = Arc::new(AtomicUsize::new(0));
        let chrome = counting_launcher(launches.clone());
        assert_eq!(chrome.open(new_tab).unwrap(), 0);
        assert_eq!(chrome.open(new_tab).unwrap(), 0);
        assert_eq!(launches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_relauncher_recovers_after_connection_closes() {
        let launches = Arc::new(AtomicUsize::new(0));
        let chrome = counting_launcher(launches.clone());
        assert_eq!(chrome.open(new_tab).unwrap(), 0);

        // Simulate the idle timeout between two scheduled runs.
        chrome.current().unwrap().closed.store(true, Ordering::SeqCst);

        assert_eq!(chrome.open(new_tab).unwrap(), 1);
        assert_eq!(chrome.open(new_tab).unwrap(), 1);
        assert_eq!(launches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_relauncher_retries_only_once() {
        let launches = Arc::new(AtomicUsize::new(0));
        let chrome = counting_launcher(launches.clone());
        let attempts = AtomicUsize::new(0);
        let result: Result<()> = chrome.open(|_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::browser("navigation failed"))
        });
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(launches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_relauncher_propagates_launch_failure() {
        let chrome: Relauncher<FakeChrome> =
            Relauncher::new(|| Err(Error::browser("chrome not found")));
        assert!(matches!(chrome.open(new_tab), Err(Error::Browser(_))));
    }

    #[test]
    fn test_tab_selector() {
        assert_eq!(tab_selector("data-w-tab", "Sales"), "a[data-w-tab=\"Sales\"]");
        assert_eq!(
            tab_selector("data-w-tab", "ABM & GTM"),
            "a[data-w-tab=\"ABM & GTM\"]"
        );
        assert_eq!(
            tab_selector("data-w-tab", "Say \"hi\""),
            "a[data-w-tab=\"Say \\\"hi\\\"\"]"
        );
    }

    #[test]
    fn test_scroll_tracker_resets_on_growth() {
        let mut t = ScrollTracker::new(3);
        assert!(!t.settled());
        assert!(t.observe(10));
        assert!(!t.observe(10));
        assert!(!t.observe(10));
        assert!(!t.settled());
        assert!(t.observe(14));
        assert!(!t.observe(14));
        assert!(!t.observe(14));
        assert!(!t.settled());
        assert!(!t.observe(14));
        assert!(t.settled());
        assert_eq!(t.cards(), 14);
    }

    #[test]
    fn test_scroll_tracker_empty_listing_settles() {
        let mut t = ScrollTracker::new(2);
        assert!(!t.observe(0));
        assert!(!t.observe(0));
        assert!(t.settled());
        assert_eq!(t.cards(), 0);
    }

    #[test]
    fn test_scroll_tracker_zero_idle_never_scrolls() {
        assert!(ScrollTracker::new(0).settled());
    }

    #[test]
    fn test_card_count_script() {
        assert_eq!(
            card_count_script("div.w-dyn-item"),
            "document.querySelectorAll(\"div.w-dyn-item\").length"
        );
    }
}
