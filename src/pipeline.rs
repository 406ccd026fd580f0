//! End-to-end runs: collect, fetch, summarize, render.
//!
//! A [`Pipeline`] owns the three outside seams (page source, LLM, PDF
//! renderer) behind trait objects and drives one run at a time:
//!
//! 1. collect articles from tabs, the homepage, or the JSON cache
//! 2. fetch and summarize them in batches ([`Pipeline::process`])
//! 3. write the PDF report and the dashboard
//!
//! Progress is reported at fixed checkpoints through [`ProgressSink`], which
//! the CLI prints and the status API stores.

use crate::api::{AskAsync, summarize_article};
use crate::browser::{PageSource, PdfRenderer};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::models::{Article, ProcessedArticle, RunOutcome};
use crate::outputs::{dashboard, json, pdf};
use crate::scrapers::collector::{TabEvent, collect_all_tabs, collect_homepage};
use crate::scrapers::content::fetch_article_content;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Receives progress checkpoints (0..=100) with a short step description,
/// plus free-form notes between checkpoints.
pub trait ProgressSink: Send + Sync {
    fn update(&self, progress: u8, step: &str);

    fn log(&self, message: &str) {
        info!(message, "Run note");
    }
}

/// Logs each checkpoint; with `preview` also prints it for a human.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleProgress {
    pub preview: bool,
}

impl ProgressSink for ConsoleProgress {
    fn update(&self, progress: u8, step: &str) {
        info!(progress, step, "Progress");
        if self.preview {
            println!("[{progress:>3}%] {step}");
        }
    }

    fn log(&self, message: &str) {
        info!(message, "Run note");
        if self.preview {
            println!("       {message}");
        }
    }
}

/// Progress value while collecting tab `index` of `total`: 10 to 30.
pub fn tab_progress(index: usize, total: usize) -> u8 {
    let step = if total == 0 { 0 } else { index * 20 / total };
    10 + step.min(20) as u8
}

pub struct Pipeline {
    pages: Arc<dyn PageSource>,
    asker: Arc<dyn AskAsync>,
    renderer: Arc<dyn PdfRenderer>,
    settings: Arc<Settings>,
    output_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        pages: Arc<dyn PageSource>,
        asker: Arc<dyn AskAsync>,
        renderer: Arc<dyn PdfRenderer>,
        settings: Arc<Settings>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            pages,
            asker,
            renderer,
            settings,
            output_dir,
        }
    }

    pub fn pages(&self) -> &dyn PageSource {
        self.pages.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Fetch and summarize `articles` in batches.
    ///
    /// Per batch every body is fetched concurrently, empty bodies are dropped
    /// and the rest are summarized at most `summarize_workers` at a time, in
    /// input order. Never returns more items than it was given.
    #[instrument(level = "info", skip_all, fields(articles = articles.len()))]
    pub async fn process_batches(&self, articles: &[Article]) -> Vec<ProcessedArticle> {
        let processing = &self.settings.processing;
        let batch_size = processing.batch_size.max(1);
        let workers = processing.summarize_workers.max(1);
        let timeout = processing.fetch_timeout();
        let pages = self.pages.as_ref();
        let asker = self.asker.as_ref();
        let batches = articles.len().div_ceil(batch_size);

        let mut processed = Vec::with_capacity(articles.len());
        for (n, batch) in articles.chunks(batch_size).enumerate() {
            let bodies = join_all(
                batch
                    .iter()
                    .map(|a| fetch_article_content(pages, &a.url, timeout)),
            )
            .await;

            let fetched: Vec<(Article, String)> = batch
                .iter()
                .cloned()
                .zip(bodies)
                .filter(|(article, content)| {
                    let keep = !content.trim().is_empty();
                    if !keep {
                        warn!(url = %article.url, "No content; dropping article");
                    }
                    keep
                })
                .collect();

            let mut done: Vec<ProcessedArticle> = stream::iter(fetched)
                .map(|(article, content)| async move {
                    let summary = summarize_article(asker, &content).await;
                    ProcessedArticle::new(article, content, summary)
                })
                .buffered(workers)
                .collect()
                .await;

            info!(
                batch = n + 1,
                batches,
                processed = done.len(),
                "Batch complete"
            );
            processed.append(&mut done);
        }
        processed
    }

    /// One article at a time over the first `fallback_limit` articles, with
    /// a pause between them.
    #[instrument(level = "info", skip_all, fields(articles = articles.len()))]
    pub async fn process_sequential(&self, articles: &[Article]) -> Vec<ProcessedArticle> {
        let processing = &self.settings.processing;
        let pause = Duration::from_millis(processing.fallback_pause_ms);
        let subset = &articles[..articles.len().min(processing.fallback_limit)];

        let mut processed = Vec::new();
        for (i, article) in subset.iter().enumerate() {
            if i > 0 {
                sleep(pause).await;
            }
            let content =
                fetch_article_content(self.pages.as_ref(), &article.url, processing.fetch_timeout())
                    .await;
            if content.trim().is_empty() {
                warn!(url = %article.url, "No content; dropping article");
                continue;
            }
            let summary = summarize_article(self.asker.as_ref(), &content).await;
            processed.push(ProcessedArticle::new(article.clone(), content, summary));
        }
        info!(processed = processed.len(), "Sequential processing complete");
        processed
    }

    /// Batched processing, falling back to sequential when it yields nothing.
    pub async fn process(&self, articles: &[Article]) -> Vec<ProcessedArticle> {
        let processed = self.process_batches(articles).await;
        if processed.is_empty() && !articles.is_empty() {
            warn!("Parallel processing produced nothing; trying sequential fallback");
            return self.process_sequential(articles).await;
        }
        processed
    }

    /// Random sample of `limit` homepage articles.
    #[instrument(level = "info", skip(self, progress))]
    pub async fn run_homepage(&self, limit: usize, progress: &dyn ProgressSink) -> Result<RunOutcome> {
        let started = Instant::now();
        progress.update(10, "Collecting articles from homepage");
        let articles = collect_homepage(self.pages.as_ref(), &self.settings.site, limit).await?;
        self.finish(articles, Vec::new(), started, progress).await
    }

    /// Every article under the given category tabs.
    #[instrument(level = "info", skip(self, progress))]
    pub async fn run_tabs(&self, tabs: &[String], progress: &dyn ProgressSink) -> Result<RunOutcome> {
        let started = Instant::now();
        progress.update(10, "Collecting articles");
        let total = tabs.len();
        let articles =
            collect_all_tabs(self.pages.as_ref(), &self.settings.site, tabs, |event| match event {
                TabEvent::Started { index, tab } => {
                    progress.update(tab_progress(index, total), &format!("Scraping tab: {tab}"));
                }
                TabEvent::Collected { tab, found } => {
                    progress.log(&format!("Found {found} articles in {tab} tab"));
                }
                TabEvent::Failed { tab } => {
                    progress.log(&format!("Could not scrape {tab} tab; skipped"));
                }
            })
            .await;
        self.finish(articles, tabs.to_vec(), started, progress).await
    }

    /// Re-process the articles stored by a previous run.
    #[instrument(level = "info", skip_all)]
    pub async fn run_cached(&self, progress: &dyn ProgressSink) -> Result<RunOutcome> {
        let started = Instant::now();
        progress.update(10, "Loading cached articles");
        let articles = json::read_articles(&self.output_dir).await?;
        let tabs: Vec<String> = articles.iter().map(|a| a.tab.clone()).sorted().dedup().collect();
        self.finish(articles, tabs, started, progress).await
    }

    async fn finish(
        &self,
        articles: Vec<Article>,
        selected_tags: Vec<String>,
        started: Instant,
        progress: &dyn ProgressSink,
    ) -> Result<RunOutcome> {
        if articles.is_empty() {
            return Err(Error::NoArticles("no articles were collected".to_string()));
        }
        info!(count = articles.len(), "Articles collected");
        progress.log(&format!("Total articles found: {}", articles.len()));
        if let Err(e) = json::write_articles(&self.output_dir, &articles).await {
            error!(error = %e, "Failed to write article cache");
        }

        progress.update(40, &format!("Processing {} articles", articles.len()));
        let processed = self.process(&articles).await;
        if processed.is_empty() {
            return Err(Error::NoArticles("no articles could be processed".to_string()));
        }
        progress.log(&format!(
            "Summarized {} of {} articles",
            processed.len(),
            articles.len()
        ));
        if let Err(e) = json::write_processed(&self.output_dir, &processed).await {
            error!(error = %e, "Failed to write processed articles");
        }

        progress.update(70, "Generating PDF report");
        let pdf_path = match pdf::write_pdf_report(
            self.renderer.as_ref(),
            &self.settings.site,
            &processed,
            &selected_tags,
            &self.output_dir,
        )
        .await
        {
            Ok(path) => {
                if let Some(name) = path.file_name() {
                    progress.log(&format!("PDF generated: {}", name.to_string_lossy()));
                }
                Some(path)
            }
            Err(e) => {
                error!(error = %e, "PDF generation failed; continuing without it");
                progress.log(&format!("PDF generation failed: {e}"));
                None
            }
        };

        progress.update(85, "Building website");
        let website_path = match dashboard::write_dashboard(
            &self.settings.site,
            &processed,
            pdf_path.as_deref(),
            &self.output_dir,
        )
        .await
        {
            Ok(path) => {
                progress.log(&format!("Website created: {}", path.display()));
                Some(path)
            }
            Err(e) => {
                error!(error = %e, "Dashboard generation failed");
                progress.log(&format!("Website generation failed: {e}"));
                None
            }
        };

        progress.update(100, "Complete");
        let outcome = RunOutcome {
            total_articles: articles.len(),
            processed_articles: processed.len(),
            pdf_path,
            website_path,
            selected_tags,
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        info!(
            total = outcome.total_articles,
            processed = outcome.processed_articles,
            secs = outcome.elapsed_secs,
            "Run complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::api::fakes::FakeAsk;
    use crate::browser::fakes::{FakePages, FakePdf};
    use std::sync::Mutex;

    /// Records every checkpoint and note it receives.
    #[derive(Default)]
    pub struct RecordingProgress {
        pub updates: Mutex<Vec<(u8, String)>>,
        pub notes: Mutex<Vec<String>>,
    }

    impl ProgressSink for RecordingProgress {
        fn update(&self, progress: u8, step: &str) {
            self.updates.lock().unwrap().push((progress, step.to_string()));
        }

        fn log(&self, message: &str) {
            self.notes.lock().unwrap().push(message.to_string());
        }
    }

    pub fn article_page(n: usize) -> String {
        format!("<html><body><h1>Article {n}</h1><article>Body of article {n}</article></body></html>")
    }

    pub fn listing_card(tag: &str, n: usize) -> String {
        format!(
            r#"<div class="w-dyn-item">
                 <div class="text-block-3">{tag}</div>
                 <div>Published by:</div><div>Gong</div>
                 <p>Running better pipeline reviews, part {n}. Details.</p>
                 <a class="button-primary-small" href="https://example.com/articles/{n}">Read Full Article</a>
               </div>"#
        )
    }

    /// Pages for articles `0..n`, with a listing linking all of them.
    pub fn fake_site(n: usize) -> FakePages {
        let mut pages = FakePages::default();
        for i in 0..n {
            pages
                .pages
                .insert(format!("https://example.com/articles/{i}"), article_page(i));
        }
        let cards: Vec<String> = (0..n)
            .map(|i| listing_card(if i % 2 == 0 { "Sales" } else { "AI" }, i))
            .collect();
        pages.listing = format!("<html><body>{}</body></html>", cards.join("\n"));
        pages
    }

    pub fn pipeline(pages: FakePages, asker: FakeAsk, output_dir: &Path) -> Pipeline {
        let mut settings = Settings::default();
        settings.processing.batch_size = 3;
        settings.processing.summarize_workers = 2;
        settings.processing.fallback_pause_ms = 1;
        settings.site.tab_scroll.pause_ms = 0;
        Pipeline::new(
            Arc::new(pages),
            Arc::new(asker),
            Arc::new(FakePdf),
            Arc::new(settings),
            output_dir.to_path_buf(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::api::fakes::FakeAsk;
    use crate::browser::fakes::FakePages;
    use crate::models::ANALYSIS_FAILED;
    use crate::models::fixtures::article;

    #[test]
    fn test_tab_progress_range() {
        assert_eq!(tab_progress(0, 4), 10);
        assert_eq!(tab_progress(2, 4), 20);
        assert_eq!(tab_progress(3, 4), 25);
        assert_eq!(tab_progress(0, 0), 10);
        assert_eq!(tab_progress(9, 1), 30);
    }

    #[tokio::test]
    async fn test_process_batches_preserves_order_and_drops_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut pages = fake_site(7);
        pages.pages.remove("https://example.com/articles/4");
        let p = pipeline(pages, FakeAsk::answering("TL;DR: fine"), tmp.path());

        let input: Vec<Article> = (0..7).map(article).collect();
        let out = p.process_batches(&input).await;

        assert_eq!(out.len(), 6);
        assert!(out.len() <= input.len());
        let urls: Vec<_> = out.iter().map(|a| a.article.url.clone()).collect();
        let expected: Vec<_> = [0, 1, 2, 3, 5, 6]
            .iter()
            .map(|i| format!("https://example.com/articles/{i}"))
            .collect();
        assert_eq!(urls, expected);
        assert!(out[0].content.starts_with("Title: Article 0"));
        assert!(out[0].summary.starts_with("TL;DR: fine."));
    }

    #[tokio::test]
    async fn test_process_keeps_articles_when_llm_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(fake_site(2), FakeAsk::failing(), tmp.path());
        let out = p.process(&[article(0), article(1)]).await;
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|a| a.summary == ANALYSIS_FAILED));
    }

    #[tokio::test]
    async fn test_sequential_fallback_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(fake_site(15), FakeAsk::answering("ok"), tmp.path());
        let input: Vec<Article> = (0..15).map(article).collect();
        let out = p.process_sequential(&input).await;
        assert_eq!(out.len(), 10);
    }

    #[tokio::test]
    async fn test_run_tabs_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(fake_site(4), FakeAsk::answering("TL;DR: good"), tmp.path());
        let progress = RecordingProgress::default();
        let tabs = vec!["Sales".to_string(), "AI".to_string()];

        let outcome = p.run_tabs(&tabs, &progress).await.unwrap();

        assert_eq!(outcome.total_articles, 4);
        assert_eq!(outcome.processed_articles, 4);
        assert_eq!(outcome.selected_tags, tabs);
        let pdf = outcome.pdf_path.unwrap();
        assert!(pdf.exists());
        assert!(outcome.website_path.unwrap().exists());
        assert!(tmp.path().join("articles.json").exists());
        assert!(tmp.path().join("processed_articles.json").exists());

        let checkpoints: Vec<u8> = progress
            .updates
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| *p)
            .collect();
        assert_eq!(checkpoints, vec![10, 10, 20, 40, 70, 85, 100]);
    }

    #[tokio::test]
    async fn test_run_tabs_reports_counts_and_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut pages = fake_site(5);
        pages.failing_tabs.push("Finance".to_string());
        let p = pipeline(pages, FakeAsk::answering("TL;DR: good"), tmp.path());
        let progress = RecordingProgress::default();
        let tabs = vec!["Sales".to_string(), "Finance".to_string(), "AI".to_string()];

        let outcome = p.run_tabs(&tabs, &progress).await.unwrap();

        let notes = progress.notes.lock().unwrap().clone();
        assert_eq!(notes[0], "Found 3 articles in Sales tab");
        assert_eq!(notes[1], "Could not scrape Finance tab; skipped");
        assert_eq!(notes[2], "Found 2 articles in AI tab");
        assert_eq!(notes[3], "Total articles found: 5");
        assert_eq!(notes[4], "Summarized 5 of 5 articles");
        let pdf_name = outcome.pdf_path.unwrap();
        let pdf_name = pdf_name.file_name().unwrap().to_string_lossy();
        assert_eq!(notes[5], format!("PDF generated: {pdf_name}"));
        assert!(notes[6].starts_with("Website created: "));
    }

    #[tokio::test]
    async fn test_run_homepage_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(fake_site(6), FakeAsk::answering("ok"), tmp.path());
        let outcome = p.run_homepage(3, &ConsoleProgress::default()).await.unwrap();
        assert_eq!(outcome.total_articles, 3);
        assert!(outcome.selected_tags.is_empty());
    }

    #[tokio::test]
    async fn test_run_with_nothing_collected_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(FakePages::default(), FakeAsk::answering("ok"), tmp.path());
        let err = p
            .run_homepage(30, &ConsoleProgress::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoArticles(_)));
    }

    #[tokio::test]
    async fn test_run_cached_reuses_articles() {
        let tmp = tempfile::tempdir().unwrap();
        json::write_articles(tmp.path(), &[article(0), article(1)])
            .await
            .unwrap();
        let p = pipeline(fake_site(2), FakeAsk::answering("ok"), tmp.path());
        let outcome = p.run_cached(&ConsoleProgress::default()).await.unwrap();
        assert_eq!(outcome.processed_articles, 2);
        assert_eq!(outcome.selected_tags, vec!["AI", "Sales"]);
    }
}
