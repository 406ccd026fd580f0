//! The comprehensive PDF report.
//!
//! The report is built as a print-styled HTML document and handed to a
//! [`PdfRenderer`]: a header with run totals, then one section per article
//! with a page break between sections.

use crate::browser::PdfRenderer;
use crate::config::SiteConfig;
use crate::error::Result;
use crate::models::ProcessedArticle;
use crate::utils::{escape_html, file_timestamp, html_with_breaks, local_timestamp};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

const REPORT_STYLE: &str = r#"
body { font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; line-height: 1.6; }
h1 { color: #2c3e50; border-bottom: 3px solid #3498db; padding-bottom: 15px; text-align: center; }
h2 { color: #34495e; border-bottom: 2px solid #ecf0f1; padding-bottom: 10px; margin-top: 30px; }
h3 { color: #2980b9; margin-top: 25px; }
.header { background-color: #f8f9fa; padding: 20px; border-radius: 10px; margin-bottom: 30px; text-align: center; }
.article-section { margin-bottom: 40px; padding: 20px; border: 1px solid #e0e0e0; border-radius: 8px; background-color: #fafafa; }
.article-meta { background-color: #e8f4f8; padding: 15px; border-radius: 5px; margin-bottom: 20px; }
.article-meta p { margin: 5px 0; }
.article-summary { background-color: white; padding: 20px; border-radius: 5px; border-left: 4px solid #3498db; }
.page-break { page-break-before: always; }
a { color: #3498db; text-decoration: none; }
"#;

/// Label shown for "tabs searched" when the run sampled the homepage.
const HOMEPAGE_SAMPLE: &str = "Homepage sample";

/// File name of a report generated at `timestamp` (`YYYYMMDD_HHMMSS`).
pub fn report_file_name(site: &SiteConfig, timestamp: &str) -> String {
    format!("{}_comprehensive_report_{timestamp}.pdf", site.slug())
}

/// HTML source of the report. Every interpolated value is escaped.
pub fn comprehensive_report_html(
    site: &SiteConfig,
    articles: &[ProcessedArticle],
    tabs_searched: &[String],
    generated_at: &str,
) -> String {
    let mut html = String::new();
    let tabs = if tabs_searched.is_empty() {
        HOMEPAGE_SAMPLE.to_string()
    } else {
        tabs_searched.join(", ")
    };

    let _ = writeln!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>{name} Comprehensive Analysis Report</title>\n<style>{REPORT_STYLE}</style>\n</head>\n<body>",
        name = escape_html(&site.name)
    );
    let _ = writeln!(
        html,
        "<div class=\"header\">\n<h1>{name} Comprehensive Analysis Report</h1>\n<p><strong>Total Articles Analyzed:</strong> {count}</p>\n<p><strong>Generated:</strong> {generated}</p>\n<p><strong>Tabs Searched:</strong> {tabs}</p>\n</div>",
        name = escape_html(&site.name),
        count = articles.len(),
        generated = escape_html(generated_at),
        tabs = escape_html(&tabs),
    );

    for (i, processed) in articles.iter().enumerate() {
        let a = &processed.article;
        let url = escape_html(&a.url);
        let _ = writeln!(
            html,
            "<div class=\"article-section\">\n<h2>Article {n}: {title}</h2>\n<div class=\"article-meta\">\n<p><strong>Publisher:</strong> {publisher}</p>\n<p><strong>URL:</strong> <a href=\"{url}\">{url}</a></p>\n<p><strong>Tab:</strong> {tab}</p>\n<p><strong>Processed:</strong> {scraped}</p>\n</div>\n<div class=\"article-summary\">\n<h3>AI Analysis Summary</h3>\n{summary}\n</div>\n</div>",
            n = i + 1,
            title = escape_html(&a.title),
            publisher = escape_html(&a.publisher),
            tab = escape_html(&a.tab),
            scraped = escape_html(&a.scraped_at),
            summary = html_with_breaks(&processed.summary),
        );
        if i + 1 < articles.len() {
            html.push_str("<div class=\"page-break\"></div>\n");
        }
    }

    html.push_str("</body>\n</html>\n");
    html
}

/// Render the report to `{output_dir}/{site_slug}_comprehensive_report_{ts}.pdf`.
#[instrument(level = "info", skip_all, fields(count = articles.len(), dir = %output_dir.display()))]
pub async fn write_pdf_report(
    renderer: &dyn PdfRenderer,
    site: &SiteConfig,
    articles: &[ProcessedArticle],
    tabs_searched: &[String],
    output_dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir).await?;
    let html = comprehensive_report_html(site, articles, tabs_searched, &local_timestamp());
    let bytes = renderer.render_pdf(&html, output_dir).await?;

    let path = output_dir.join(report_file_name(site, &file_timestamp()));
    fs::write(&path, &bytes).await?;
    info!(path = %path.display(), bytes = bytes.len(), "Wrote PDF report");
    Ok(path)
}
