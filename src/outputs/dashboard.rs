//! Static HTML dashboard.
//!
//! A single self-contained `index.html` (inline CSS and JavaScript, no
//! external assets) written to `{output_dir}/website/`. The PDF report, when
//! there is one, is copied next to it and linked by file name so the folder
//! can be published as-is.
//!
//! Client-side features: run statistics, category filter chips, and a search
//! box with fuzzy (in-order subsequence) matching that highlights direct hits
//! with `<mark>`.

use crate::config::SiteConfig;
use crate::error::Result;
use crate::models::{ProcessedArticle, distinct_tabs};
use crate::utils::{escape_html, html_with_breaks, local_timestamp};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

pub const WEBSITE_DIR: &str = "website";
pub const INDEX_FILE: &str = "index.html";

/// Characters of summary shown on a collapsed card.
const PREVIEW_CHARS: usize = 200;

const DASHBOARD_STYLE: &str = r#"
* { margin: 0; padding: 0; box-sizing: border-box; }
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); min-height: 100vh; }
.container { max-width: 1200px; margin: 0 auto; padding: 20px; }
.header { text-align: center; color: white; margin-bottom: 40px; padding: 40px 20px; }
.header h1 { font-size: 3rem; margin-bottom: 10px; text-shadow: 2px 2px 4px rgba(0,0,0,0.3); }
.header p { font-size: 1.2rem; opacity: 0.9; }
.stats { display: flex; justify-content: center; gap: 30px; margin: 30px 0; flex-wrap: wrap; }
.stat-card { background: rgba(255,255,255,0.1); padding: 20px; border-radius: 10px; text-align: center; color: white; }
.stat-number { font-size: 2rem; font-weight: bold; display: block; }
.download-btn { display: inline-block; margin-top: 20px; padding: 12px 28px; background: white; color: #667eea; border-radius: 25px; text-decoration: none; font-weight: bold; }
.search-box { margin: 30px 0 10px; text-align: center; }
.search-input { padding: 12px 20px; font-size: 16px; border: none; border-radius: 25px; width: 300px; max-width: 90%; }
.chips { text-align: center; margin-bottom: 20px; }
.chip { display: inline-block; margin: 4px; padding: 4px 14px; border-radius: 20px; border: 1px solid white; color: white; background: transparent; cursor: pointer; font-size: 0.85rem; }
.chip.active { background: white; color: #667eea; }
.articles-grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(400px, 1fr)); gap: 30px; margin-top: 30px; }
.article-card { background: white; border-radius: 15px; padding: 25px; box-shadow: 0 8px 25px rgba(0,0,0,0.1); border-left: 5px solid #667eea; }
.article-title { color: #2c3e50; margin-bottom: 15px; font-size: 1.3rem; line-height: 1.4; }
.article-meta { display: flex; gap: 10px; margin-bottom: 15px; flex-wrap: wrap; font-size: 0.85rem; color: #666; }
.tab-badge { background: #667eea; color: white; padding: 2px 12px; border-radius: 20px; }
.expand-btn { margin-top: 10px; padding: 6px 16px; border: none; border-radius: 20px; background: #667eea; color: white; cursor: pointer; }
.summary-content { margin: 15px 0; }
.source-link { color: #667eea; }
.no-results { text-align: center; color: white; margin-top: 40px; display: none; }
mark { background: #ffe066; padding: 0 2px; }
"#;

const DASHBOARD_SCRIPT: &str = r#"
let activeTab = 'all';

function toggleArticle(i) {
  const full = document.getElementById('full-' + i);
  const btn = document.getElementById('btn-' + i);
  const open = full.style.display === 'none';
  full.style.display = open ? 'block' : 'none';
  btn.textContent = open ? 'Show Less' : 'Read Full Summary';
}

function fuzzyMatch(needle, haystack) {
  let j = 0;
  for (let i = 0; i < haystack.length && j < needle.length; i++) {
    if (haystack[i] === needle[j]) j++;
  }
  return j === needle.length;
}

function escapeRegExp(s) {
  return s.replace(/[.*+?^${}()|[\]\\]/g, '\\$&');
}

// Marks hits inside text nodes only, so markup and entities stay intact.
function highlight(el, query) {
  el.innerHTML = el.getAttribute('data-original');
  if (!query) return;
  const re = new RegExp(escapeRegExp(query), 'gi');
  const walker = document.createTreeWalker(el, NodeFilter.SHOW_TEXT);
  const nodes = [];
  while (walker.nextNode()) nodes.push(walker.currentNode);
  nodes.forEach(node => {
    const text = node.data;
    let last = 0;
    const parts = document.createDocumentFragment();
    for (const hit of text.matchAll(re)) {
      parts.append(text.slice(last, hit.index));
      const mark = document.createElement('mark');
      mark.textContent = hit[0];
      parts.append(mark);
      last = hit.index + hit[0].length;
    }
    if (last === 0) return;
    parts.append(text.slice(last));
    node.replaceWith(parts);
  });
}

function applyFilters() {
  const query = document.getElementById('search').value.trim().toLowerCase();
  let shown = 0;
  document.querySelectorAll('.article-card').forEach(card => {
    const tabOk = activeTab === 'all' || card.dataset.tab === activeTab;
    const textOk = !query || fuzzyMatch(query, card.dataset.search);
    const visible = tabOk && textOk;
    card.style.display = visible ? 'block' : 'none';
    if (visible) shown++;
    card.querySelectorAll('[data-original]').forEach(el => highlight(el, query));
  });
  document.getElementById('no-results').style.display = shown === 0 ? 'block' : 'none';
}

function selectTab(button) {
  activeTab = button.dataset.tab;
  document.querySelectorAll('.chip').forEach(c => c.classList.toggle('active', c === button));
  applyFilters();
}

document.addEventListener('DOMContentLoaded', () => {
  document.querySelectorAll('[data-original]').forEach(el => el.setAttribute('data-original', el.innerHTML));
  document.getElementById('search').addEventListener('input', applyFilters);
});
"#;

/// Lowercased text the search box matches against.
fn search_text(p: &ProcessedArticle) -> String {
    format!(
        "{} {} {} {}",
        p.article.title, p.article.publisher, p.article.tab, p.summary
    )
    .to_lowercase()
}

/// The dashboard page. `pdf_file_name` adds a download button linking to
/// that file relative to the page.
pub fn dashboard_html(
    site: &SiteConfig,
    articles: &[ProcessedArticle],
    pdf_file_name: Option<&str>,
    generated_at: &str,
) -> String {
    let name = escape_html(&site.name);
    let tabs = distinct_tabs(articles);
    let total_words: usize = articles.iter().map(ProcessedArticle::summary_word_count).sum();

    let mut html = String::new();
    let _ = writeln!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n<title>{name} Analysis Dashboard</title>\n<style>{DASHBOARD_STYLE}</style>\n</head>\n<body>\n<div class=\"container\">"
    );

    let _ = writeln!(
        html,
        "<div class=\"header\">\n<h1>{name} Analysis</h1>\n<p>AI summaries of curated B2B articles. Generated {generated}</p>",
        generated = escape_html(generated_at)
    );
    let _ = writeln!(
        html,
        "<div class=\"stats\">\n<div class=\"stat-card\"><span class=\"stat-number\">{articles}</span>Articles</div>\n<div class=\"stat-card\"><span class=\"stat-number\">{total_words}</span>Total Words</div>\n<div class=\"stat-card\"><span class=\"stat-number\">{categories}</span>Categories</div>\n</div>",
        articles = articles.len(),
        categories = tabs.len(),
    );
    if let Some(pdf) = pdf_file_name {
        let _ = writeln!(
            html,
            "<a class=\"download-btn\" href=\"{href}\" download>Download PDF Report</a>",
            href = escape_html(pdf)
        );
    }
    html.push_str("</div>\n");

    html.push_str(
        "<div class=\"search-box\"><input id=\"search\" class=\"search-input\" type=\"text\" placeholder=\"Search articles...\"></div>\n",
    );
    html.push_str("<div class=\"chips\">\n<button class=\"chip active\" data-tab=\"all\" onclick=\"selectTab(this)\">All</button>\n");
    for tab in &tabs {
        let tab = escape_html(tab);
        let _ = writeln!(
            html,
            "<button class=\"chip\" data-tab=\"{tab}\" onclick=\"selectTab(this)\">{tab}</button>"
        );
    }
    html.push_str("</div>\n<div class=\"articles-grid\">\n");

    for (i, p) in articles.iter().enumerate() {
        let a = &p.article;
        let _ = writeln!(
            html,
            r#"<div class="article-card" id="article-{i}" data-tab="{tab}" data-search="{search}">
<h2 class="article-title" data-original>{title}</h2>
<div class="article-meta">
<span class="tab-badge">{tab}</span>
<span class="publisher">{publisher}</span>
<span class="date">{scraped}</span>
<span class="word-count">{words} words</span>
</div>
<div class="article-preview"><p data-original>{preview}</p>
<button class="expand-btn" id="btn-{i}" onclick="toggleArticle({i})">Read Full Summary</button></div>
<div class="article-full" id="full-{i}" style="display: none;">
<div class="summary-content" data-original>{summary}</div>
<div class="article-link"><a href="{url}" target="_blank" rel="noopener" class="source-link">View Original Article</a></div>
</div>
</div>"#,
            tab = escape_html(&a.tab),
            search = escape_html(&search_text(p)),
            title = escape_html(&a.title),
            publisher = escape_html(&a.publisher),
            scraped = escape_html(&a.scraped_at),
            words = p.summary_word_count(),
            preview = escape_html(&p.summary_preview(PREVIEW_CHARS)),
            summary = html_with_breaks(&p.summary),
            url = escape_html(&a.url),
        );
    }

    let _ = writeln!(
        html,
        "</div>\n<p id=\"no-results\" class=\"no-results\">No articles match your search.</p>\n</div>\n<script>{DASHBOARD_SCRIPT}</script>\n</body>\n</html>"
    );
    html
}

/// Write `{output_dir}/website/index.html`, copying `pdf` next to it.
///
/// A PDF that cannot be copied is logged and left out of the page.
#[instrument(level = "info", skip_all, fields(count = articles.len(), dir = %output_dir.display()))]
pub async fn write_dashboard(
    site: &SiteConfig,
    articles: &[ProcessedArticle],
    pdf: Option<&Path>,
    output_dir: &Path,
) -> Result<PathBuf> {
    let website_dir = output_dir.join(WEBSITE_DIR);
    fs::create_dir_all(&website_dir).await?;

    let mut pdf_name = None;
    if let Some(pdf) = pdf {
        if let Some(name) = pdf.file_name().map(|n| n.to_string_lossy().into_owned()) {
            match fs::copy(pdf, website_dir.join(&name)).await {
                Ok(_) => pdf_name = Some(name),
                Err(e) => warn!(path = %pdf.display(), error = %e, "Could not copy PDF into website"),
            }
        }
    }

    let html = dashboard_html(site, articles, pdf_name.as_deref(), &local_timestamp());
    let index = website_dir.join(INDEX_FILE);
    fs::write(&index, html).await?;
    info!(path = %index.display(), "Wrote dashboard");
    Ok(index)
}
