//! JSON cache of collected and processed articles.
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── articles.json            # collected cards, input to --reuse-cache
//! └── processed_articles.json  # articles with content and summary
//! ```
//!
//! Both files are pretty-printed arrays and are overwritten on every run.

use crate::error::Result;
use crate::models::{Article, ProcessedArticle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

pub const ARTICLES_FILE: &str = "articles.json";
pub const PROCESSED_FILE: &str = "processed_articles.json";

async fn write_pretty<T: Serialize + ?Sized>(output_dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(value)?;

    if let Err(e) = fs::create_dir_all(output_dir).await {
        error!(dir = %output_dir.display(), error = %e, "Failed to create output dir");
        return Err(e.into());
    }

    let path = output_dir.join(name);
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote JSON file");
    Ok(path)
}

/// Write collected articles to `{output_dir}/articles.json`.
#[instrument(level = "info", skip_all, fields(count = articles.len()))]
pub async fn write_articles(output_dir: &Path, articles: &[Article]) -> Result<PathBuf> {
    write_pretty(output_dir, ARTICLES_FILE, articles).await
}

/// Write processed articles to `{output_dir}/processed_articles.json`.
#[instrument(level = "info", skip_all, fields(count = articles.len()))]
pub async fn write_processed(output_dir: &Path, articles: &[ProcessedArticle]) -> Result<PathBuf> {
    write_pretty(output_dir, PROCESSED_FILE, articles).await
}

/// Read the articles stored by [`write_articles`].
#[instrument(level = "info", skip_all, fields(dir = %output_dir.display()))]
pub async fn read_articles(output_dir: &Path) -> Result<Vec<Article>> {
    let raw = fs::read_to_string(output_dir.join(ARTICLES_FILE)).await?;
    let articles: Vec<Article> = serde_json::from_str(&raw)?;
    info!(count = articles.len(), "Loaded cached articles");
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{article, processed};

    #[tokio::test]
    async fn test_articles_cache_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/out");
        let written = vec![article(1), article(2)];

        let path = write_articles(&dir, &written).await.unwrap();
        assert_eq!(path, dir.join(ARTICLES_FILE));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n  {"), "pretty printed");
        assert_eq!(read_articles(&dir).await.unwrap(), written);
    }

    #[tokio::test]
    async fn test_processed_file_is_flat() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_processed(tmp.path(), &[processed(3)]).await.unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value[0]["title"], "How teams win deal number 3");
        assert!(value[0]["summary"].is_string());
    }

    #[tokio::test]
    async fn test_read_missing_cache_errors() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_articles(tmp.path()).await.is_err());
    }
}
