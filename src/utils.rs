//! Utility functions for string handling, timestamps and file system checks.
//!
//! - String truncation and slugification for logging and file names
//! - HTML escaping for the report templates
//! - Local timestamps in the formats the artifacts use
//! - File system validation for output directories

use crate::error::Result;
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a count of
/// the dropped bytes appended. Cuts on a character boundary.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// First `max` characters of `s`.
pub fn take_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        None => s,
        Some((cut, _)) => &s[..cut],
    }
}

/// Convert a title to a URL-friendly slug.
///
/// Lowercases the text, removes special characters, and replaces spaces
/// with hyphens.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify_title("Hello World"), "hello-world");
/// assert_eq!(slugify_title("ABM & GTM"), "abm--gtm");
/// ```
pub fn slugify_title(title: &str) -> String {
    title
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-', "")
        .replace(' ', "-")
}

/// Collapse every whitespace run to a single space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RUN.replace_all(s.trim(), " ").into_owned()
}

/// Escape text for interpolation into HTML element content or a quoted
/// attribute value.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escaped text with newlines turned into `<br>`.
pub fn html_with_breaks(s: &str) -> String {
    escape_html(s).replace('\n', "<br>")
}

/// Local time as `YYYY-MM-DD HH:MM:SS`, the format stored on articles.
pub fn local_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Local time as `YYYYMMDD_HHMMSS`, used in artifact file names.
pub fn file_timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then creates and immediately
/// deletes a scratch file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable
/// (permission denied, read-only filesystem, etc.).
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let check_path = path.join("..__write_check__");
    stdfs::File::create(&check_path)?;
    let _ = stdfs::remove_file(&check_path);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        let s = "ü".repeat(20);
        let result = truncate_for_log(&s, 5);
        assert!(result.starts_with("üüüüü…"));
        assert!(result.contains("(+30 bytes)"));
    }

    #[test]
    fn test_take_chars() {
        assert_eq!(take_chars("abcdef", 3), "abc");
        assert_eq!(take_chars("ab", 3), "ab");
        assert_eq!(take_chars("日本語テキスト", 3), "日本語");
    }

    #[test]
    fn test_slugify_title() {
        assert_eq!(slugify_title("Hello World"), "hello-world");
        assert_eq!(slugify_title("Test-Article!"), "test-article");
        assert_eq!(slugify_title("Multiple   Spaces"), "multiple---spaces");
        assert_eq!(slugify_title("Special@#$Characters"), "specialcharacters");
        assert_eq!(slugify_title("ABM & GTM"), "abm--gtm");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b   c "), "a b c");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
        assert_eq!(html_with_breaks("a<b\nc"), "a&lt;b<br>c");
    }

    #[test]
    fn test_timestamp_shapes() {
        let ts = local_timestamp();
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], " ");

        let fts = file_timestamp();
        assert_eq!(fts.len(), 15);
        assert_eq!(&fts[8..9], "_");
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b/c");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert!(!nested.join("..__write_check__").exists());
    }
}
