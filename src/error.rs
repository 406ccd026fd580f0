//! Crate-wide error type.
//!
//! Most pipeline stages swallow their own failures and hand back sentinel
//! values; this type is what the remaining run-level failures travel in.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No articles: {0}")]
    NoArticles(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Wrap any displayable browser-side failure.
    pub fn browser(e: impl std::fmt::Display) -> Self {
        Error::Browser(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = Error::browser("tab crashed");
        assert_eq!(e.to_string(), "Browser error: tab crashed");

        let e = Error::NoArticles("homepage returned nothing".to_string());
        assert_eq!(e.to_string(), "No articles: homepage returned nothing");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let e: Error = io.into();
        assert!(matches!(e, Error::Io(_)));
    }
}
