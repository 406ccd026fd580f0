//! LLM summarization over a chat-completion API, with optional retries.
//!
//! # Architecture
//!
//! - [`AskAsync`]: core trait, text in and model answer out
//! - [`ChatCompletionClient`]: OpenAI-style `chat/completions` over `reqwest`
//! - [`RetryAsk`]: decorator adding exponential backoff to any [`AskAsync`]
//! - [`summarize_article`]: the pipeline entry point; never fails, returning
//!   [`ANALYSIS_FAILED`] instead
//!
//! # Retry Strategy
//!
//! Retries are off by default (`llm.max_retries = 0`). When enabled:
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::models::ANALYSIS_FAILED;
use crate::utils::{take_chars, truncate_for_log};
use async_trait::async_trait;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// System message sent with every summarization request.
pub const SYSTEM_PROMPT: &str = "You are a B2B sales analyst. For the TL;DR, always write \
two complete sentences that end with a period or other proper punctuation. Never let a TL;DR \
sentence trail off or end with '...' or incomplete thoughts. If the model tries to end with \
'...', finish the sentence properly.";

const USER_PROMPT_HEADER: &str = "Analyze this B2B sales article and provide:
1. A short 1-sentence TL;DR at the very top. Each sentence must be complete, self-contained, and end with a period or other proper punctuation. It should be around 40 words.
2. 3-5 key takeaways
3. Notable companies/technologies
4. 3-5 actionable recommendations for B2B sales

Do not use any formatting (no bold, italics, or markdown). Do not mention the prompt or instructions in your answer.
Use indenting to make it easy to read. Numbers for lists are fine.
No citations, sources or references. Plain text only.

Article:

";

/// Trait for async LLM interaction.
///
/// Implementors send text to a model and return its answer. Decorators such
/// as [`RetryAsk`] implement it too, so they stack.
#[async_trait]
pub trait AskAsync: Send + Sync {
    async fn ask(&self, text: &str) -> Result<String>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`]
/// implementation.
pub struct RetryAsk<T> {
    inner: T,
    /// Retries after the first attempt.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

#[async_trait]
impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    #[instrument(level = "debug", skip_all)]
    async fn ask(&self, text: &str) -> Result<String> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    let exponent = u32::try_from(attempt - 1).unwrap_or(u32::MAX).min(16);
                    let delay = self
                        .base_delay
                        .saturating_mul(1 << exponent)
                        .min(self.max_delay);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatAnswer,
}

#[derive(Debug, Deserialize)]
struct ChatAnswer {
    content: Option<String>,
}

/// Client for an OpenAI-compatible `chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatCompletionClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
    max_input_chars: usize,
}

impl fmt::Debug for ChatCompletionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCompletionClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ChatCompletionClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        if api_key.is_none() {
            warn!("No LLM API key configured; every summary will be marked as failed");
        }
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_input_chars: config.max_input_chars,
        })
    }

    /// User prompt for `article`, embedding at most `max_input_chars` of it.
    fn user_prompt(&self, article: &str) -> String {
        format!(
            "{USER_PROMPT_HEADER}{}",
            take_chars(article, self.max_input_chars)
        )
    }
}

#[async_trait]
impl AskAsync for ChatCompletionClient {
    #[instrument(level = "debug", skip_all, fields(model = %self.model, chars = text.len()))]
    async fn ask(&self, text: &str) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Llm("no API key configured".to_string()))?;
        let prompt = self.user_prompt(text);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let t0 = Instant::now();
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let raw = response.text().await?;
        debug!(
            elapsed_ms = t0.elapsed().as_millis(),
            bytes = raw.len(),
            "Chat completion received"
        );
        parse_answer(&raw)
    }
}

/// First choice's message content from a raw chat-completion body.
fn parse_answer(raw: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(raw).map_err(|e| {
        Error::Llm(format!(
            "malformed response ({e}): {}",
            truncate_for_log(raw, 200)
        ))
    })?;
    let answer = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    if answer.trim().is_empty() {
        return Err(Error::Llm("empty answer".to_string()));
    }
    Ok(answer)
}

/// Build the summarization client described by `config`.
pub fn build_summarizer(config: &LlmConfig) -> Result<RetryAsk<ChatCompletionClient>> {
    let client = ChatCompletionClient::new(config)?;
    Ok(RetryAsk::new(
        client,
        config.max_retries,
        StdDuration::from_secs(1),
    ))
}

/// Tidy the TL;DR line of a summary.
///
/// The first non-blank line loses trailing whitespace, periods, ellipses and
/// `, ; :` and gets exactly one period. Other lines are left untouched.
pub fn polish_tldr(summary: &str) -> String {
    let mut lines: Vec<String> = summary.lines().map(str::to_string).collect();
    if let Some(line) = lines.iter_mut().find(|l| !l.trim().is_empty()) {
        let trimmed = line
            .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '.' | '…' | ',' | ';' | ':'));
        *line = format!("{trimmed}.");
    }
    lines.join("\n")
}

/// Summarize one article's text. Failures of any kind give
/// [`ANALYSIS_FAILED`].
#[instrument(level = "info", skip_all, fields(chars = content.len()))]
pub async fn summarize_article(asker: &dyn AskAsync, content: &str) -> String {
    let t0 = Instant::now();
    match asker.ask(content).await {
        Ok(answer) => {
            info!(
                elapsed_ms = t0.elapsed().as_millis(),
                chars = answer.len(),
                "Summary generated"
            );
            polish_tldr(&answer)
        }
        Err(e) => {
            error!(elapsed_ms = t0.elapsed().as_millis(), error = %e, "Summarization failed");
            ANALYSIS_FAILED.to_string()
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::FakeAsk;
    use super::*;

    #[test]
    fn test_polish_tldr_ellipsis() {
        let out = polish_tldr("TL;DR: Reps win with better discovery...\n1. Ask more...");
        assert_eq!(out, "TL;DR: Reps win with better discovery.\n1. Ask more...");
    }

    #[test]
    fn test_polish_tldr_skips_blank_and_strips_punctuation() {
        let out = polish_tldr("\n  \nSummary of the piece ;: … \nmore");
        let first = out.lines().find(|l| !l.trim().is_empty()).unwrap();
        assert_eq!(first, "Summary of the piece.");
    }

    #[test]
    fn test_polish_tldr_single_period() {
        for input in ["Done", "Done.", "Done..", "Done. ", "Done,"] {
            let out = polish_tldr(input);
            assert_eq!(out, "Done.", "input {input:?}");
            assert!(!out.ends_with(".."));
        }
    }

    #[tokio::test]
    async fn test_summarize_article_polishes() {
        let fake = FakeAsk::answering("TL;DR: It works...");
        let summary = summarize_article(&fake, "body").await;
        assert!(summary.starts_with("TL;DR: It works.\n"));
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_summarize_article_failure_sentinel() {
        let fake = FakeAsk::failing();
        assert_eq!(summarize_article(&fake, "body").await, ANALYSIS_FAILED);
    }

    #[tokio::test]
    async fn test_retry_ask_recovers() {
        let fake = FakeAsk {
            answer: "ok".into(),
            fail_first: 2,
            ..Default::default()
        };
        let retry = RetryAsk::new(fake, 2, StdDuration::from_millis(1));
        let answer = retry.ask("x").await.unwrap();
        assert!(answer.starts_with("ok"));
        assert_eq!(retry.inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_ask_zero_retries_is_single_attempt() {
        let retry = RetryAsk::new(FakeAsk::failing(), 0, StdDuration::from_millis(1));
        assert!(retry.ask("x").await.is_err());
        assert_eq!(retry.inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_client_without_key_fails() {
        let client = ChatCompletionClient::new(&LlmConfig::default()).unwrap();
        let err = client.ask("text").await.unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
    }

    #[test]
    fn test_client_debug_redacts_key() {
        let config = LlmConfig {
            api_key: Some("pplx-secret".into()),
            ..Default::default()
        };
        let client = ChatCompletionClient::new(&config).unwrap();
        let dbg = format!("{client:?}");
        assert!(dbg.contains("[REDACTED]"));
        assert!(!dbg.contains("pplx-secret"));
    }

    #[test]
    fn test_user_prompt_truncates_article() {
        let config = LlmConfig {
            max_input_chars: 10,
            ..Default::default()
        };
        let client = ChatCompletionClient::new(&config).unwrap();
        let prompt = client.user_prompt(&"x".repeat(50));
        assert!(prompt.ends_with(&"x".repeat(10)));
        assert!(!prompt.ends_with(&"x".repeat(11)));
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "sonar",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: 600,
            temperature: 0.5,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "sonar");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 600);
        assert_eq!(json["temperature"], 0.5);
    }

    #[test]
    fn test_parse_answer() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"TL;DR: hi"}}]}"#;
        assert_eq!(parse_answer(raw).unwrap(), "TL;DR: hi");
        assert!(parse_answer(r#"{"choices":[]}"#).is_err());
        assert!(parse_answer(r#"{"choices":[{"message":{"content":"  "}}]}"#).is_err());
        assert!(parse_answer("<html>").is_err());
    }
}
