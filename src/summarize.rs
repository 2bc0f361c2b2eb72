//! Summarization collaborator and its retry policy.
//!
//! A [`Summarizer`] turns document text into a study summary pitched at a
//! mastery level. [`summarize_with_retry`] wraps any summarizer: truncation
//! failures shrink the input before the next attempt, provider failures
//! back off and retry the same input.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::SummarizerConfig;
use crate::knowledge::MasteryLevel;

/// Why a summary could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SummarizeError {
    /// Input or output exceeded the provider's limits.
    #[error("summary truncated: {0}")]
    Truncation(String),

    /// Transport, authentication or provider-side failure.
    #[error("provider error: {0}")]
    Provider(String),
}

/// Produces a study summary of `text` for `topic` at `target` mastery.
pub trait Summarizer: Send + Sync {
    fn summarize(
        &self,
        text: &str,
        topic: &str,
        target: MasteryLevel,
    ) -> impl Future<Output = Result<String, SummarizeError>> + Send;
}

/// How many times to retry and how long to wait between provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay, doubled per attempt, plus up to 50% jitter.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SummarizerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.saturating_mul(1 << attempt.min(6));
        let jitter_ms = (base.as_millis() / 2) as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Summarize `text`, retrying up to `policy.max_retries` times.
///
/// A truncation failure halves the input at a whitespace boundary before the
/// next attempt; the same input is never resent after truncation.
///
/// # Errors
///
/// Returns the last [`SummarizeError`] once retries are exhausted, or a
/// [`SummarizeError::Truncation`] if the input cannot be shortened further.
pub async fn summarize_with_retry<S: Summarizer>(
    summarizer: &S,
    text: &str,
    topic: &str,
    target: MasteryLevel,
    policy: &RetryPolicy,
) -> Result<String, SummarizeError> {
    let mut input = text;
    let mut attempt: u32 = 0;
    loop {
        let err = match summarizer.summarize(input, topic, target).await {
            Ok(summary) => return Ok(summary),
            Err(err) => err,
        };
        if attempt >= policy.max_retries {
            return Err(err);
        }

        match &err {
            SummarizeError::Truncation(reason) => {
                input = halve_at_whitespace(input).ok_or_else(|| {
                    SummarizeError::Truncation(format!("{reason}; input cannot be shortened"))
                })?;
                tracing::debug!(
                    attempt,
                    chars = input.chars().count(),
                    "summary truncated, retrying with shorter input"
                );
            }
            SummarizeError::Provider(_) => {
                let delay = policy.delay(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "summarizer failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
    }
}

/// First half of `text`, cut at the last whitespace before the midpoint.
///
/// Falls back to the midpoint itself when the first half has no whitespace.
/// Returns `None` when nothing shorter and non-empty remains.
pub fn halve_at_whitespace(text: &str) -> Option<&str> {
    let text = text.trim();
    let chars = text.chars().count();
    if chars < 2 {
        return None;
    }
    let mid = text
        .char_indices()
        .nth(chars / 2)
        .map_or(text.len(), |(i, _)| i);
    let cut = text[..mid]
        .rfind(char::is_whitespace)
        .filter(|&i| i > 0)
        .unwrap_or(mid);
    let half = text[..cut].trim_end();
    (!half.is_empty() && half.len() < text.len()).then_some(half)
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat-completions summarizer
// ---------------------------------------------------------------------------

/// Summarizer backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiSummarizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
    max_tokens: u32,
}

impl OpenAiSummarizer {
    /// Build from config, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &SummarizerConfig) -> Result<Self, SummarizeError> {
        Self::new(config, config.resolve_api_key())
    }

    /// Build from config with an explicit API key.
    pub fn new(config: &SummarizerConfig, api_key: Option<String>) -> Result<Self, SummarizeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SummarizeError::Provider(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_url.trim_end_matches('/')),
            model: config.api_model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn build_body(&self, text: &str, topic: &str, target: MasteryLevel) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                {
                    "role": "system",
                    "content": "You write concise, accurate study summaries of technical material.",
                },
                {
                    "role": "user",
                    "content": build_prompt(text, topic, target),
                },
            ],
        })
    }
}

impl Summarizer for OpenAiSummarizer {
    async fn summarize(
        &self,
        text: &str,
        topic: &str,
        target: MasteryLevel,
    ) -> Result<String, SummarizeError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&self.build_body(text, topic, target));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| SummarizeError::Provider(format!("request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::PAYLOAD_TOO_LARGE {
            return Err(SummarizeError::Truncation("HTTP 413".into()));
        }
        if !status.is_success() {
            return Err(SummarizeError::Provider(format!("HTTP {}", status.as_u16())));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SummarizeError::Provider(format!("invalid response: {e}")))?;
        parse_completion(&body)
    }
}

fn parse_completion(body: &serde_json::Value) -> Result<String, SummarizeError> {
    let choice = body
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| SummarizeError::Provider("response has no choices".into()))?;

    if choice.get("finish_reason").and_then(|f| f.as_str()) == Some("length") {
        return Err(SummarizeError::Truncation("finish_reason=length".into()));
    }

    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::trim)
        .unwrap_or_default();
    if content.is_empty() {
        return Err(SummarizeError::Provider("empty completion".into()));
    }
    Ok(content.to_owned())
}

fn build_prompt(text: &str, topic: &str, target: MasteryLevel) -> String {
    let audience = match target {
        MasteryLevel::Beginner => {
            "The reader is new to the topic. Avoid jargon and define any term you must use."
        }
        MasteryLevel::Intermediate => {
            "The reader knows the fundamentals. Focus on methods and how they compare to prior work."
        }
        MasteryLevel::Advanced => {
            "The reader is an expert. Focus on what is novel and on the remaining open problems."
        }
    };
    format!(
        "Summarize the following material for someone studying \"{topic}\".\n\
         {audience}\n\n\
         Use exactly these sections:\n\
         **Problem:** what question the work addresses\n\
         **Approach:** how it addresses it\n\
         **Key Results:** the main findings\n\
         **Why It Matters:** relevance to {topic}\n\n\
         Material:\n{text}"
    )
}
