//! LLM Client implementation
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint (OpenAI,
//! OpenRouter, Ollama, LM Studio). Transient failures are retried with
//! jittered exponential backoff; 429 responses honour `Retry-After`.

use super::ChatMessage;
use crate::config::ProviderConfig;
use crate::error::PilotError;
use anyhow::{bail, Context, Result};
use rand::Rng;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client as HttpClient, StatusCode,
};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

/// Upper bound for the random spread added to each backoff delay.
const MAX_JITTER_MS: i64 = 500;

/// Main LLM Client
pub struct LlmClient {
    config: ProviderConfig,
    http_client: HttpClient,
    /// Aborts in-flight retries and backoff waits
    cancel_token: Option<CancellationToken>,
}

impl LlmClient {
    /// Create a new LLM client
    pub fn new(config: ProviderConfig) -> Result<Self> {
        sanitize_base_url(&config.base_url, "Base URL")?;

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("shellpilot/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(LlmClient {
            config,
            http_client,
            cancel_token: None,
        })
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send a chat completion and return the assistant's text.
    ///
    /// Status failures are returned as [`PilotError::ProviderStatus`] or
    /// [`PilotError::RateLimited`] inside the `anyhow::Error`.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let base_url = sanitize_base_url(&self.config.base_url, "Base URL")?;
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        let body = OpenAiRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            stream: false,
        };

        let headers = self.build_headers()?;
        let response = self
            .retry_with_backoff(|| async {
                self.http_client
                    .post(&url)
                    .headers(headers.clone())
                    .json(&body)
                    .send()
                    .await
            })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let text = response
                    .text()
                    .await
                    .context("Failed to read provider response text")?;
                let response_body: OpenAiResponse = match serde_json::from_str(&text) {
                    Ok(body) => body,
                    Err(e) => {
                        crate::error_log!("Failed to parse provider response: {}. Raw body: {}", e, text);
                        bail!("Failed to parse provider response: {}", e);
                    }
                };

                if let Some(usage) = &response_body.usage {
                    crate::debug_log!(
                        "Completion used {} prompt + {} completion tokens",
                        usage.prompt_tokens,
                        usage.completion_tokens
                    );
                }

                let content = response_body
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default();
                if content.trim().is_empty() {
                    return Err(PilotError::UnusableResponse {
                        reason: "provider returned an empty completion".to_string(),
                    }
                    .into());
                }
                Ok(content)
            }
            StatusCode::UNAUTHORIZED => Err(PilotError::ProviderStatus {
                status: 401,
                message: "Authentication failed. Check your API key.".to_string(),
            }
            .into()),
            StatusCode::TOO_MANY_REQUESTS => Err(PilotError::RateLimited {
                retry_after: retry_after(response.headers()),
            }
            .into()),
            status => {
                let error_body: Option<serde_json::Value> = response.json().await.ok();
                let error_msg = error_body
                    .as_ref()
                    .and_then(|v| v.get("error").and_then(|e| e.get("message")))
                    .and_then(|v| v.as_str())
                    .unwrap_or("Unknown error");
                Err(PilotError::ProviderStatus {
                    status: status.as_u16(),
                    message: error_msg.to_string(),
                }
                .into())
            }
        }
    }

    async fn retry_with_backoff<F, Fut>(&self, operation: F) -> Result<reqwest::Response>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let max_retries = self.config.max_retries;
        let mut attempt = 0;
        let mut delay = Duration::from_millis(self.config.retry_base_delay_ms);

        loop {
            if self.is_cancelled() {
                return Err(PilotError::Cancelled.into());
            }

            match operation().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        if attempt >= max_retries {
                            crate::error_log!("Rate limit (429) exceeded max retries ({}), giving up", max_retries);
                            return Ok(response);
                        }

                        let wait_duration = retry_after(response.headers()).unwrap_or(delay);
                        crate::warn_log!(
                            "Rate limited (429), waiting {:?} before retry (attempt {}/{})",
                            wait_duration,
                            attempt + 1,
                            max_retries
                        );
                        self.pause(wait_duration).await?;
                        delay *= 2;
                        attempt += 1;
                        continue;
                    }

                    if status.is_server_error() && attempt < max_retries {
                        crate::warn_log!("Provider error {}, retrying in {:?}", status, delay);
                    } else {
                        return Ok(response);
                    }
                }
                Err(e) => {
                    if attempt >= max_retries {
                        if e.is_timeout() {
                            return Err(PilotError::Timeout {
                                duration: Duration::from_secs(self.config.timeout_secs),
                            }
                            .into());
                        }
                        return Err(anyhow::Error::new(e).context("Failed to reach completion provider"));
                    }
                    crate::warn_log!("Network error ({}), retrying in {:?}", e, delay);
                }
            }

            attempt += 1;
            self.pause(delay).await?;
            delay = jittered(delay * 2);
        }
    }

    /// Sleep, unless the cancel token fires first.
    async fn pause(&self, wait: Duration) -> Result<()> {
        match &self.cancel_token {
            Some(token) => tokio::select! {
                _ = sleep(wait) => Ok(()),
                _ = token.cancelled() => Err(PilotError::Cancelled.into()),
            },
            None => {
                sleep(wait).await;
                Ok(())
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }

    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // OpenRouter specific headers
        if self.config.base_url.contains("openrouter.ai") {
            headers.insert("X-Title", HeaderValue::from_static("shellpilot"));
        }

        let api_key = self
            .config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty() && !k.eq_ignore_ascii_case("none"));
        if let Some(api_key) = api_key {
            let validated_key = validate_api_key(api_key)?;
            headers.insert(
                AUTHORIZATION,
                format!("Bearer {}", validated_key)
                    .parse()
                    .context("Invalid Authorization header")?,
            );
        }

        Ok(headers)
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Spread `delay` by up to half of itself, capped at [`MAX_JITTER_MS`].
fn jittered(delay: Duration) -> Duration {
    let spread = (delay.as_millis() as i64 / 2).min(MAX_JITTER_MS);
    let jitter_ms = rand::thread_rng().gen_range(-spread..=spread);
    Duration::from_millis((delay.as_millis() as i64 + jitter_ms).max(0) as u64)
}

/// Validate an API key can be used in an Authorization header
pub fn validate_api_key(api_key: &str) -> Result<String> {
    let trimmed = api_key.trim();

    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        bail!("API key is empty or set to 'none'");
    }

    for (index, ch) in trimmed.char_indices() {
        if ch.is_control() {
            bail!(
                "API key contains invalid character at position {} ({:#04x}). \
                Control characters, newlines and null bytes are not allowed.",
                index,
                ch as u32
            );
        }
    }

    format!("Bearer {}", trimmed)
        .parse::<HeaderValue>()
        .with_context(|| {
            format!(
                "API key results in invalid Authorization header. Key length: {} characters.",
                trimmed.len()
            )
        })?;

    Ok(trimmed.to_string())
}

/// Sanitize a base URL for API requests
pub fn sanitize_base_url(url: &str, field_name: &str) -> Result<String> {
    let trimmed = url.trim();

    if trimmed.is_empty() {
        bail!("{} cannot be empty", field_name);
    }

    // Encoded separators usually mean the value was double-encoded
    if trimmed.contains("%2F") || trimmed.contains("%3D") || trimmed.contains("%20") {
        bail!(
            "{} appears to contain URL-encoded characters (e.g., %2F, %3D, %20). \
            Please verify the URL is not double-encoded.",
            field_name
        );
    }

    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        bail!(
            "{} must start with 'http://' or 'https://'. Got: {}",
            field_name,
            trimmed
        );
    }

    Ok(trimmed.to_string())
}

// OpenAI-compatible API types
#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}
