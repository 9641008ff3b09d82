//! OpenAI-compatible `/chat/completions` client (OpenRouter by default).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::options::SummaryStyle;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-chat-v3-0324";

#[derive(Clone)]
pub struct OpenRouterConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    /// Sent as `HTTP-Referer`.
    pub site_url: String,
    /// Sent as `X-Title`.
    pub site_name: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(45),
            site_url: "http://localhost:5173".to_string(),
            site_name: "precis".to_string(),
        }
    }
}

impl std::fmt::Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: std::borrow::Cow<'a, str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug)]
pub struct OpenRouterClient {
    http: Client,
    config: OpenRouterConfig,
}

impl OpenRouterClient {
    pub fn new(config: OpenRouterConfig) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

fn system_prompt(style: SummaryStyle, max_length: u32) -> String {
    let shape = match style {
        SummaryStyle::Concise => "Write one short paragraph covering only the central points.",
        SummaryStyle::Detailed => {
            "Write a thorough summary that keeps the key arguments and supporting details."
        }
        SummaryStyle::Bullet => "Write the summary as a list of bullet points, one idea per bullet.",
        SummaryStyle::Executive => {
            "Write an executive summary: the bottom line first, then key findings and recommended actions."
        }
    };
    format!(
        "You summarize documents. {shape} Use at most {max_length} words. \
         Reply with the summary only."
    )
}

/// Longest cooldown an upstream hint can impose.
pub const MAX_RETRY_HINT: Duration = Duration::from_secs(3600);

fn capped_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .unwrap_or(MAX_RETRY_HINT)
        .min(MAX_RETRY_HINT)
}

/// Cooldown hint from `Retry-After` (seconds) or `X-RateLimit-Reset` (seconds,
/// or an epoch timestamp in milliseconds). Capped at [`MAX_RETRY_HINT`].
pub(crate) fn parse_retry_after(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
    };

    if let Some(secs) = header("retry-after") {
        return Some(capped_secs(secs));
    }
    let reset = header("x-ratelimit-reset")?;
    // values this large are absolute timestamps, not a number of seconds
    if reset > 1e12 {
        let Some(at) = UNIX_EPOCH.checked_add(Duration::from_millis(reset as u64)) else {
            return Some(MAX_RETRY_HINT);
        };
        return at
            .duration_since(now)
            .ok()
            .filter(|d| !d.is_zero())
            .map(|d| d.min(MAX_RETRY_HINT));
    }
    Some(capped_secs(reset))
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    fn is_configured(&self) -> Result<(), String> {
        match self.config.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err("completion API key not configured".to_string()),
        }
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, CompletionError> {
        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt(request.options.style, request.options.max_length)
                        .into(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("Summarize the following text:\n\n{}", request.text).into(),
                },
            ],
            temperature: 0.7,
            max_tokens: 2000,
        };

        tracing::debug!(model = %self.config.model, style = %request.options.style, "calling completion service");
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.config.site_url)
            .header("X-Title", &self.config.site_name)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout
                } else {
                    CompletionError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let parsed: ChatResponse = response.json().await.map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout
                } else {
                    CompletionError::Malformed(e.to_string())
                }
            })?;
            return parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message)
                .and_then(|m| m.content)
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| CompletionError::Malformed("no summary in response".into()));
        }

        let retry_after = parse_retry_after(response.headers(), SystemTime::now());
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error.message)
            .unwrap_or_else(|_| {
                if text.is_empty() {
                    status.canonical_reason().unwrap_or("unknown error").to_string()
                } else {
                    text
                }
            });

        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                CompletionError::Unauthorized(message)
            }
            StatusCode::PAYMENT_REQUIRED => CompletionError::PaymentRequired,
            StatusCode::TOO_MANY_REQUESTS => CompletionError::Overloaded { retry_after },
            _ => CompletionError::Status {
                status: status.as_u16(),
                message,
            },
        })
    }
}
