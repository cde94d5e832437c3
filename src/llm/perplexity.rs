use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::{LlmError, LlmProvider, LlmRequest, UserPart};
use crate::utils::timing::log_llm_timing;

const MAX_RETRY_ATTEMPTS: usize = 2;
const RETRY_BASE_DELAY_MS: u64 = 900;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_delay(attempt: usize) -> Duration {
    let attempt = attempt.max(1) as u64;
    Duration::from_millis(RETRY_BASE_DELAY_MS.saturating_mul(attempt))
}

/// Chat-completions `content` field: a bare string for text-only requests, an
/// array of typed parts once an image is attached.
fn build_message_content(request: &LlmRequest) -> Value {
    if !request.has_image() {
        let text = request
            .parts
            .iter()
            .filter_map(|part| match part {
                UserPart::Text(text) => Some(text.as_str()),
                UserPart::InlineImage { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        return Value::String(text);
    }

    let parts: Vec<Value> = request
        .parts
        .iter()
        .map(|part| match part {
            UserPart::Text(text) => json!({ "type": "text", "text": text }),
            UserPart::InlineImage { mime_type, data } => {
                let data_url = format!("data:{mime_type};base64,{data}");
                json!({ "type": "image_url", "image_url": { "url": data_url } })
            }
        })
        .collect();
    Value::Array(parts)
}

fn extract_content(response: &Value) -> String {
    response
        .get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("message"))
        .and_then(|v| v.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string()
}

pub struct PerplexityClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl PerplexityClient {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        PerplexityClient {
            http,
            api_key: config.perplexity_api_key.clone(),
            model: config.perplexity_model.clone(),
            base_url: config.perplexity_base_url.clone(),
        }
    }

    fn build_payload(&self, request: &LlmRequest) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": build_message_content(request) },
            ],
        })
    }

    async fn call_api(&self, payload: &Value) -> Result<Value, LlmError> {
        let url = format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        );

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = match self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .timeout(REQUEST_TIMEOUT)
                .json(payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    let retrying = should_retry_error(&err) && attempt < MAX_RETRY_ATTEMPTS;
                    warn!(
                        "Perplexity request failed to send: {err} (timeout={}, connect={}, retrying={})",
                        err.is_timeout(),
                        err.is_connect(),
                        retrying
                    );
                    if retrying {
                        tokio::time::sleep(retry_delay(attempt)).await;
                        continue;
                    }
                    return Err(LlmError::Transport(err.to_string()));
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let (message, body_summary) = summarize_error_body(&body);
                let retrying = should_retry_status(status) && attempt < MAX_RETRY_ATTEMPTS;
                warn!(
                    "Perplexity API error: status={}, body={}, retrying={}",
                    status, body_summary, retrying
                );
                if retrying {
                    tokio::time::sleep(retry_delay(attempt)).await;
                    continue;
                }
                let detail = message.unwrap_or(body_summary);
                return Err(LlmError::Provider(format!("status {status}: {detail}")));
            }

            return response
                .json::<Value>()
                .await
                .map_err(|err| LlmError::Transport(err.to_string()));
        }
    }

    async fn generate(&self, request: &LlmRequest, operation: &str) -> Result<String, LlmError> {
        let payload = self.build_payload(request);
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                target: "llm.perplexity",
                model = %self.model,
                parts = request.parts.len(),
                has_image = request.has_image(),
                "sending chat completion request"
            );
        }

        log_llm_timing("perplexity", &self.model, operation, || async {
            let response = self.call_api(&payload).await?;
            let content = extract_content(&response);
            if content.is_empty() {
                return Err(LlmError::Empty);
            }
            if tracing::enabled!(tracing::Level::DEBUG) {
                debug!(
                    target: "llm.perplexity",
                    model = %self.model,
                    preview = %truncate_for_log(&content, 200),
                    "received completion"
                );
            }
            Ok(content)
        })
        .await
    }
}

#[async_trait]
impl LlmProvider for PerplexityClient {
    fn name(&self) -> &'static str {
        "perplexity"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.generate(request, "complete").await
    }

    async fn complete_vision(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.generate(request, "complete_vision").await
    }
}
