use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::{LlmError, LlmProvider, LlmRequest, UserPart};
use crate::utils::timing::log_llm_timing;

const MAX_RETRY_ATTEMPTS: usize = 2;
const RETRY_BASE_DELAY_MS: u64 = 900;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

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

fn extract_text(response: GeminiResponse) -> String {
    let mut text_parts = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        if let Some(content) = candidate.content {
            for part in content.parts.unwrap_or_default() {
                if let Some(text) = part.text {
                    if !text.trim().is_empty() {
                        text_parts.push(text);
                    }
                }
            }
        }
    }
    text_parts.join("\n")
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    top_k: i32,
    top_p: f32,
    max_output_tokens: i32,
    safety_profile: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        GeminiClient {
            http,
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            temperature: config.gemini_temperature,
            top_k: config.gemini_top_k,
            top_p: config.gemini_top_p,
            max_output_tokens: config.gemini_max_output_tokens,
            safety_profile: config.gemini_safety_settings.clone(),
        }
    }

    fn redact_api_key(&self, text: &str) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    fn safety_settings(&self) -> Vec<Value> {
        let threshold = match self.safety_profile.as_str() {
            "standard" => "BLOCK_MEDIUM_AND_ABOVE",
            _ => "OFF",
        };
        [
            "HARM_CATEGORY_HARASSMENT",
            "HARM_CATEGORY_HATE_SPEECH",
            "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "HARM_CATEGORY_DANGEROUS_CONTENT",
            "HARM_CATEGORY_CIVIC_INTEGRITY",
        ]
        .into_iter()
        .map(|category| json!({ "category": category, "threshold": threshold }))
        .collect()
    }

    fn build_payload(&self, request: &LlmRequest) -> Value {
        let parts: Vec<Value> = request
            .parts
            .iter()
            .map(|part| match part {
                UserPart::Text(text) => json!({ "text": text }),
                UserPart::InlineImage { mime_type, data } => json!({
                    "inlineData": {
                        "mimeType": mime_type,
                        "data": data
                    }
                }),
            })
            .collect();

        json!({
            "systemInstruction": { "parts": [{ "text": request.system }] },
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "temperature": self.temperature,
                "topK": self.top_k,
                "topP": self.top_p,
                "maxOutputTokens": self.max_output_tokens,
            },
            "safetySettings": self.safety_settings(),
        })
    }

    async fn call_api(&self, payload: &Value) -> Result<GeminiResponse, LlmError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = match self
                .http
                .post(&url)
                .timeout(REQUEST_TIMEOUT)
                .json(payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    let err_text = self.redact_api_key(&err.to_string());
                    let retrying = should_retry_error(&err) && attempt < MAX_RETRY_ATTEMPTS;
                    warn!(
                        "Gemini request failed to send: {} (timeout={}, connect={}, retrying={})",
                        err_text,
                        err.is_timeout(),
                        err.is_connect(),
                        retrying
                    );
                    if retrying {
                        tokio::time::sleep(retry_delay(attempt)).await;
                        continue;
                    }
                    return Err(LlmError::Transport(err_text));
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let (message, body_summary) = summarize_error_body(&body);
                let retrying = should_retry_status(status) && attempt < MAX_RETRY_ATTEMPTS;
                warn!(
                    "Gemini API error: status={}, body={}, retrying={}",
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
                .json::<GeminiResponse>()
                .await
                .map_err(|err| LlmError::Transport(self.redact_api_key(&err.to_string())));
        }
    }

    async fn generate(&self, request: &LlmRequest, operation: &str) -> Result<String, LlmError> {
        let payload = self.build_payload(request);
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                target: "llm.gemini",
                model = %self.model,
                parts = request.parts.len(),
                has_image = request.has_image(),
                "sending generateContent request"
            );
        }

        log_llm_timing("gemini", &self.model, operation, || async {
            let response = self.call_api(&payload).await?;
            let text = extract_text(response);
            if text.trim().is_empty() {
                return Err(LlmError::Empty);
            }
            if tracing::enabled!(tracing::Level::DEBUG) {
                debug!(
                    target: "llm.gemini",
                    model = %self.model,
                    preview = %truncate_for_log(&text, 200),
                    "received completion"
                );
            }
            Ok(text)
        })
        .await
    }
}

#[async_trait]
impl LlmProvider for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.generate(request, "complete").await
    }

    async fn complete_vision(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.generate(request, "complete_vision").await
    }
}
