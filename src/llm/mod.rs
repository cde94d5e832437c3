pub mod gemini;
pub mod perplexity;
pub mod prompt;
pub mod verdict;

pub use gemini::GeminiClient;
pub use perplexity::PerplexityClient;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::llm::verdict::{parse_verdict, Verdict, VerdictParseError};

/// One composed request to the completion API: a system instruction plus the
/// ordered user parts. Built fresh per inbound message, never persisted.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: String,
    pub parts: Vec<UserPart>,
}

#[derive(Debug, Clone)]
pub enum UserPart {
    Text(String),
    InlineImage { mime_type: String, data: String },
}

impl LlmRequest {
    pub fn has_image(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, UserPart::InlineImage { .. }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("empty completion")]
    Empty,
}

/// Capability interface over the two hosted completion providers. The
/// deployment picks one implementation at startup; nothing branches on the
/// provider after that.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;

    async fn complete_vision(&self, request: &LlmRequest) -> Result<String, LlmError>;
}

pub const OFFLINE_REPLY: &str =
    "I can't reach my brain right now. Give me a minute and try again.";
pub const SILENCE_REPLY: &str = "The model went quiet and sent nothing back. Try once more?";

pub fn glitch_reply(detail: &str) -> String {
    format!("Something glitched on my end: {detail}")
}

/// Wraps the selected provider and turns every failure into a fixed sentinel
/// reply, so the user always receives text. The verdict mode runs the same
/// degraded text through the permissive extractor.
#[derive(Clone)]
pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    lenient_verdict_parsing: bool,
}

impl LlmGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, lenient_verdict_parsing: bool) -> Self {
        LlmGateway {
            provider,
            lenient_verdict_parsing,
        }
    }

    /// Free-text mode. Never fails: transport errors, provider errors, and
    /// empty completions all degrade to sentinel strings.
    pub async fn reply_text(&self, request: &LlmRequest) -> String {
        let result = if request.has_image() {
            self.provider.complete_vision(request).await
        } else {
            self.provider.complete(request).await
        };

        match result {
            Ok(text) => text,
            Err(LlmError::Transport(detail)) => {
                warn!(provider = self.provider.name(), "LLM transport failure: {detail}");
                OFFLINE_REPLY.to_string()
            }
            Err(LlmError::Provider(detail)) => {
                warn!(provider = self.provider.name(), "LLM provider error: {detail}");
                glitch_reply(&detail)
            }
            Err(LlmError::Empty) => {
                warn!(provider = self.provider.name(), "LLM returned no candidate text");
                SILENCE_REPLY.to_string()
            }
        }
    }

    /// Verdict mode. The raw (possibly sentinel) text goes through the
    /// permissive extractor; under the lenient policy a parse failure becomes
    /// an optimistic PASS so formatting drift never blocks progression.
    pub async fn grade(&self, request: &LlmRequest) -> Result<Verdict, VerdictParseError> {
        let raw = self.reply_text(request).await;
        parse_verdict(&raw, self.lenient_verdict_parsing)
    }
}
