pub mod chat;
pub mod dispatch;
pub mod media;
pub mod onboarding;

/// What a flow decided to tell the user: the immediate reply plus an optional
/// delayed follow-up message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyOutcome {
    pub reply: String,
    pub followup: Option<String>,
}

impl ReplyOutcome {
    pub fn reply(text: impl Into<String>) -> Self {
        ReplyOutcome {
            reply: text.into(),
            followup: None,
        }
    }
}
