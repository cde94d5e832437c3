use anyhow::Result;
use tracing::warn;

use crate::handlers::dispatch::IncomingMessage;
use crate::handlers::media::{self, APOLOGY_REPLY};
use crate::handlers::ReplyOutcome;
use crate::llm::prompt;
use crate::state::AppState;

/// Free-chat flow: forward whatever the user sent to the model and relay its
/// answer. Exactly one gateway call per message.
pub async fn respond(state: &AppState, incoming: &IncomingMessage) -> Result<ReplyOutcome> {
    let image = match &incoming.photo {
        Some(file_id) => {
            match media::fetch_photo(&state.bot, &state.http, &state.config.bot_token, file_id)
                .await
            {
                Ok(image) => Some(image),
                Err(err) => {
                    warn!("Photo fetch failed: {err}");
                    return Ok(ReplyOutcome::reply(APOLOGY_REPLY));
                }
            }
        }
        None => None,
    };

    let request = prompt::compose_chat_request(incoming.text.as_deref(), image);
    let reply = state.gateway.reply_text(&request).await;
    Ok(ReplyOutcome::reply(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::FakeProvider;
    use crate::state::testing::test_state;

    #[tokio::test]
    async fn text_message_makes_exactly_one_gateway_call() {
        let provider = FakeProvider::replying("hello back");
        let (state, _scheduler, _dir) = test_state(provider.clone(), false).await;

        let incoming = IncomingMessage {
            chat_id: teloxide::types::ChatId(1),
            user_id: 42,
            display_name: "Ada".to_string(),
            text: Some("hello".to_string()),
            photo: None,
        };

        let outcome = respond(&state, &incoming).await.unwrap();
        assert_eq!(outcome.reply, "hello back");
        assert_eq!(outcome.followup, None);
        assert_eq!(provider.calls(), 1);
    }
}
