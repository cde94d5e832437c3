//! The staged onboarding flow: grade the submission against the user's
//! current stage, advance on PASS, and queue the delayed unlock message.
//! Telegram sends happen in `dispatch`; this module only decides.

use anyhow::Result;
use tracing::warn;

use crate::handlers::dispatch::IncomingMessage;
use crate::handlers::media::{self, APOLOGY_REPLY};
use crate::handlers::ReplyOutcome;
use crate::llm::prompt;
use crate::progression::Stage;
use crate::state::AppState;

pub const ALREADY_COMPLETED_REPLY: &str =
    "You have already finished all four stages. Nothing left to grade, enjoy the streak.";

const FINAL_PASS_REPLY: &str =
    "Pass! That was the last stage. You completed the whole program.";

fn pass_reply(comment: &str) -> String {
    let comment = comment.trim();
    if comment.is_empty() {
        "Pass! On to the next stage.".to_string()
    } else {
        format!("Pass! {comment}")
    }
}

fn final_pass_reply(comment: &str) -> String {
    let comment = comment.trim();
    if comment.is_empty() {
        FINAL_PASS_REPLY.to_string()
    } else {
        format!("{FINAL_PASS_REPLY} {comment}")
    }
}

fn fail_reply(comment: &str, stage: Stage) -> String {
    let comment = comment.trim();
    let task = stage.task_description();
    if comment.is_empty() {
        format!("Not this time. Try again: {task}.")
    } else {
        format!("Not this time. {comment} Try again: {task}.")
    }
}

fn ungraded_reply(stage: Stage) -> String {
    format!(
        "I couldn't grade that submission. Try again: {}.",
        stage.task_description()
    )
}

pub fn unlock_message(stage: Stage) -> String {
    match stage.number() {
        Some(number) => format!(
            "Stage {number} unlocked! Your next task: {}.",
            stage.task_description()
        ),
        None => FINAL_PASS_REPLY.to_string(),
    }
}

pub async fn evaluate(state: &AppState, incoming: &IncomingMessage) -> Result<ReplyOutcome> {
    let user = state
        .db
        .get_or_create_user(incoming.user_id, &incoming.display_name)
        .await?;
    let stage = Stage::from_level(user.level);

    // Terminal state: no grading call, fixed reply.
    if stage == Stage::Completed {
        return Ok(ReplyOutcome::reply(ALREADY_COMPLETED_REPLY));
    }

    let image = match &incoming.photo {
        Some(file_id) => {
            match media::fetch_photo(&state.bot, &state.http, &state.config.bot_token, file_id)
                .await
            {
                Ok(image) => Some(image),
                Err(err) => {
                    warn!("Photo fetch failed during grading: {err}");
                    return Ok(ReplyOutcome::reply(APOLOGY_REPLY));
                }
            }
        }
        None => None,
    };

    let Some(request) = prompt::compose_grading_request(stage, incoming.text.as_deref(), image)
    else {
        return Ok(ReplyOutcome::reply(ALREADY_COMPLETED_REPLY));
    };

    let verdict = match state.gateway.grade(&request).await {
        Ok(verdict) => verdict,
        Err(err) => {
            warn!("Verdict unparseable under strict policy: {err}");
            return Ok(ReplyOutcome::reply(ungraded_reply(stage)));
        }
    };

    if !verdict.is_pass() {
        return Ok(ReplyOutcome::reply(fail_reply(&verdict.comment, stage)));
    }

    let advanced = state
        .db
        .advance_user_level(incoming.user_id, user.level)
        .await?;
    if !advanced {
        // Another delivery of the same submission won the race; the reply is
        // still a pass, but no second advance happened.
        warn!(
            "Stage advance skipped for user {}: level moved concurrently",
            incoming.user_id
        );
    }

    let next = stage.next();
    if next == Stage::Completed {
        Ok(ReplyOutcome::reply(final_pass_reply(&verdict.comment)))
    } else {
        Ok(ReplyOutcome {
            reply: pass_reply(&verdict.comment),
            followup: Some(unlock_message(next)),
        })
    }
}
