//! Prompt composition: pure functions from (fixed behavior text, user
//! submission, optional stage) to an [`LlmRequest`]. No I/O happens here.

use crate::config::{
    CHAT_SYSTEM_PROMPT, STAGE_FOUR_GRADING_PROMPT, STAGE_ONE_GRADING_PROMPT,
    STAGE_THREE_GRADING_PROMPT, STAGE_TWO_GRADING_PROMPT, VERDICT_FORMAT_INSTRUCTIONS,
};
use crate::llm::{LlmRequest, UserPart};
use crate::progression::Stage;

/// A downloaded photo, base64-encoded and tagged for inline transmission.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

impl EncodedImage {
    fn into_part(self) -> UserPart {
        UserPart::InlineImage {
            mime_type: self.mime_type,
            data: self.data,
        }
    }
}

/// The grading rubric for a stage, or None past the last defined stage.
pub fn grading_prompt(stage: Stage) -> Option<&'static str> {
    match stage {
        Stage::One => Some(STAGE_ONE_GRADING_PROMPT),
        Stage::Two => Some(STAGE_TWO_GRADING_PROMPT),
        Stage::Three => Some(STAGE_THREE_GRADING_PROMPT),
        Stage::Four => Some(STAGE_FOUR_GRADING_PROMPT),
        Stage::Completed => None,
    }
}

fn user_parts(text: Option<&str>, image: Option<EncodedImage>) -> Vec<UserPart> {
    let mut parts = Vec::new();
    if let Some(text) = text {
        if !text.trim().is_empty() {
            parts.push(UserPart::Text(text.to_string()));
        }
    }
    if let Some(image) = image {
        parts.push(image.into_part());
    }
    parts
}

/// Free-chat request: the fixed persona prompt plus whatever the user sent.
pub fn compose_chat_request(text: Option<&str>, image: Option<EncodedImage>) -> LlmRequest {
    LlmRequest {
        system: CHAT_SYSTEM_PROMPT.to_string(),
        parts: user_parts(text, image),
    }
}

/// Grading request for one stage submission. Returns None for Completed,
/// which the caller short-circuits before ever composing a request.
pub fn compose_grading_request(
    stage: Stage,
    text: Option<&str>,
    image: Option<EncodedImage>,
) -> Option<LlmRequest> {
    let rubric = grading_prompt(stage)?;
    let mut parts = user_parts(text, image);
    if parts.is_empty() {
        parts.push(UserPart::Text("(the user sent an empty message)".to_string()));
    }
    Some(LlmRequest {
        system: format!("{rubric}\n{VERDICT_FORMAT_INSTRUCTIONS}"),
        parts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image() -> EncodedImage {
        EncodedImage {
            mime_type: "image/jpeg".to_string(),
            data: "aGVsbG8=".to_string(),
        }
    }

    #[test]
    fn each_stage_has_its_own_rubric() {
        let prompts: Vec<_> = [Stage::One, Stage::Two, Stage::Three, Stage::Four]
            .into_iter()
            .map(|stage| grading_prompt(stage).unwrap())
            .collect();
        for (i, a) in prompts.iter().enumerate() {
            for b in prompts.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
        assert!(grading_prompt(Stage::Completed).is_none());
    }

    #[test]
    fn image_part_follows_the_text_part() {
        let request = compose_chat_request(Some("look at this"), Some(sample_image()));
        assert_eq!(request.parts.len(), 2);
        assert!(matches!(request.parts[0], UserPart::Text(_)));
        assert!(matches!(request.parts[1], UserPart::InlineImage { .. }));
    }

    #[test]
    fn photo_submission_produces_a_nonempty_image_payload() {
        let request = compose_grading_request(Stage::One, None, Some(sample_image())).unwrap();
        assert!(request.has_image());
        match &request.parts[0] {
            UserPart::InlineImage { data, .. } => assert!(!data.is_empty()),
            other => panic!("expected image part, got {other:?}"),
        }
    }

    #[test]
    fn grading_request_carries_the_verdict_format() {
        let request = compose_grading_request(Stage::Two, Some("I reflected."), None).unwrap();
        assert!(request.system.contains("\"status\""));
        assert!(request.system.contains("step 2"));
    }

    #[test]
    fn completed_stage_composes_nothing() {
        assert!(compose_grading_request(Stage::Completed, Some("hi"), None).is_none());
    }

    #[test]
    fn blank_text_is_dropped_from_parts() {
        let request = compose_chat_request(Some("   "), Some(sample_image()));
        assert_eq!(request.parts.len(), 1);
    }
}
