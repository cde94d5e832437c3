use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Comment used when the lenient policy papers over unparseable model output.
pub const FALLBACK_COMMENT: &str = "Looks good to me. Onwards!";

static FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").expect("valid fence regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictStatus {
    #[serde(alias = "pass", alias = "Pass")]
    Pass,
    #[serde(alias = "fail", alias = "Fail")]
    Fail,
}

/// Structured PASS/FAIL judgment the model is asked to self-report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: VerdictStatus,
    #[serde(default)]
    pub comment: String,
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        self.status == VerdictStatus::Pass
    }

    fn fallback_pass() -> Self {
        Verdict {
            status: VerdictStatus::Pass,
            comment: FALLBACK_COMMENT.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unparseable verdict: {0}")]
pub struct VerdictParseError(String);

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match FENCE_RE.captures(trimmed) {
        Some(captures) => captures.get(1).map(|m| m.as_str()).unwrap_or(trimmed),
        None => trimmed,
    }
}

/// Permissive extractor for the model's self-reported verdict. Fenced code
/// blocks are stripped before JSON parsing. With `lenient` on, any failure
/// yields an optimistic PASS with a canned comment; with it off, the failure
/// propagates and the caller decides.
pub fn parse_verdict(raw: &str, lenient: bool) -> Result<Verdict, VerdictParseError> {
    let body = strip_code_fence(raw);
    match serde_json::from_str::<Verdict>(body) {
        Ok(verdict) => Ok(verdict),
        Err(err) if lenient => {
            tracing::debug!("Verdict parse failed ({err}); failing open to PASS");
            Ok(Verdict::fallback_pass())
        }
        Err(err) => Err(VerdictParseError(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_parses_to_pass_with_comment() {
        let raw = "```json\n{\"status\":\"PASS\",\"comment\":\"ok\"}\n```";
        let verdict = parse_verdict(raw, true).unwrap();
        assert_eq!(verdict.status, VerdictStatus::Pass);
        assert_eq!(verdict.comment, "ok");
    }

    #[test]
    fn bare_json_fail_verdict_parses() {
        let raw = "{\"status\": \"FAIL\", \"comment\": \"too blurry\"}";
        let verdict = parse_verdict(raw, true).unwrap();
        assert_eq!(verdict.status, VerdictStatus::Fail);
        assert_eq!(verdict.comment, "too blurry");
    }

    #[test]
    fn garbage_fails_open_to_pass_under_lenient_policy() {
        let verdict = parse_verdict("I think this is great, PASS!", true).unwrap();
        assert_eq!(verdict.status, VerdictStatus::Pass);
        assert_eq!(verdict.comment, FALLBACK_COMMENT);
    }

    #[test]
    fn garbage_is_an_error_when_strict() {
        assert!(parse_verdict("not json at all", false).is_err());
    }

    #[test]
    fn missing_comment_defaults_to_empty() {
        let verdict = parse_verdict("{\"status\":\"FAIL\"}", true).unwrap();
        assert_eq!(verdict.status, VerdictStatus::Fail);
        assert_eq!(verdict.comment, "");
    }

    #[test]
    fn plain_fence_without_language_tag_is_stripped() {
        let raw = "```\n{\"status\":\"PASS\",\"comment\":\"neat desk\"}\n```";
        let verdict = parse_verdict(raw, false).unwrap();
        assert!(verdict.is_pass());
    }
}
