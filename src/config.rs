use std::env;

use anyhow::Result;
use tracing::warn;

/// Which hosted completion API the bot talks to. Picked once at startup,
/// never switched at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    Perplexity,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Perplexity => "perplexity",
        }
    }
}

fn parse_provider(value: &str) -> ProviderKind {
    match value.trim().to_lowercase().as_str() {
        "" | "gemini" => ProviderKind::Gemini,
        "perplexity" => ProviderKind::Perplexity,
        other => {
            warn!("Unknown LLM_PROVIDER value '{other}'; defaulting to gemini.");
            ProviderKind::Gemini
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub log_level: String,
    pub bind_addr: String,
    pub database_url: String,
    pub llm_provider: ProviderKind,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_temperature: f32,
    pub gemini_top_k: i32,
    pub gemini_top_p: f32,
    pub gemini_max_output_tokens: i32,
    pub gemini_safety_settings: String,
    pub perplexity_api_key: String,
    pub perplexity_model: String,
    pub perplexity_base_url: String,
    pub enable_progression: bool,
    pub followup_delay_seconds: u64,
    pub lenient_verdict_parsing: bool,
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_i32(name: &str, default: i32) -> i32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn normalize_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "permissive".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to permissive.",
                value
            );
            "permissive".to_string()
        }
    }
}

impl Config {
    /// Reads the whole configuration from the environment. A missing required
    /// variable fails here, at startup, never inside a request.
    pub fn load() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!("BOT_TOKEN is required"));
        }

        let llm_provider = parse_provider(&env_string("LLM_PROVIDER", "gemini"));
        let gemini_api_key = env_string("GEMINI_API_KEY", "");
        let perplexity_api_key = env_string("PERPLEXITY_API_KEY", "");
        match llm_provider {
            ProviderKind::Gemini if gemini_api_key.trim().is_empty() => {
                return Err(anyhow::anyhow!(
                    "GEMINI_API_KEY is required when LLM_PROVIDER=gemini"
                ));
            }
            ProviderKind::Perplexity if perplexity_api_key.trim().is_empty() => {
                return Err(anyhow::anyhow!(
                    "PERPLEXITY_API_KEY is required when LLM_PROVIDER=perplexity"
                ));
            }
            _ => {}
        }

        Ok(Config {
            bot_token,
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            bind_addr: env_string("BIND_ADDR", "0.0.0.0:8080"),
            database_url: env_string("DATABASE_URL", "sqlite://bot.db?mode=rwc"),
            llm_provider,
            gemini_api_key,
            gemini_model: env_string("GEMINI_MODEL", "gemini-2.0-flash"),
            gemini_temperature: env_f32("GEMINI_TEMPERATURE", 0.7),
            gemini_top_k: env_i32("GEMINI_TOP_K", 40),
            gemini_top_p: env_f32("GEMINI_TOP_P", 0.95),
            gemini_max_output_tokens: env_i32("GEMINI_MAX_OUTPUT_TOKENS", 2048),
            gemini_safety_settings: normalize_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "permissive",
            )),
            perplexity_api_key,
            perplexity_model: env_string("PERPLEXITY_MODEL", "sonar"),
            perplexity_base_url: env_string("PERPLEXITY_BASE_URL", "https://api.perplexity.ai"),
            enable_progression: env_bool("ENABLE_PROGRESSION", false),
            followup_delay_seconds: env_u64("FOLLOWUP_DELAY_SECONDS", 4),
            lenient_verdict_parsing: env_bool("LENIENT_VERDICT_PARSING", true),
        })
    }
}

pub const CHAT_SYSTEM_PROMPT: &str = "You are FocusCoach, a friendly accountability companion chatting with one person on Telegram.\n\nGuidelines for your responses:\n1. Answer directly and keep it under 150 words.\n2. Be warm but honest; do not flatter.\n3. When the user sends a photo, describe what you see and react to it specifically.\n4. Respond in the same language the user writes in.\n5. Plain text only, no Markdown.\n";

pub const VERDICT_FORMAT_INSTRUCTIONS: &str = "Respond with ONLY a JSON object, no prose around it, in this exact shape:\n{\"status\": \"PASS\" or \"FAIL\", \"comment\": \"one encouraging sentence for the user\"}";

pub const STAGE_ONE_GRADING_PROMPT: &str = "You are grading step 1 of an onboarding program: the user must send a screenshot of their phone's screen-time report.\n\nPASS if the image is a legible screen-time or digital-wellbeing report where at least the total usage time can be read. FAIL if it is any other kind of image, is too blurry to read, or no image was provided.\n";

pub const STAGE_TWO_GRADING_PROMPT: &str = "You are grading step 2 of an onboarding program: the user must write a short journal reflection about their previous day.\n\nPASS if the text is a genuine first-person reflection of at least two sentences that mentions something that happened and how the user felt about it. FAIL if it is a greeting, a question, filler, or fewer than two sentences.\n";

pub const STAGE_THREE_GRADING_PROMPT: &str = "You are grading step 3 of an onboarding program: the user must send a short list of tasks they completed today.\n\nPASS if the message contains at least two distinct completed tasks, in any list format. FAIL if there are fewer than two tasks or the items are plans rather than completed work.\n";

pub const STAGE_FOUR_GRADING_PROMPT: &str = "You are grading step 4 of an onboarding program: the user must send a photo of their tidied workspace.\n\nPASS if the image shows a desk or work area that is reasonably orderly: a clear working surface and no obvious piles of clutter. FAIL if the workspace is visibly messy, the photo shows something else, or no image was provided.\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parse_defaults_to_gemini() {
        assert_eq!(parse_provider("gemini"), ProviderKind::Gemini);
        assert_eq!(parse_provider("Perplexity"), ProviderKind::Perplexity);
        assert_eq!(parse_provider(""), ProviderKind::Gemini);
        assert_eq!(parse_provider("mystery"), ProviderKind::Gemini);
    }

    #[test]
    fn safety_settings_normalize_to_known_profiles() {
        assert_eq!(normalize_safety_settings("off".to_string()), "permissive");
        assert_eq!(
            normalize_safety_settings("Standard".to_string()),
            "standard"
        );
        assert_eq!(normalize_safety_settings("  ".to_string()), "permissive");
    }
}
