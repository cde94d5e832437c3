use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Persistent per-user progression record. One row per sender id.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub user_id: i64,
    pub display_name: String,
    pub level: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Text,
    Image,
}

impl ExchangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExchangeKind::Text => "text",
            ExchangeKind::Image => "image",
        }
    }
}

/// One append-only audit row: what came in, what went out. Never read back
/// by the bot itself.
#[derive(Debug, Clone)]
pub struct LogInsert {
    pub user_id: i64,
    pub display_name: String,
    pub input: String,
    pub reply: String,
    pub kind: ExchangeKind,
}
