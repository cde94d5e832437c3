use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::db::models::{LogInsert, UserRow};

const LOG_QUEUE_CAPACITY: usize = 1000;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    sender: mpsc::Sender<LogInsert>,
}

impl Database {
    pub async fn init(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (\
                user_id INTEGER PRIMARY KEY,\
                display_name TEXT NOT NULL,\
                level INTEGER NOT NULL DEFAULT 1,\
                created_at TEXT NOT NULL,\
                updated_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS logs (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                user_id INTEGER NOT NULL,\
                display_name TEXT NOT NULL,\
                input TEXT NOT NULL,\
                reply TEXT NOT NULL,\
                kind TEXT NOT NULL,\
                created_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_logs_user_id ON logs(user_id);")
            .execute(&pool)
            .await?;

        info!("Database tables created successfully");

        let (sender, receiver) = mpsc::channel(LOG_QUEUE_CAPACITY);
        let writer_pool = pool.clone();
        tokio::spawn(async move {
            log_writer(writer_pool, receiver).await;
        });

        info!("Audit log writer task started");

        Ok(Database { pool, sender })
    }

    /// Best-effort audit logging: a full queue or a closed writer drops the
    /// row with a warning and nothing else.
    pub fn queue_log(&self, insert: LogInsert) {
        if let Err(err) = self.sender.try_send(insert) {
            warn!("Failed to queue audit log row: {err}");
        }
    }

    /// Idempotent get-or-create: at most one row per sender id, created at
    /// level 1 on first contact.
    pub async fn get_or_create_user(&self, user_id: i64, display_name: &str) -> Result<UserRow> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users (user_id, display_name, level, created_at, updated_at) \
             VALUES (?, ?, 1, ?, ?) \
             ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(display_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, UserRow>(
            "SELECT user_id, display_name, level, created_at, updated_at \
             FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Advances the stage counter by exactly one, guarded on the expected
    /// current level so a stale caller can neither regress nor double-advance.
    /// Returns whether the row actually moved.
    pub async fn advance_user_level(&self, user_id: i64, from_level: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET level = level + 1, updated_at = ? \
             WHERE user_id = ? AND level = ?",
        )
        .bind(Utc::now())
        .bind(user_id)
        .bind(from_level)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_log(pool: &SqlitePool, insert: &LogInsert) -> Result<()> {
        sqlx::query(
            "INSERT INTO logs (user_id, display_name, input, reply, kind, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(insert.user_id)
        .bind(&insert.display_name)
        .bind(&insert.input)
        .bind(&insert.reply)
        .bind(insert.kind.as_str())
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }
}

async fn log_writer(pool: SqlitePool, mut receiver: mpsc::Receiver<LogInsert>) {
    while let Some(insert) = receiver.recv().await {
        if let Err(err) = Database::insert_log(&pool, &insert).await {
            warn!("Error in log_writer: {err}");
        }
    }

    pool.close().await;
    info!("Audit log writer task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ExchangeKind;

    async fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let url = format!("sqlite://{}/test.db?mode=rwc", dir.path().display());
        let db = Database::init(&url).await.expect("init database");
        (db, dir)
    }

    #[tokio::test]
    async fn first_contact_creates_one_row_at_level_one() {
        let (db, _dir) = test_db().await;
        let row = db.get_or_create_user(42, "Ada").await.unwrap();
        assert_eq!(row.level, 1);
        assert_eq!(row.display_name, "Ada");

        let again = db.get_or_create_user(42, "Ada Again").await.unwrap();
        assert_eq!(again.level, 1);
        // Second contact performed no insert: original name survives.
        assert_eq!(again.display_name, "Ada");
    }

    #[tokio::test]
    async fn advance_is_guarded_on_the_expected_level() {
        let (db, _dir) = test_db().await;
        db.get_or_create_user(7, "Grace").await.unwrap();

        assert!(db.advance_user_level(7, 1).await.unwrap());
        let row = db.get_or_create_user(7, "Grace").await.unwrap();
        assert_eq!(row.level, 2);

        // Stale expectation: no movement.
        assert!(!db.advance_user_level(7, 1).await.unwrap());
        let row = db.get_or_create_user(7, "Grace").await.unwrap();
        assert_eq!(row.level, 2);
    }

    #[tokio::test]
    async fn log_rows_are_appended() {
        let (db, _dir) = test_db().await;
        let insert = LogInsert {
            user_id: 1,
            display_name: "Ada".to_string(),
            input: "[Photo]".to_string(),
            reply: "Nice workspace.".to_string(),
            kind: ExchangeKind::Image,
        };
        Database::insert_log(&db.pool, &insert).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM logs")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
