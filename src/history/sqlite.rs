use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use super::SessionStore;
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;
use crate::llm::{Message, Role, ToolCallInfo};

const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    db_path: PathBuf,
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(paths.history_db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(ApiError::internal)?;
        }

        // FULL: a committed append survives power loss, not just a process crash.
        let connect_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(connect_options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { db_path, pool };
        store.init_db().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    async fn init_db(&self) -> Result<(), ApiError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        if version == SCHEMA_VERSION {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        sqlx::query(
            "\
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "\
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('system', 'user', 'assistant', 'tool')),
                content TEXT NOT NULL,
                tool_call TEXT,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_session_id_id ON messages(session_id, id)",
        )
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        let pragma = format!("PRAGMA user_version = {}", SCHEMA_VERSION);
        sqlx::query(&pragma)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, session_id: &str) -> Result<Vec<Message>, ApiError> {
        let rows = sqlx::query(
            "SELECT role, content, tool_call FROM messages WHERE session_id = ?1 ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.into_iter().map(message_from_row).collect()
    }

    async fn append_many(&self, session_id: &str, messages: &[Message]) -> Result<(), ApiError> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        ensure_session(&mut tx, session_id).await?;

        for message in messages {
            let tool_call = message
                .tool_call
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(ApiError::internal)?;

            sqlx::query(
                "INSERT INTO messages (session_id, role, content, tool_call) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(session_id)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(tool_call)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        sqlx::query(
            "UPDATE sessions SET updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?1",
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }
}

fn message_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Message, ApiError> {
    let role: String = row.try_get("role").map_err(ApiError::internal)?;
    let role = Role::parse(&role)
        .ok_or_else(|| ApiError::Internal(format!("Unknown role in history: {}", role)))?;
    let content: String = row.try_get("content").map_err(ApiError::internal)?;
    let raw_tool_call: Option<String> = row.try_get("tool_call").map_err(ApiError::internal)?;
    let tool_call = raw_tool_call
        .map(|raw| serde_json::from_str::<ToolCallInfo>(&raw))
        .transpose()
        .map_err(ApiError::internal)?;

    Ok(Message {
        role,
        content,
        tool_call,
    })
}

async fn ensure_session(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &str,
) -> Result<(), ApiError> {
    sqlx::query("INSERT OR IGNORE INTO sessions (id) VALUES (?1)")
        .bind(session_id)
        .execute(&mut **tx)
        .await
        .map_err(ApiError::internal)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ConversationSession;
    use std::sync::Arc;

    #[tokio::test]
    async fn appends_survive_reopen_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");

        {
            let store = SqliteSessionStore::with_path(path.clone()).await.unwrap();
            store.append("s1", &Message::user("hello")).await.unwrap();
            store
                .append("s1", &Message::tool_result("search_acme", "Title: A\n\nx"))
                .await
                .unwrap();
            store.append("s1", &Message::assistant("hi!")).await.unwrap();
            store.append("s2", &Message::user("other")).await.unwrap();
        }

        let store = SqliteSessionStore::with_path(path).await.unwrap();
        let messages = store.get("s1").await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], Message::user("hello"));
        assert_eq!(
            messages[1].tool_call,
            Some(ToolCallInfo::Result {
                tool_name: "search_acme".to_string(),
                result: "Title: A\n\nx".to_string(),
            })
        );
        assert_eq!(messages[2], Message::assistant("hi!"));
        assert_eq!(store.get("s2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_second_write_leaves_no_half_turn() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSessionStore::with_path(dir.path().join("history.db"))
            .await
            .unwrap();
        store.append("s1", &Message::user("earlier")).await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_answers BEFORE INSERT ON messages \
             WHEN NEW.role = 'assistant' BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let session = ConversationSession::new(Arc::new(store.clone()));
        assert!(session.record_turn("s1", "question", "answer").await.is_err());

        assert_eq!(store.get("s1").await.unwrap(), vec![Message::user("earlier")]);
    }

    #[tokio::test]
    async fn unknown_session_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSessionStore::with_path(dir.path().join("history.db"))
            .await
            .unwrap();
        assert!(store.get("nobody").await.unwrap().is_empty());
    }
}
