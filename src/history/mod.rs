//! Per-session conversation memory.

mod memory;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::core::errors::ApiError;
use crate::llm::Message;

pub use memory::InMemorySessionStore;
pub use sqlite::SqliteSessionStore;

const MAX_SESSION_ID_LEN: usize = 128;

/// Append-only message log keyed by session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Messages in append order; empty for an unknown session.
    async fn get(&self, session_id: &str) -> Result<Vec<Message>, ApiError>;

    /// Appends every message or none of them. Durable once this returns.
    async fn append_many(&self, session_id: &str, messages: &[Message]) -> Result<(), ApiError>;

    async fn append(&self, session_id: &str, message: &Message) -> Result<(), ApiError> {
        self.append_many(session_id, std::slice::from_ref(message)).await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionHistory {
    pub session_id: String,
    pub messages: Vec<Message>,
}

/// Session-id checks and turn recording on top of a `SessionStore`.
#[derive(Clone)]
pub struct ConversationSession {
    store: Arc<dyn SessionStore>,
}

impl ConversationSession {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self, session_id: &str) -> Result<SessionHistory, ApiError> {
        let session_id = validate_session_id(session_id)?;
        let messages = self.store.get(session_id).await?;
        Ok(SessionHistory {
            session_id: session_id.to_string(),
            messages,
        })
    }

    pub async fn append(&self, session_id: &str, message: Message) -> Result<(), ApiError> {
        let session_id = validate_session_id(session_id)?;
        self.store.append(session_id, &message).await
    }

    /// Appends the user input and the assistant answer as one write.
    pub async fn record_turn(
        &self,
        session_id: &str,
        input: &str,
        output: &str,
    ) -> Result<(), ApiError> {
        let session_id = validate_session_id(session_id)?;
        let turn = [Message::user(input), Message::assistant(output)];
        self.store.append_many(session_id, &turn).await?;
        tracing::debug!(session_id = %session_id, "Recorded turn");
        Ok(())
    }
}

fn validate_session_id(session_id: &str) -> Result<&str, ApiError> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("session_id must not be empty".to_string()));
    }
    if trimmed.len() > MAX_SESSION_ID_LEN {
        return Err(ApiError::BadRequest(format!(
            "session_id longer than {} characters",
            MAX_SESSION_ID_LEN
        )));
    }
    Ok(trimmed)
}
