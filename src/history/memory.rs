use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::SessionStore;
use crate::core::errors::ApiError;
use crate::llm::Message;

/// Process-local store; history is lost on restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Vec<Message>, ApiError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn append_many(&self, session_id: &str, messages: &[Message]) -> Result<(), ApiError> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }
}
