//! Process-local session store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{new_session_id, SessionStore, StoreError};
use crate::diagnostic::DiagnosticSession;

/// Session store backed by a map. Contents are lost when the process exits.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, DiagnosticSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: &DiagnosticSession) -> Result<String, StoreError> {
        let id = new_session_id();
        let mut stored = session.clone();
        stored.id = id.clone();
        self.sessions.write().await.insert(id.clone(), stored);
        Ok(id)
    }

    async fn load(&self, session_id: &str) -> Result<Option<DiagnosticSession>, StoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn update(&self, session: &DiagnosticSession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(session.id.clone())),
        }
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<DiagnosticSession>, StoreError> {
        let mut sessions: Vec<DiagnosticSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}
