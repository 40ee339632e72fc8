//! Durable storage for diagnostic sessions
//!
//! The engine only depends on the [`SessionStore`] trait. Two implementations
//! ship with the crate:
//!
//! - [`InMemorySessionStore`] - process-local map, used in tests and embedding
//! - [`FileSessionStore`] - one JSON document per session on disk

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::diagnostic::DiagnosticSession;

pub use file::FileSessionStore;
pub use memory::InMemorySessionStore;

/// CRUD contract for session records, keyed by opaque session ID
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session and return the identifier assigned to it.
    /// Any `id` already present on `session` is ignored.
    async fn create(&self, session: &DiagnosticSession) -> Result<String, StoreError>;

    /// Load a session, `None` if it does not exist
    async fn load(&self, session_id: &str) -> Result<Option<DiagnosticSession>, StoreError>;

    /// Overwrite an existing session
    async fn update(&self, session: &DiagnosticSession) -> Result<(), StoreError>;

    /// Remove a session, returning whether it existed
    async fn delete(&self, session_id: &str) -> Result<bool, StoreError>;

    /// All sessions owned by `user_id`
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<DiagnosticSession>, StoreError>;
}

/// Generate a fresh time-sortable session identifier
pub fn new_session_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Error type for store operations
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    /// Update targeted a record that does not exist
    Missing(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "I/O error: {}", e),
            StoreError::Serialization(e) => write!(f, "Serialization error: {}", e),
            StoreError::Missing(id) => write!(f, "No stored session with id {}", id),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Serialization(e) => Some(e),
            StoreError::Missing(_) => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e)
    }
}
