//! Session store persisting one JSON document per session
//!
//! Layout: `<base_dir>/<session_id>.json`. Writes go to a temporary file that
//! is renamed into place so a crash never leaves a half-written session.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use super::{new_session_id, SessionStore, StoreError};
use crate::diagnostic::DiagnosticSession;

/// Session storage on the local filesystem
pub struct FileSessionStore {
    /// Base directory for session files
    base_dir: PathBuf,
}

impl FileSessionStore {
    /// Create a new session store, creating the directory if needed
    pub fn new(base_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Get the file path for a session
    fn session_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", session_id))
    }

    async fn write_session(&self, session: &DiagnosticSession) -> Result<(), StoreError> {
        let path = self.session_path(&session.id);
        let tmp = self.base_dir.join(format!(".{}.json.tmp", session.id));
        let json = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn read_session(path: &Path) -> Result<DiagnosticSession, StoreError> {
        let json = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&json)?)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, session: &DiagnosticSession) -> Result<String, StoreError> {
        let mut stored = session.clone();
        stored.id = new_session_id();
        self.write_session(&stored).await?;
        Ok(stored.id)
    }

    async fn load(&self, session_id: &str) -> Result<Option<DiagnosticSession>, StoreError> {
        match Self::read_session(&self.session_path(session_id)).await {
            Ok(session) => Ok(Some(session)),
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update(&self, session: &DiagnosticSession) -> Result<(), StoreError> {
        if !tokio::fs::try_exists(self.session_path(&session.id)).await? {
            return Err(StoreError::Missing(session.id.clone()));
        }
        self.write_session(session).await
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(self.session_path(session_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<DiagnosticSession>, StoreError> {
        let mut sessions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            match Self::read_session(&path).await {
                Ok(session) if session.user_id == user_id => sessions.push(session),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable session file"),
            }
        }
        // Sort by creation time (newest first)
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}
