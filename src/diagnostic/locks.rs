//! Per-session mutual exclusion
//!
//! Continue and delete are load -> oracle -> persist sequences. Two of them
//! on the same session must not interleave, while distinct sessions proceed
//! in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Lock table keyed by session ID
#[derive(Default)]
pub struct SessionLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the lock for a session
    async fn get_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        // Fast path: lock already exists
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(session_id) {
                return lock.clone();
            }
        }

        let mut locks = self.locks.write().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to a session
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        self.get_lock(session_id).await.lock_owned().await
    }

    /// Drop the entry for a session nobody is holding or waiting on
    pub async fn forget(&self, session_id: &str) {
        let mut locks = self.locks.write().await;
        if let Some(lock) = locks.get(session_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(session_id);
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.locks.read().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn is_empty(&self) -> bool {
        self.locks.read().await.is_empty()
    }
}
