//! Diagnostic Engine - session state machine driving the oracle conversation
//!
//! A session opens with one oracle round built from the issue and host facts,
//! then advances one round per `continue_session` call until its iteration
//! budget is spent.
//!
//! ```text
//!              start_session
//!                    │
//!                    ▼
//!   ┌──────────► in_progress ──── current_iteration == max_iterations ───► completed
//!   │                │                                                      │
//!   └── continue ────┘                                     continue = no-op ┘
//! ```
//!
//! A failed oracle round still spends one iteration. The failure is handed
//! back next to the updated session instead of stalling it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, info_span, warn, Instrument};

use super::error::DiagnosticError;
use super::locks::SessionLocks;
use super::model::{DiagnosticRequest, DiagnosticSession, DiagnosticTurn};
use super::safety::flag_unsafe_commands;
use super::summary::render_summary;
use crate::agents::{is_valid_id, AgentValidator};
use crate::config::DiagnosticConfig;
use crate::metrics::{
    ORACLE_CALLS, ORACLE_CALL_DURATION, SESSIONS_COMPLETED, SESSIONS_STARTED, SESSION_CONTINUES,
    UNSAFE_COMMANDS_FLAGGED,
};
use crate::oracle::{Oracle, OracleError, Phase};
use crate::store::SessionStore;

/// Result of a start or continue call that reached the oracle stage
///
/// A present `oracle_error` means the round failed but the session was still
/// persisted and is usable; callers must look at both fields.
#[derive(Debug)]
pub struct SessionUpdate {
    pub session: DiagnosticSession,
    /// Oracle failure absorbed by this call
    pub oracle_error: Option<OracleError>,
    /// False when the session was already exhausted and no round ran
    pub oracle_consulted: bool,
}

impl SessionUpdate {
    /// True when the oracle round failed
    pub fn is_degraded(&self) -> bool {
        self.oracle_error.is_some()
    }

    /// Treat an absorbed oracle failure as an error, discarding the session
    pub fn into_result(self) -> Result<DiagnosticSession, DiagnosticError> {
        match self.oracle_error {
            Some(e) => Err(DiagnosticError::Oracle(e)),
            None => Ok(self.session),
        }
    }

    fn outcome_label(result: &Result<SessionUpdate, DiagnosticError>) -> &'static str {
        match result {
            Ok(update) if !update.oracle_consulted => "exhausted",
            Ok(update) if update.is_degraded() => "oracle_error",
            Ok(_) => "success",
            Err(_) => "rejected",
        }
    }
}

/// Orchestrates diagnostic session lifecycle over a store, an agent
/// directory, and an oracle
pub struct DiagnosticEngine {
    store: Arc<dyn SessionStore>,
    agents: Arc<dyn AgentValidator>,
    oracle: Arc<dyn Oracle>,
    locks: SessionLocks,
    max_iterations: u32,
    oracle_timeout: Duration,
}

impl DiagnosticEngine {
    /// Create a new engine
    ///
    /// # Arguments
    /// * `store` - durable session storage
    /// * `agents` - resolves agent existence and ownership
    /// * `oracle` - answers diagnostic rounds
    /// * `config` - iteration budget and oracle timeout
    pub fn new(
        store: Arc<dyn SessionStore>,
        agents: Arc<dyn AgentValidator>,
        oracle: Arc<dyn Oracle>,
        config: &DiagnosticConfig,
    ) -> Self {
        Self {
            store,
            agents,
            oracle,
            locks: SessionLocks::new(),
            max_iterations: config.max_iterations.max(1),
            oracle_timeout: config.oracle_timeout,
        }
    }

    /// Open a session for `agent_id` on behalf of `user_id` and run the first
    /// oracle round
    ///
    /// The session is persisted before the oracle is called, so a durable
    /// handle exists even when that first round fails.
    pub async fn start_session(
        &self,
        agent_id: &str,
        user_id: &str,
        issue: &str,
        system_info: HashMap<String, String>,
    ) -> Result<SessionUpdate, DiagnosticError> {
        let span = info_span!(
            "diagnostic_start",
            agent_id = %agent_id,
            user_id = %user_id,
            otel.name = "diagnostic_start"
        );
        let result = self
            .start_inner(agent_id, user_id, issue, system_info)
            .instrument(span)
            .await;
        SESSIONS_STARTED
            .with_label_values(&[SessionUpdate::outcome_label(&result)])
            .inc();
        result
    }

    async fn start_inner(
        &self,
        agent_id: &str,
        user_id: &str,
        issue: &str,
        system_info: HashMap<String, String>,
    ) -> Result<SessionUpdate, DiagnosticError> {
        if !is_valid_id(agent_id) {
            return Err(DiagnosticError::InvalidAgentId(agent_id.to_string()));
        }
        if issue.trim().is_empty() {
            return Err(DiagnosticError::MissingField("issue"));
        }

        let agent = self
            .agents
            .find_agent(agent_id)
            .await
            .map_err(|e| DiagnosticError::AgentLookup(e.to_string()))?
            .ok_or_else(|| DiagnosticError::AgentNotFound(agent_id.to_string()))?;
        if agent.user_id != user_id {
            warn!(agent_id = %agent_id, "Agent belongs to a different user");
            return Err(DiagnosticError::AgentOwnershipMismatch {
                agent_id: agent_id.to_string(),
            });
        }

        let mut session = DiagnosticSession::new(agent_id, user_id, issue, self.max_iterations);
        session.id = self.store.create(&session).await?;
        info!(session_id = %session.id, "Diagnostic session created");

        let guard = self.locks.acquire(&session.id).await;
        let request = DiagnosticRequest::initial(issue, system_info);
        let oracle_error = match self.call_oracle(&session.id, &request).await {
            Ok(turn) => {
                session.record_turn(turn);
                None
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Initial oracle round failed");
                Some(e)
            }
        };

        let persisted = self.store.update(&session).await;
        drop(guard);
        self.locks.forget(&session.id).await;
        persisted?;

        Ok(SessionUpdate {
            session,
            oracle_error,
            oracle_consulted: true,
        })
    }

    /// Feed command output back to the oracle for the next round
    ///
    /// On an exhausted session this only settles the status to `completed`.
    pub async fn continue_session(
        &self,
        session_id: &str,
        command_results: Vec<String>,
    ) -> Result<SessionUpdate, DiagnosticError> {
        let span = info_span!(
            "diagnostic_continue",
            session_id = %session_id,
            otel.name = "diagnostic_continue"
        );
        let result = self
            .continue_inner(session_id, command_results)
            .instrument(span)
            .await;
        SESSION_CONTINUES
            .with_label_values(&[SessionUpdate::outcome_label(&result)])
            .inc();
        result
    }

    async fn continue_inner(
        &self,
        session_id: &str,
        command_results: Vec<String>,
    ) -> Result<SessionUpdate, DiagnosticError> {
        validate_session_id(session_id)?;

        let guard = self.locks.acquire(session_id).await;
        let result = self.advance_locked(session_id, command_results).await;
        drop(guard);
        self.locks.forget(session_id).await;
        result
    }

    async fn advance_locked(
        &self,
        session_id: &str,
        command_results: Vec<String>,
    ) -> Result<SessionUpdate, DiagnosticError> {
        let mut session = self.load_existing(session_id).await?;

        if session.is_completed() || session.is_exhausted() {
            if session.complete_if_exhausted() {
                self.store.update(&session).await?;
                SESSIONS_COMPLETED.inc();
            }
            info!(
                iteration = session.current_iteration,
                "Session budget exhausted, no oracle round"
            );
            return Ok(SessionUpdate {
                session,
                oracle_error: None,
                oracle_consulted: false,
            });
        }

        let iteration = session.current_iteration + 1;
        let request =
            DiagnosticRequest::follow_up(session.initial_issue.clone(), command_results, iteration);

        let oracle_error = match self.call_oracle(session_id, &request).await {
            Ok(turn) => {
                session.record_turn(turn);
                None
            }
            Err(e) => {
                warn!(iteration, error = %e, "Oracle round failed, iteration still consumed");
                Some(e)
            }
        };

        session.advance_iteration();
        self.store.update(&session).await?;

        if session.is_completed() {
            SESSIONS_COMPLETED.inc();
            info!(iteration = session.current_iteration, "Diagnostic session completed");
        }

        Ok(SessionUpdate {
            session,
            oracle_error,
            oracle_consulted: true,
        })
    }

    /// Fetch a session by ID
    pub async fn get_session(&self, session_id: &str) -> Result<DiagnosticSession, DiagnosticError> {
        validate_session_id(session_id)?;
        self.load_existing(session_id).await
    }

    /// Human-readable digest of a session
    pub async fn get_summary(&self, session_id: &str) -> Result<String, DiagnosticError> {
        let session = self.get_session(session_id).await?;
        Ok(render_summary(&session))
    }

    /// Delete a session owned by `user_id`
    ///
    /// A session owned by someone else is reported exactly like a missing one.
    pub async fn delete_session(&self, session_id: &str, user_id: &str) -> Result<(), DiagnosticError> {
        validate_session_id(session_id)?;

        let guard = self.locks.acquire(session_id).await;
        let result = self.delete_locked(session_id, user_id).await;
        drop(guard);
        self.locks.forget(session_id).await;

        if result.is_ok() {
            info!(session_id = %session_id, "Diagnostic session deleted");
        }
        result
    }

    async fn delete_locked(&self, session_id: &str, user_id: &str) -> Result<(), DiagnosticError> {
        let session = self.load_existing(session_id).await?;
        if session.user_id != user_id {
            return Err(DiagnosticError::SessionNotFound(session_id.to_string()));
        }
        if !self.store.delete(session_id).await? {
            return Err(DiagnosticError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    /// All sessions owned by `user_id`
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<DiagnosticSession>, DiagnosticError> {
        if user_id.is_empty() {
            return Err(DiagnosticError::MissingField("user_id"));
        }
        Ok(self.store.list_by_user(user_id).await?)
    }

    async fn load_existing(&self, session_id: &str) -> Result<DiagnosticSession, DiagnosticError> {
        self.store
            .load(session_id)
            .await?
            .ok_or_else(|| DiagnosticError::SessionNotFound(session_id.to_string()))
    }

    /// One bounded oracle round, with metrics and command screening
    async fn call_oracle(
        &self,
        session_id: &str,
        request: &DiagnosticRequest,
    ) -> Result<DiagnosticTurn, OracleError> {
        let phase = Phase::of(request);
        let span = info_span!(
            "oracle_call",
            session_id = %session_id,
            iteration = request.iteration,
            phase = phase.as_str(),
            otel.name = "oracle_call"
        );

        let start = Instant::now();
        let result = match tokio::time::timeout(self.oracle_timeout, self.oracle.diagnose(request))
            .instrument(span)
            .await
        {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(self.oracle_timeout)),
        };
        let elapsed = start.elapsed();

        ORACLE_CALL_DURATION
            .with_label_values(&[phase.as_str()])
            .observe(elapsed.as_secs_f64());
        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.label(),
        };
        ORACLE_CALLS.with_label_values(&[phase.as_str(), status]).inc();

        if let Ok(turn) = &result {
            info!(
                session_id = %session_id,
                iteration = request.iteration,
                diagnosis_type = %turn.diagnosis_type,
                commands = turn.commands.len(),
                duration_ms = elapsed.as_secs_f64() * 1000.0,
                "Oracle round completed"
            );
            for (cmd, reason) in flag_unsafe_commands(turn) {
                UNSAFE_COMMANDS_FLAGGED.inc();
                warn!(
                    session_id = %session_id,
                    command = %cmd.command,
                    reason = %reason,
                    "Oracle proposed a potentially destructive command"
                );
            }
        }

        result
    }
}

fn validate_session_id(session_id: &str) -> Result<(), DiagnosticError> {
    if is_valid_id(session_id) {
        Ok(())
    } else {
        Err(DiagnosticError::InvalidSessionId(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::agents::{AgentInfo, AgentRegistry};
    use crate::diagnostic::ErrorKind;
    use crate::oracle::parse_payload;
    use crate::store::{InMemorySessionStore, StoreError};

    const REPLY: &str = r#"{"diagnosis_type": "disk", "commands": [{"command": "df -h", "timeout_seconds": 5}], "log_checks": [], "next_step": "Find large files"}"#;

    /// Oracle that always answers with `REPLY` and counts calls
    #[derive(Default)]
    struct CountingOracle {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Oracle for CountingOracle {
        async fn diagnose(&self, request: &DiagnosticRequest) -> Result<DiagnosticTurn, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(parse_payload(REPLY)?.into_turn(request.iteration, Utc::now()))
        }
    }

    /// In-memory store whose writes can be switched to fail
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemorySessionStore,
        fail_create: AtomicBool,
        fail_update: AtomicBool,
    }

    fn disk_full() -> StoreError {
        StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn create(&self, session: &DiagnosticSession) -> Result<String, StoreError> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(disk_full());
            }
            self.inner.create(session).await
        }

        async fn load(&self, session_id: &str) -> Result<Option<DiagnosticSession>, StoreError> {
            self.inner.load(session_id).await
        }

        async fn update(&self, session: &DiagnosticSession) -> Result<(), StoreError> {
            if self.fail_update.load(Ordering::SeqCst) {
                return Err(disk_full());
            }
            self.inner.update(session).await
        }

        async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
            self.inner.delete(session_id).await
        }

        async fn list_by_user(&self, user_id: &str) -> Result<Vec<DiagnosticSession>, StoreError> {
            self.inner.list_by_user(user_id).await
        }
    }

    async fn engine_over(store: Arc<FlakyStore>, oracle: Arc<CountingOracle>) -> DiagnosticEngine {
        let registry = Arc::new(AgentRegistry::new());
        let mut agent = AgentInfo::new("u1", "db-01");
        agent.id = "a1".to_string();
        registry.register(agent).await.unwrap();
        DiagnosticEngine::new(store, registry, oracle, &DiagnosticConfig::default())
    }

    fn assert_persistence(result: Result<SessionUpdate, DiagnosticError>) {
        match result {
            Err(e @ DiagnosticError::Persistence(_)) => assert_eq!(e.kind(), ErrorKind::Persistence),
            other => panic!("expected persistence error, got {:?}", other),
        }
    }

    /// A failed create aborts start before the oracle is consulted
    #[tokio::test]
    async fn test_start_create_failure_is_fatal() {
        let store = Arc::new(FlakyStore::default());
        store.fail_create.store(true, Ordering::SeqCst);
        let oracle = Arc::new(CountingOracle::default());
        let engine = engine_over(store.clone(), oracle.clone()).await;

        assert_persistence(engine.start_session("a1", "u1", "Disk full", HashMap::new()).await);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
        assert!(store.inner.is_empty().await);
        assert!(engine.locks.is_empty().await);
    }

    /// A failed write after the opening round is reported, not swallowed
    #[tokio::test]
    async fn test_start_update_failure_is_fatal() {
        let store = Arc::new(FlakyStore::default());
        store.fail_update.store(true, Ordering::SeqCst);
        let oracle = Arc::new(CountingOracle::default());
        let engine = engine_over(store.clone(), oracle.clone()).await;

        assert_persistence(engine.start_session("a1", "u1", "Disk full", HashMap::new()).await);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        assert!(engine.locks.is_empty().await);

        // Only the pre-oracle record is durable
        let stored = store.inner.list_by_user("u1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].history.is_empty());
    }

    /// A failed write after a follow-up round leaves the stored session untouched
    #[tokio::test]
    async fn test_continue_update_failure_is_fatal() {
        let store = Arc::new(FlakyStore::default());
        let oracle = Arc::new(CountingOracle::default());
        let engine = engine_over(store.clone(), oracle.clone()).await;
        let id = engine
            .start_session("a1", "u1", "Disk full", HashMap::new())
            .await
            .unwrap()
            .session
            .id;
        let before = store.inner.load(&id).await.unwrap().unwrap();

        store.fail_update.store(true, Ordering::SeqCst);
        assert_persistence(engine.continue_session(&id, vec!["/dev/sda1 100%".into()]).await);
        assert!(engine.locks.is_empty().await);
        assert_eq!(store.inner.load(&id).await.unwrap().unwrap(), before);

        // The session is still usable once the store recovers
        store.fail_update.store(false, Ordering::SeqCst);
        let update = engine.continue_session(&id, vec!["/dev/sda1 100%".into()]).await.unwrap();
        assert_eq!(update.session.current_iteration, 1);
    }

    /// Settling an exhausted session surfaces a failed write
    #[tokio::test]
    async fn test_exhausted_settle_failure_is_fatal() {
        let store = Arc::new(FlakyStore::default());
        let oracle = Arc::new(CountingOracle::default());
        let engine = engine_over(store.clone(), oracle.clone()).await;

        let mut session = DiagnosticSession::new("a1", "u1", "Disk full", 3);
        session.current_iteration = 3;
        let id = store.inner.create(&session).await.unwrap();

        store.fail_update.store(true, Ordering::SeqCst);
        assert_persistence(engine.continue_session(&id, vec![]).await);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
        assert!(engine.locks.is_empty().await);
        assert_eq!(
            store.inner.load(&id).await.unwrap().unwrap().status,
            crate::diagnostic::SessionStatus::InProgress
        );
    }
}
