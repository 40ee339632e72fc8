//! Diagnostic session data model
//!
//! These types are both the in-memory representation used by the engine and
//! the persisted shape handed to a [`SessionStore`](crate::store::SessionStore).

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Iteration budget used when no configuration overrides it
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// A command the agent should run on the monitored host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticCommand {
    #[serde(default, deserialize_with = "null_as_default")]
    pub command: String,
    /// Negative values from the oracle are read as 0
    #[serde(default, deserialize_with = "clamped_seconds")]
    pub timeout_seconds: u32,
}

/// A log file the agent should grep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCheck {
    #[serde(default, deserialize_with = "null_as_default")]
    pub log_path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub grep_pattern: String,
}

/// Read an explicit JSON `null` as the field's default
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept any JSON integer (or `null`) and clamp it into `u32`
fn clamped_seconds<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw.clamp(0, u32::MAX as i64) as u32)
}

/// One oracle response recorded into a session's history
///
/// Turns are immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticTurn {
    /// Free-form classification ("cpu", "memory", "disk", ...)
    pub diagnosis_type: String,
    pub commands: Vec<DiagnosticCommand>,
    pub log_checks: Vec<LogCheck>,
    pub next_step: String,
    /// When the oracle answered
    pub timestamp: DateTime<Utc>,
    /// The iteration that produced this turn
    pub iteration_count: u32,
}

/// Lifecycle state of a session. Transitions only from `InProgress` to `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted, bounded-length conversation about one reported issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticSession {
    /// Opaque identifier assigned by the store (empty until created)
    pub id: String,
    pub agent_id: String,
    pub user_id: String,
    pub initial_issue: String,
    /// Oracle rounds consumed so far, `0 ..= max_iterations`
    pub current_iteration: u32,
    pub max_iterations: u32,
    /// Append-only; a failed round consumes an iteration without adding a turn
    pub history: Vec<DiagnosticTurn>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiagnosticSession {
    /// Create an unsaved session at iteration 0
    pub fn new(
        agent_id: impl Into<String>,
        user_id: impl Into<String>,
        initial_issue: impl Into<String>,
        max_iterations: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            agent_id: agent_id.into(),
            user_id: user_id.into(),
            initial_issue: initial_issue.into(),
            current_iteration: 0,
            max_iterations,
            history: Vec::new(),
            status: SessionStatus::InProgress,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Whether the iteration budget has been spent
    pub fn is_exhausted(&self) -> bool {
        self.current_iteration >= self.max_iterations
    }

    /// Append a turn produced by a successful oracle call
    pub fn record_turn(&mut self, turn: DiagnosticTurn) {
        self.history.push(turn);
        self.touch();
    }

    /// Consume one unit of the iteration budget, completing the session when
    /// the budget is reached
    pub fn advance_iteration(&mut self) {
        if self.current_iteration < self.max_iterations {
            self.current_iteration += 1;
        }
        self.complete_if_exhausted();
        self.touch();
    }

    /// Mark the session completed once the budget is spent. Never reverses.
    pub fn complete_if_exhausted(&mut self) -> bool {
        if self.is_exhausted() && self.status != SessionStatus::Completed {
            self.status = SessionStatus::Completed;
            self.touch();
            return true;
        }
        false
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Input to one oracle round; built fresh per call and never persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiagnosticRequest {
    pub issue: String,
    pub system_info: HashMap<String, String>,
    pub command_results: Vec<String>,
    pub iteration: u32,
}

impl DiagnosticRequest {
    /// The opening round: issue plus host facts
    pub fn initial(issue: impl Into<String>, system_info: HashMap<String, String>) -> Self {
        Self {
            issue: issue.into(),
            system_info,
            command_results: Vec::new(),
            iteration: 0,
        }
    }

    /// A follow-up round analyzing command output. System info is not resent.
    pub fn follow_up(issue: impl Into<String>, command_results: Vec<String>, iteration: u32) -> Self {
        Self {
            issue: issue.into(),
            system_info: HashMap::new(),
            command_results,
            iteration,
        }
    }

    pub fn is_initial(&self) -> bool {
        self.iteration == 0
    }
}
