//! Diagnostic session module
//!
//! This module provides the engine that drives a bounded conversation with
//! the oracle about one reported issue:
//! - Ownership checks against the agent directory
//! - Session persistence through a `SessionStore`
//! - Per-session serialization of read-modify-write sequences
//!
//! # Architecture
//!
//! ```text
//! caller → DiagnosticEngine::start_session
//!                  ↓
//!           AgentValidator (exists? owned by caller?)
//!                  ↓
//!           SessionStore::create (iteration 0, in_progress)
//!                  ↓
//!           Oracle::diagnose (iteration 0, initial prompt)
//!                  ↓
//!           SessionStore::update → SessionUpdate
//!
//! caller → DiagnosticEngine::continue_session
//!                  ↓
//!           lock(session_id) → SessionStore::load
//!                  ↓
//!           budget spent? → mark completed, return
//!                  ↓
//!           Oracle::diagnose (iteration N+1, command output)
//!                  ↓
//!           advance iteration → SessionStore::update → SessionUpdate
//! ```

pub mod engine;
pub mod error;
pub mod locks;
pub mod model;
pub mod safety;
pub mod summary;

pub use engine::{DiagnosticEngine, SessionUpdate};
pub use error::{DiagnosticError, ErrorKind};
pub use locks::SessionLocks;
pub use model::{
    DiagnosticCommand, DiagnosticRequest, DiagnosticSession, DiagnosticTurn, LogCheck,
    SessionStatus, DEFAULT_MAX_ITERATIONS,
};
pub use safety::{flag_unsafe_commands, screen_command, UnsafeReason};
pub use summary::render_summary;
