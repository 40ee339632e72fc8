//! Nanny Diagnostics - remote Linux diagnostics driven by a language-model oracle
//!
//! Agents on monitored hosts report an issue; the engine runs a bounded,
//! multi-round conversation with the oracle that yields diagnostic commands
//! and log checks, persisting every round as part of a session.
//!
//! # Modules
//!
//! - `diagnostic` - session model, state machine, and error taxonomy
//! - `oracle` - prompt construction, chat-completions client, response parsing
//! - `store` - session persistence (in-memory and JSON files)
//! - `agents` - agent directory and ownership lookups
//! - `config` - engine and oracle configuration
//! - `metrics` - Prometheus metrics for sessions and oracle calls
//! - `telemetry` - logging and OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use nanny_diagnostics::{ChatCompletionsClient, DiagnosticConfig, DiagnosticEngine};
//! use nanny_diagnostics::{AgentRegistry, InMemorySessionStore};
//!
//! let config = DiagnosticConfig::from_env()?;
//! let engine = DiagnosticEngine::new(
//!     Arc::new(InMemorySessionStore::new()),
//!     Arc::new(AgentRegistry::new()),
//!     Arc::new(ChatCompletionsClient::new(config.oracle.clone())),
//!     &config,
//! );
//! let update = engine.start_session(&agent_id, &user_id, "High CPU usage", info).await?;
//! ```

pub mod agents;
pub mod config;
pub mod diagnostic;
pub mod metrics;
pub mod oracle;
pub mod store;
pub mod telemetry;

// Re-export commonly used types at crate root for convenience
pub use agents::{AgentInfo, AgentRegistry, AgentValidator};
pub use config::{DiagnosticConfig, OracleConfig};
pub use diagnostic::{DiagnosticEngine, DiagnosticError, DiagnosticSession, ErrorKind, SessionUpdate};
pub use oracle::{ChatCompletionsClient, Oracle, OracleError};
pub use store::{FileSessionStore, InMemorySessionStore, SessionStore};
