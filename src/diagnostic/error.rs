//! Error taxonomy for diagnostic operations

use crate::oracle::OracleError;
use crate::store::StoreError;

/// Closed classification of [`DiagnosticError`] for callers that map errors
/// onto responses (e.g. HTTP status codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed identifier or missing field; never retried
    Validation,
    /// Agent or session absent (ownership failures on delete land here too)
    NotFound,
    /// Agent exists but belongs to another user
    Ownership,
    /// Inference endpoint unreachable, timed out, or answered badly
    OracleCall,
    /// Oracle answered but the payload could not be decoded
    OracleResponseParse,
    /// Store or agent lookup failed
    Persistence,
}

/// Error type for diagnostic engine operations
#[derive(Debug)]
pub enum DiagnosticError {
    InvalidAgentId(String),
    InvalidSessionId(String),
    MissingField(&'static str),
    AgentNotFound(String),
    AgentOwnershipMismatch { agent_id: String },
    SessionNotFound(String),
    Oracle(OracleError),
    Persistence(StoreError),
    /// The agent directory could not be consulted
    AgentLookup(String),
}

impl DiagnosticError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiagnosticError::InvalidAgentId(_)
            | DiagnosticError::InvalidSessionId(_)
            | DiagnosticError::MissingField(_) => ErrorKind::Validation,
            DiagnosticError::AgentNotFound(_) | DiagnosticError::SessionNotFound(_) => {
                ErrorKind::NotFound
            }
            DiagnosticError::AgentOwnershipMismatch { .. } => ErrorKind::Ownership,
            DiagnosticError::Oracle(e) if e.is_parse_error() => ErrorKind::OracleResponseParse,
            DiagnosticError::Oracle(_) => ErrorKind::OracleCall,
            DiagnosticError::Persistence(_) | DiagnosticError::AgentLookup(_) => {
                ErrorKind::Persistence
            }
        }
    }
}

impl std::fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticError::InvalidAgentId(id) => write!(f, "invalid agent ID format: {}", id),
            DiagnosticError::InvalidSessionId(id) => {
                write!(f, "invalid session ID format: {}", id)
            }
            DiagnosticError::MissingField(field) => write!(f, "missing required field: {}", field),
            DiagnosticError::AgentNotFound(id) => write!(f, "agent not found: {}", id),
            DiagnosticError::AgentOwnershipMismatch { agent_id } => {
                write!(f, "agent {} does not belong to user", agent_id)
            }
            DiagnosticError::SessionNotFound(id) => write!(f, "session not found: {}", id),
            DiagnosticError::Oracle(e) => write!(f, "{}", e),
            DiagnosticError::Persistence(e) => write!(f, "persistence error: {}", e),
            DiagnosticError::AgentLookup(msg) => write!(f, "agent lookup failed: {}", msg),
        }
    }
}

impl std::error::Error for DiagnosticError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiagnosticError::Oracle(e) => Some(e),
            DiagnosticError::Persistence(e) => Some(e),
            _ => None,
        }
    }
}

impl From<OracleError> for DiagnosticError {
    fn from(e: OracleError) -> Self {
        DiagnosticError::Oracle(e)
    }
}

impl From<StoreError> for DiagnosticError {
    fn from(e: StoreError) -> Self {
        DiagnosticError::Persistence(e)
    }
}
