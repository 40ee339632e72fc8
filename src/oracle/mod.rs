//! Oracle integration module
//!
//! The oracle is the external language model that proposes diagnostic
//! commands and log checks. This module owns the request/response contract:
//! prompt construction, per-phase token budgets, and decoding of the reply.

pub mod client;
pub mod parse;
pub mod prompt;

use std::time::Duration;

use async_trait::async_trait;

use crate::diagnostic::{DiagnosticRequest, DiagnosticTurn};

pub use client::{ChatCompletionsClient, ChatMessage};
pub use parse::{extract_json, parse_payload, OraclePayload};
pub use prompt::{build_user_prompt, Phase, TokenBudget, DIAGNOSTIC_SYSTEM_PROMPT};

/// Anything that can answer one diagnostic round
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Produce the next turn for `request`, stamped with its iteration
    async fn diagnose(&self, request: &DiagnosticRequest) -> Result<DiagnosticTurn, OracleError>;
}

/// Error type for oracle calls
#[derive(Debug)]
pub enum OracleError {
    /// Transport failure talking to the inference endpoint
    Request(reqwest::Error),
    /// Endpoint answered with a non-success status
    Status { status: u16, body: String },
    /// Endpoint reply was not a chat-completions envelope
    Envelope(serde_json::Error),
    /// Envelope carried no message content
    EmptyResponse,
    /// Call exceeded the configured bound
    Timeout(Duration),
    /// Message content did not contain a decodable diagnostic payload
    Parse {
        source: serde_json::Error,
        raw: String,
    },
}

impl OracleError {
    /// True for malformed payloads, false for call failures
    pub fn is_parse_error(&self) -> bool {
        matches!(self, OracleError::Parse { .. })
    }

    /// Short label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            OracleError::Request(_) => "request_error",
            OracleError::Status { .. } => "bad_status",
            OracleError::Envelope(_) => "bad_envelope",
            OracleError::EmptyResponse => "empty_response",
            OracleError::Timeout(_) => "timeout",
            OracleError::Parse { .. } => "parse_error",
        }
    }
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleError::Request(e) => write!(f, "Oracle request error: {}", e),
            OracleError::Status { status, body } => {
                write!(f, "Oracle returned status {}: {}", status, body)
            }
            OracleError::Envelope(e) => write!(f, "Invalid oracle envelope: {}", e),
            OracleError::EmptyResponse => write!(f, "Empty response from oracle"),
            OracleError::Timeout(d) => write!(f, "Oracle call timed out after {:?}", d),
            OracleError::Parse { source, raw } => write!(
                f,
                "Failed to parse oracle response: {}\nResponse content: {}",
                source, raw
            ),
        }
    }
}

impl std::error::Error for OracleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OracleError::Request(e) => Some(e),
            OracleError::Envelope(e) => Some(e),
            OracleError::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        OracleError::Request(e)
    }
}
