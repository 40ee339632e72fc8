//! Decoding of oracle replies into diagnostic turns
//!
//! Models tend to wrap the JSON in prose or markdown fences, so the payload is
//! taken as everything from the first `{` to the last `}`.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::OracleError;
use crate::diagnostic::model::null_as_default;
use crate::diagnostic::{DiagnosticCommand, DiagnosticTurn, LogCheck};

/// Wire shape the oracle is instructed to emit. Unknown fields are ignored
/// and `null` reads as empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OraclePayload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub diagnosis_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub commands: Vec<DiagnosticCommand>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub log_checks: Vec<LogCheck>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub next_step: String,
}

impl OraclePayload {
    /// Stamp the payload with the iteration and call time
    pub fn into_turn(self, iteration_count: u32, timestamp: DateTime<Utc>) -> DiagnosticTurn {
        DiagnosticTurn {
            diagnosis_type: self.diagnosis_type,
            commands: self.commands,
            log_checks: self.log_checks,
            next_step: self.next_step,
            timestamp,
            iteration_count,
        }
    }
}

/// Slice out the candidate JSON object. Falls back to the whole text when no
/// `{ ... }` pair exists so the decoder reports a meaningful error.
pub fn extract_json(raw: &str) -> &str {
    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if end > start => raw[start..=end].trim(),
        _ => raw.trim(),
    }
}

/// Decode the raw oracle text into a payload
pub fn parse_payload(raw: &str) -> Result<OraclePayload, OracleError> {
    serde_json::from_str(extract_json(raw)).map_err(|source| OracleError::Parse {
        source,
        raw: raw.to_string(),
    })
}
