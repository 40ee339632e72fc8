//! Prometheus metrics for diagnostic sessions and oracle calls

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Session Lifecycle Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Sessions started, by outcome.
    ///
    /// Labels:
    /// - outcome: "success", "oracle_error", or "rejected"
    pub static ref SESSIONS_STARTED: CounterVec = register_counter_vec!(
        "nanny_diagnostic_sessions_started_total",
        "Diagnostic sessions started",
        &["outcome"]
    ).expect("failed to register SESSIONS_STARTED metric");

    /// Continue calls, by outcome.
    ///
    /// Labels:
    /// - outcome: "success", "oracle_error", "exhausted", or "rejected"
    pub static ref SESSION_CONTINUES: CounterVec = register_counter_vec!(
        "nanny_diagnostic_session_continues_total",
        "Diagnostic session continue calls",
        &["outcome"]
    ).expect("failed to register SESSION_CONTINUES metric");

    /// Sessions that reached their iteration budget.
    pub static ref SESSIONS_COMPLETED: Counter = register_counter!(
        "nanny_diagnostic_sessions_completed_total",
        "Diagnostic sessions that reached the completed state"
    ).expect("failed to register SESSIONS_COMPLETED metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Oracle Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Oracle calls by phase and status.
    ///
    /// Labels:
    /// - phase: "initial" or "follow_up"
    /// - status: "success" or an error label (e.g., "timeout", "parse_error")
    pub static ref ORACLE_CALLS: CounterVec = register_counter_vec!(
        "nanny_oracle_calls_total",
        "Oracle calls by phase and status",
        &["phase", "status"]
    ).expect("failed to register ORACLE_CALLS metric");

    /// Oracle call latency in seconds, by phase.
    pub static ref ORACLE_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "nanny_oracle_call_duration_seconds",
        "Oracle call duration in seconds",
        &["phase"],
        vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]
    ).expect("failed to register ORACLE_CALL_DURATION metric");

    /// Oracle-proposed commands that matched the destructive-command screen.
    pub static ref UNSAFE_COMMANDS_FLAGGED: Counter = register_counter!(
        "nanny_unsafe_commands_flagged_total",
        "Oracle-proposed commands flagged as potentially destructive"
    ).expect("failed to register UNSAFE_COMMANDS_FLAGGED metric");
}

/// Encode every registered metric in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_touched_metrics() {
        ORACLE_CALLS.with_label_values(&["initial", "success"]).inc();
        SESSIONS_COMPLETED.inc();
        let text = render();
        assert!(text.contains("nanny_oracle_calls_total"));
        assert!(text.contains("nanny_diagnostic_sessions_completed_total"));
    }
}
