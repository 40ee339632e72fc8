//! Human-readable digest of a diagnostic session

use std::fmt::Write;

use super::DiagnosticSession;

/// Render a deterministic summary: issue, status, iteration count, then each
/// turn in history order
pub fn render_summary(session: &DiagnosticSession) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_summary(&mut out, session);
    out
}

fn write_summary(out: &mut String, session: &DiagnosticSession) -> std::fmt::Result {
    writeln!(out, "Diagnostic Summary for Issue: {}", session.initial_issue)?;
    writeln!(out)?;
    writeln!(out, "Session Status: {}", session.status)?;
    writeln!(
        out,
        "Iterations: {}/{}",
        session.current_iteration, session.max_iterations
    )?;
    writeln!(out, "Recorded Turns: {}", session.history.len())?;
    writeln!(out)?;

    for (i, turn) in session.history.iter().enumerate() {
        writeln!(out, "Turn {} (iteration {}):", i + 1, turn.iteration_count)?;
        writeln!(out, "Diagnosis Type: {}", turn.diagnosis_type)?;

        if !turn.commands.is_empty() {
            writeln!(out, "Commands:")?;
            for cmd in &turn.commands {
                writeln!(out, "- {} (timeout: {}s)", cmd.command, cmd.timeout_seconds)?;
            }
        }

        if !turn.log_checks.is_empty() {
            writeln!(out, "Log Checks:")?;
            for check in &turn.log_checks {
                writeln!(
                    out,
                    "- Check {} for pattern: {}",
                    check.log_path, check.grep_pattern
                )?;
            }
        }

        if !turn.next_step.is_empty() {
            writeln!(out, "Next Step: {}", turn.next_step)?;
        }
        writeln!(out)?;
    }

    Ok(())
}
