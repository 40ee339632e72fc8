//! Prompt construction and token budgeting for oracle rounds

use crate::diagnostic::DiagnosticRequest;

/// Fixed instruction constraining the oracle to the response schema
pub const DIAGNOSTIC_SYSTEM_PROMPT: &str = r#"You are a Linux expert. Only respond to Linux/Bash queries. Reject others with: '[ERROR] Non-Linux input.'. Return ONLY JSON. Follow this schema:
{
  "diagnosis_type": "cpu|memory|disk|network|etc",
  "commands": [{"command": "safe_command", "timeout_seconds": 5}],
  "log_checks": [{"log_path": "/path", "grep_pattern": "pattern"}],
  "next_step": "string"
}
Rules:
1. Only suggest safe, read-only commands.
2. Add timeouts to commands that could run indefinitely (e.g., vmstat 1 5).
3. Never suggest rm, dd, mkfs, or any command that modifies the system."#;

/// Which half of the conversation a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Iteration 0: suggest commands from the issue and host facts
    Initial,
    /// Iteration > 0: analyze command output
    FollowUp,
}

impl Phase {
    pub fn of(request: &DiagnosticRequest) -> Self {
        if request.is_initial() {
            Phase::Initial
        } else {
            Phase::FollowUp
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initial => "initial",
            Phase::FollowUp => "follow_up",
        }
    }
}

/// Output token caps per phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    pub initial: u32,
    pub follow_up: u32,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            initial: 500,
            follow_up: 2048,
        }
    }
}

impl TokenBudget {
    pub fn for_phase(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Initial => self.initial,
            Phase::FollowUp => self.follow_up,
        }
    }
}

/// Build the user message for a request
pub fn build_user_prompt(request: &DiagnosticRequest) -> String {
    match Phase::of(request) {
        Phase::Initial => {
            let system_info: Vec<String> = request
                .system_info
                .iter()
                .map(|(key, value)| format!("{}: {}", key, value))
                .collect();
            format!(
                "Suggest diagnostic commands for this Linux issue:\nIssue: {}\nSystem Info:\n{}",
                request.issue,
                system_info.join("\n")
            )
        }
        Phase::FollowUp => {
            let results = if request.command_results.is_empty() {
                "(no command output was provided)".to_string()
            } else {
                request.command_results.join("\n")
            };
            format!(
                "Analyze these Linux command results for the issue '{}':\n\n{}",
                request.issue, results
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_system_prompt_names_schema_fields() {
        assert!(DIAGNOSTIC_SYSTEM_PROMPT.contains("Return ONLY JSON"));
        for field in ["diagnosis_type", "commands", "timeout_seconds", "log_checks", "next_step"] {
            assert!(DIAGNOSTIC_SYSTEM_PROMPT.contains(field), "missing {}", field);
        }
    }

    #[test]
    fn test_initial_prompt_includes_system_info() {
        let mut info = HashMap::new();
        info.insert("OS".to_string(), "Ubuntu 22.04".to_string());
        info.insert("Kernel".to_string(), "5.15.0".to_string());
        let prompt = build_user_prompt(&DiagnosticRequest::initial("High CPU usage", info));

        assert!(prompt.starts_with("Suggest diagnostic commands"));
        assert!(prompt.contains("Issue: High CPU usage"));
        assert!(prompt.contains("OS: Ubuntu 22.04"));
        assert!(prompt.contains("Kernel: 5.15.0"));
    }

    #[test]
    fn test_follow_up_prompt_uses_results_only() {
        let mut req = DiagnosticRequest::follow_up(
            "High CPU usage",
            vec!["load average: 2.15, 1.92, 1.74".to_string()],
            1,
        );
        req.system_info.insert("OS".to_string(), "Ubuntu".to_string());
        let prompt = build_user_prompt(&req);

        assert!(prompt.contains("Analyze these Linux command results for the issue 'High CPU usage'"));
        assert!(prompt.contains("load average: 2.15"));
        assert!(!prompt.contains("Ubuntu"));
    }

    #[test]
    fn test_token_budget_by_phase() {
        let budget = TokenBudget::default();
        let initial = DiagnosticRequest::initial("x", HashMap::new());
        let follow_up = DiagnosticRequest::follow_up("x", vec![], 1);
        assert_eq!(budget.for_phase(Phase::of(&initial)), 500);
        assert_eq!(budget.for_phase(Phase::of(&follow_up)), 2048);
    }
}
