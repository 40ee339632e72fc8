//! Runtime configuration for the diagnostic engine and its oracle
//!
//! Defaults are usable as-is apart from the API key; `from_env` overlays the
//! `NANNY_*` environment variables and `DEEPSEEK_API_KEY`.

use std::time::Duration;

use crate::diagnostic::DEFAULT_MAX_ITERATIONS;
use crate::oracle::TokenBudget;

pub const ENV_API_KEY: &str = "DEEPSEEK_API_KEY";
pub const ENV_BASE_URL: &str = "NANNY_ORACLE_BASE_URL";
pub const ENV_MODEL: &str = "NANNY_ORACLE_MODEL";
pub const ENV_TIMEOUT_SECS: &str = "NANNY_ORACLE_TIMEOUT_SECS";
pub const ENV_MAX_ITERATIONS: &str = "NANNY_MAX_ITERATIONS";

/// Connection settings for the chat-completions endpoint
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Base URL up to and including the API version (e.g., "https://api.deepseek.com/v1")
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    /// Output token caps for the initial and follow-up rounds
    pub token_budget: TokenBudget,
    pub temperature: Option<f32>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com/v1".to_string(),
            model: "deepseek-chat".to_string(),
            api_key: String::new(),
            token_budget: TokenBudget::default(),
            temperature: None,
        }
    }
}

/// Configuration for the diagnostic engine
#[derive(Debug, Clone)]
pub struct DiagnosticConfig {
    /// Oracle rounds allowed per session
    pub max_iterations: u32,
    /// Upper bound on a single oracle call
    pub oracle_timeout: Duration,
    pub oracle: OracleConfig,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            oracle_timeout: Duration::from_secs(60),
            oracle: OracleConfig::default(),
        }
    }
}

impl DiagnosticConfig {
    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(key) = lookup(ENV_API_KEY) {
            config.oracle.api_key = key;
        }
        if let Some(url) = lookup(ENV_BASE_URL) {
            config.oracle.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup(ENV_MODEL) {
            config.oracle.model = model;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = parse_number(ENV_TIMEOUT_SECS, &raw)?;
            config.oracle_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup(ENV_MAX_ITERATIONS) {
            config.max_iterations = parse_number(ENV_MAX_ITERATIONS, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_MAX_ITERATIONS,
                reason: "must be positive".to_string(),
            });
        }
        if self.oracle_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: ENV_TIMEOUT_SECS,
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        reason: format!("expected a non-negative integer, got '{}'", raw),
    })
}

/// Error type for configuration loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { key: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { key, reason } => write!(f, "Invalid {}: {}", key, reason),
        }
    }
}

impl std::error::Error for ConfigError {}
