use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::BreederError;
use crate::oracle::RetryPolicy;

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_JUDGE_MODEL: &str = "claude-haiku-4-5-20251001";

/// Process configuration loaded from environment variables.
#[derive(Clone)]
pub struct BreederConfig {
    // AI provider
    pub anthropic_api_key: String,
    pub model: String,
    pub judge_model: String,

    // Oracle plumbing
    pub max_concurrency: usize,
    pub oracle_timeout: Duration,
    pub oracle_max_attempts: u32,

    // Evaluation
    pub unit_timeout: Duration,
}

impl BreederConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, BreederError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BreederError> {
        let defaults = RetryPolicy::default();
        Ok(Self {
            anthropic_api_key: required(&lookup, "ANTHROPIC_API_KEY")?,
            model: lookup("BREEDER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            judge_model: lookup("BREEDER_JUDGE_MODEL")
                .unwrap_or_else(|| DEFAULT_JUDGE_MODEL.to_string()),
            max_concurrency: parsed(&lookup, "BREEDER_MAX_CONCURRENCY", defaults.max_concurrency)?,
            oracle_timeout: Duration::from_secs(parsed(
                &lookup,
                "BREEDER_ORACLE_TIMEOUT_SECS",
                defaults.call_timeout.as_secs(),
            )?),
            oracle_max_attempts: parsed(
                &lookup,
                "BREEDER_ORACLE_MAX_ATTEMPTS",
                defaults.max_attempts,
            )?,
            unit_timeout: Duration::from_secs(parsed(&lookup, "BREEDER_UNIT_TIMEOUT_SECS", 600)?),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.oracle_max_attempts.max(1),
            call_timeout: self.oracle_timeout,
            max_concurrency: self.max_concurrency.max(1),
            ..RetryPolicy::default()
        }
    }

    pub fn log_redacted(&self) {
        info!(
            anthropic_api_key = redact(&self.anthropic_api_key),
            model = %self.model,
            judge_model = %self.judge_model,
            max_concurrency = self.max_concurrency,
            oracle_timeout_secs = self.oracle_timeout.as_secs(),
            oracle_max_attempts = self.oracle_max_attempts,
            unit_timeout_secs = self.unit_timeout.as_secs(),
            "Configuration loaded"
        );
    }
}

impl std::fmt::Debug for BreederConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreederConfig")
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("model", &self.model)
            .field("judge_model", &self.judge_model)
            .field("max_concurrency", &self.max_concurrency)
            .field("oracle_timeout", &self.oracle_timeout)
            .field("oracle_max_attempts", &self.oracle_max_attempts)
            .field("unit_timeout", &self.unit_timeout)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "(empty)"
    } else {
        "(set)"
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, BreederError> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| BreederError::Config(format!("{key} environment variable is required")))
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, BreederError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BreederError::Config(format!("{key} must be a number, got {raw:?}"))),
        None => Ok(default),
    }
}
