use std::time::Duration;

use thiserror::Error;

/// Structural and setup failures. These are the only errors allowed to halt a run;
/// everything that happens inside one unit's mutation or evaluation degrades instead.
#[derive(Error, Debug)]
pub enum BreederError {
    #[error("Population needs at least one mutation hint")]
    EmptyMutationHints,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Exemplar corpus error: {0}")]
    Exemplars(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Failure of a single Text Oracle call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// `retry_after` is the provider's requested wait, when it sent one.
    #[error("Oracle rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle returned malformed output: {0}")]
    Malformed(String),

    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),
}

impl OracleError {
    /// Transport-class failures that are retried with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, OracleError::RateLimited { .. } | OracleError::Timeout(_))
    }

    /// Minimum wait the provider asked for before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            OracleError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<ai_client::AiError> for OracleError {
    fn from(e: ai_client::AiError) -> Self {
        use ai_client::AiError;
        match e {
            AiError::RateLimited { retry_after } => OracleError::RateLimited {
                message: e.to_string(),
                retry_after,
            },
            AiError::Parse(_) | AiError::EmptyResponse => OracleError::Malformed(e.to_string()),
            AiError::Config(_) | AiError::Network(_) | AiError::Api { .. } => {
                OracleError::Unavailable(e.to_string())
            }
        }
    }
}
