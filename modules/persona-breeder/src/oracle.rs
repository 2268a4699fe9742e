//! Text Oracle: the generative-text capability every other component consumes.
//!
//! `TextOracle` is the raw seam (one call, typed failure). `Oracle` wraps it with the
//! caller-owned policy: concurrency ceiling, per-call timeout and exponential backoff
//! on rate limits. Its `generate` never fails; an exhausted call yields an empty string.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ai_client::Claude;
use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::OracleError;

/// What a prompt is for. Used for logging and by test doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    Mutation,
    Counterpart,
    Candidate,
    Scoring,
    Judgment,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Purpose::Mutation => "mutation",
            Purpose::Counterpart => "counterpart",
            Purpose::Candidate => "candidate",
            Purpose::Scoring => "scoring",
            Purpose::Judgment => "judgment",
        };
        f.write_str(name)
    }
}

/// One oracle request.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub purpose: Purpose,
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    pub fn new(purpose: Purpose, user: impl Into<String>) -> Self {
        Self {
            purpose,
            system: None,
            user: user.into(),
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[async_trait]
pub trait TextOracle: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String, OracleError>;
}

/// Anthropic-backed oracle.
pub struct ClaudeOracle {
    claude: Claude,
}

impl ClaudeOracle {
    pub fn new(claude: Claude) -> Self {
        Self { claude }
    }
}

#[async_trait]
impl TextOracle for ClaudeOracle {
    async fn generate(&self, prompt: &Prompt) -> Result<String, OracleError> {
        debug!(purpose = %prompt.purpose, model = self.claude.model(), "Oracle request");
        let text = self
            .claude
            .chat_completion(prompt.system.as_deref(), prompt.user.as_str())
            .await?;
        Ok(text.trim().to_string())
    }
}

/// Retry, timeout and concurrency policy for oracle calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts for transient failures, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt.
    pub base_delay: Duration,
    /// Deadline for a single call.
    pub call_timeout: Duration,
    /// Maximum in-flight calls across every component sharing this oracle.
    pub max_concurrency: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            call_timeout: Duration::from_secs(60),
            max_concurrency: 4,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let jitter = Duration::from_millis(rand::rng().random_range(0..250));
        exp + jitter
    }

    /// Wait before retrying after `error`: the exponential backoff, stretched to the
    /// provider's `retry-after` when that is longer.
    fn retry_delay(&self, attempt: u32, error: &OracleError) -> Duration {
        let backoff = self.backoff(attempt);
        match error.retry_after() {
            Some(requested) => backoff.max(requested),
            None => backoff,
        }
    }
}

/// Shared, cloneable handle to a `TextOracle` with the retry policy applied.
#[derive(Clone)]
pub struct Oracle {
    inner: Arc<dyn TextOracle>,
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl Oracle {
    pub fn new(inner: Arc<dyn TextOracle>, policy: RetryPolicy) -> Self {
        let permits = Arc::new(Semaphore::new(policy.max_concurrency.max(1)));
        Self {
            inner,
            policy,
            permits,
        }
    }

    /// Another oracle over `inner` that shares this one's policy and in-flight ceiling.
    pub fn sharing_permits(&self, inner: Arc<dyn TextOracle>) -> Self {
        Self {
            inner,
            policy: self.policy.clone(),
            permits: self.permits.clone(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generate text, degrading any final failure to an empty string.
    pub async fn generate(&self, prompt: &Prompt) -> String {
        match self.try_generate(prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(purpose = %prompt.purpose, error = %e, "Oracle produced no text");
                String::new()
            }
        }
    }

    /// Generate text, surfacing the last failure once retries are exhausted.
    pub async fn try_generate(&self, prompt: &Prompt) -> Result<String, OracleError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let result = self.call_once(prompt).await;
            attempt += 1;
            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let backoff = self.policy.retry_delay(attempt - 1, &e);
                    warn!(
                        purpose = %prompt.purpose,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Oracle call failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_once(&self, prompt: &Prompt) -> Result<String, OracleError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| OracleError::Unavailable("oracle semaphore closed".to_string()))?;

        match tokio::time::timeout(self.policy.call_timeout, self.inner.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(self.policy.call_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: Vec<OracleError>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TextOracle for Flaky {
        async fn generate(&self, _prompt: &Prompt) -> Result<String, OracleError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.failures.get(n) {
                Some(e) => Err(e.clone()),
                None => Ok("ok".to_string()),
            }
        }
    }

    struct Slow;

    #[async_trait]
    impl TextOracle for Slow {
        async fn generate(&self, _prompt: &Prompt) -> Result<String, OracleError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("late".to_string())
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            call_timeout: Duration::from_millis(50),
            max_concurrency: 2,
        }
    }

    fn rate_limited(retry_after: Option<Duration>) -> OracleError {
        OracleError::RateLimited {
            message: "429".into(),
            retry_after,
        }
    }

    fn prompt() -> Prompt {
        Prompt::new(Purpose::Mutation, "improve this")
    }

    #[tokio::test]
    async fn rate_limits_are_retried_until_success() {
        let flaky = Arc::new(Flaky {
            failures: vec![
                rate_limited(None),
                rate_limited(None),
            ],
            calls: AtomicU32::new(0),
        });
        let oracle = Oracle::new(flaky.clone(), fast_policy(5));
        assert_eq!(oracle.generate(&prompt()).await, "ok");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_rate_limits_degrade_to_empty_text() {
        let flaky = Arc::new(Flaky {
            failures: vec![rate_limited(None); 10],
            calls: AtomicU32::new(0),
        });
        let oracle = Oracle::new(flaky.clone(), fast_policy(3));
        assert_eq!(oracle.generate(&prompt()).await, "");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unavailable_is_not_retried() {
        let flaky = Arc::new(Flaky {
            failures: vec![OracleError::Unavailable("500".into())],
            calls: AtomicU32::new(0),
        });
        let oracle = Oracle::new(flaky.clone(), fast_policy(5));
        let result = oracle.try_generate(&prompt()).await;
        assert!(matches!(result, Err(OracleError::Unavailable(_))));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let oracle = Oracle::new(Arc::new(Slow), fast_policy(2));
        let result = oracle.try_generate(&prompt()).await;
        assert!(matches!(result, Err(OracleError::Timeout(_))));
    }

    struct Pausing(Duration);

    #[async_trait]
    impl TextOracle for Pausing {
        async fn generate(&self, _prompt: &Prompt) -> Result<String, OracleError> {
            tokio::time::sleep(self.0).await;
            Ok("done".to_string())
        }
    }

    #[tokio::test]
    async fn sibling_oracles_share_one_concurrency_ceiling() {
        let policy = RetryPolicy {
            call_timeout: Duration::from_secs(5),
            max_concurrency: 1,
            ..fast_policy(1)
        };
        let pause = Duration::from_millis(150);
        let first = Oracle::new(Arc::new(Pausing(pause)), policy);
        let second = first.sharing_permits(Arc::new(Pausing(pause)));

        let start = std::time::Instant::now();
        let (pa, pb) = (prompt(), prompt());
        let (a, b) = tokio::join!(first.generate(&pa), second.generate(&pb));

        assert_eq!((a.as_str(), b.as_str()), ("done", "done"));
        assert!(start.elapsed() >= pause * 2);
    }

    #[tokio::test]
    async fn retry_after_stretches_the_backoff() {
        let flaky = Arc::new(Flaky {
            failures: vec![rate_limited(Some(Duration::from_millis(300)))],
            calls: AtomicU32::new(0),
        });
        let oracle = Oracle::new(flaky.clone(), fast_policy(2));

        let start = std::time::Instant::now();
        assert_eq!(oracle.generate(&prompt()).await, "ok");

        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn retry_delay_honours_the_longer_wait() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(1),
            ..RetryPolicy::default()
        };
        let long = rate_limited(Some(Duration::from_secs(30)));
        assert_eq!(policy.retry_delay(0, &long), Duration::from_secs(30));

        let short = rate_limited(Some(Duration::from_millis(10)));
        assert!(policy.retry_delay(2, &short) >= Duration::from_secs(4));

        let timeout = OracleError::Timeout(Duration::from_secs(60));
        assert!(policy.retry_delay(0, &timeout) < Duration::from_millis(1250));
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(1),
            ..RetryPolicy::default()
        };
        assert!(policy.backoff(0) < Duration::from_millis(1250));
        assert!(policy.backoff(2) >= Duration::from_secs(4));
    }
}
