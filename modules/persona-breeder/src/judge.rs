//! Validity Judge and the shared fail-open generation loop.

use async_trait::async_trait;
use tracing::{debug, warn};

use ai_client::truncate_to_char_boundary;

use crate::error::OracleError;
use crate::oracle::{Oracle, Prompt, Purpose};
use crate::prompt;

/// Generation attempts before the last candidate is accepted regardless of verdict.
pub const MAX_VALIDATION_ATTEMPTS: u32 = 5;

/// What a candidate text is meant to be. Each kind is judged by its own standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// A system prompt or an in-role reply spoken under one.
    PersonaText,
    /// An instruction for how to rewrite a system prompt.
    MutationHint,
}

/// Classifies a candidate text as acceptable (in-role, not a refusal, not degenerate).
#[async_trait]
pub trait ValidityJudge: Send + Sync {
    async fn judge(&self, candidate: &str, kind: CandidateKind) -> Result<bool, OracleError>;
}

/// Judge backed by the Text Oracle.
pub struct OracleJudge {
    oracle: Oracle,
}

impl OracleJudge {
    pub fn new(oracle: Oracle) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl ValidityJudge for OracleJudge {
    async fn judge(&self, candidate: &str, kind: CandidateKind) -> Result<bool, OracleError> {
        let system = match kind {
            CandidateKind::PersonaText => prompt::judge_system(),
            CandidateKind::MutationHint => prompt::hint_judge_system(),
        };
        let request =
            Prompt::new(Purpose::Judgment, prompt::judge_user(candidate)).system(system);
        let reply = self.oracle.try_generate(&request).await?;
        parse_verdict(&reply)
    }
}

/// Strict verdict decode: `True`/`False`, case-insensitive, optional trailing period.
fn parse_verdict(reply: &str) -> Result<bool, OracleError> {
    let word = reply.trim().trim_end_matches('.').trim();
    if word.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if word.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(OracleError::Malformed(format!(
            "judge verdict was neither True nor False: {}",
            truncate_to_char_boundary(reply, 80)
        )))
    }
}

/// Outcome of the fail-open loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    pub text: String,
    /// Generations performed, at most the attempt bound.
    pub attempts: u32,
    /// False when every attempt was rejected and the last one was kept anyway.
    pub accepted: bool,
}

/// Generate with `prompt` until the judge accepts, at most `max_attempts` times.
/// If every candidate is rejected the last one is returned with `accepted = false`.
/// Judge failures count as rejections; empty candidates are rejected without a verdict.
pub async fn generate_validated(
    oracle: &Oracle,
    judge: &dyn ValidityJudge,
    prompt: &Prompt,
    kind: CandidateKind,
    max_attempts: u32,
) -> Validated {
    let max_attempts = max_attempts.max(1);
    let mut last = String::new();

    for attempt in 1..=max_attempts {
        let candidate = oracle.generate(prompt).await;

        let verdict = if candidate.trim().is_empty() {
            false
        } else {
            match judge.judge(&candidate, kind).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(
                        purpose = %prompt.purpose,
                        error = %e,
                        "Judge failed, treating as reject"
                    );
                    false
                }
            }
        };

        debug!(purpose = %prompt.purpose, attempt, verdict, "Judged candidate");

        if verdict {
            return Validated {
                text: candidate,
                attempts: attempt,
                accepted: true,
            };
        }
        last = candidate;
    }

    warn!(
        purpose = %prompt.purpose,
        attempts = max_attempts,
        "All candidates rejected, accepting the last one"
    );
    Validated {
        text: last,
        attempts: max_attempts,
        accepted: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::RetryPolicy;
    use crate::testing::ScriptedOracle;
    use std::sync::Arc;

    #[tokio::test]
    async fn hints_are_judged_by_their_own_standard() {
        let scripted = Arc::new(ScriptedOracle::new().respond(Purpose::Judgment, ["True"]));
        let judge = OracleJudge::new(Oracle::new(scripted.clone(), RetryPolicy::default()));

        assert_eq!(judge.judge("Be warmer.", CandidateKind::MutationHint).await, Ok(true));
        assert_eq!(judge.judge("Hi there!", CandidateKind::PersonaText).await, Ok(true));

        let prompts = scripted.prompts(Purpose::Judgment);
        assert_eq!(prompts[0].system.as_deref(), Some(prompt::hint_judge_system()));
        assert_eq!(prompts[1].system.as_deref(), Some(prompt::judge_system()));
    }

    #[test]
    fn verdict_parsing_is_strict() {
        assert_eq!(parse_verdict("True"), Ok(true));
        assert_eq!(parse_verdict(" false.\n"), Ok(false));
        assert_eq!(parse_verdict("TRUE"), Ok(true));
        assert!(parse_verdict("Yes, it is fine").is_err());
        assert!(parse_verdict("").is_err());
    }
}
