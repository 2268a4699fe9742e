// Test doubles for the two external capabilities.
//
// - ScriptedOracle (TextOracle): canned replies per prompt purpose, cycling, with
//   per-purpose call counters and a log of every prompt received
// - FixedJudge (ValidityJudge): always accepts or always rejects, counting calls

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::OracleError;
use crate::fitness::Rubric;
use crate::judge::{CandidateKind, ValidityJudge};
use crate::oracle::{Prompt, Purpose, TextOracle};

enum Script {
    Replies(Vec<String>),
    Fail(OracleError),
}

/// Oracle whose reply depends only on the prompt purpose and how many calls of that
/// purpose came before. Purposes without a script fail with `Unavailable`.
#[derive(Default)]
pub struct ScriptedOracle {
    scripts: HashMap<Purpose, Script>,
    delays: HashMap<Purpose, Duration>,
    received: Mutex<Vec<Prompt>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `replies` in order, wrapping around when exhausted.
    pub fn respond<I, S>(mut self, purpose: Purpose, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let replies: Vec<String> = replies.into_iter().map(Into::into).collect();
        self.scripts.insert(purpose, Script::Replies(replies));
        self
    }

    pub fn fail(mut self, purpose: Purpose, error: OracleError) -> Self {
        self.scripts.insert(purpose, Script::Fail(error));
        self
    }

    /// Sleep before answering prompts of `purpose`.
    pub fn delay(mut self, purpose: Purpose, delay: Duration) -> Self {
        self.delays.insert(purpose, delay);
        self
    }

    pub fn calls(&self, purpose: Purpose) -> usize {
        self.prompts(purpose).len()
    }

    pub fn prompts(&self, purpose: Purpose) -> Vec<Prompt> {
        self.received
            .lock()
            .map(|log| log.iter().filter(|p| p.purpose == purpose).cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, prompt: &Prompt) -> usize {
        let mut log = self.received.lock().unwrap_or_else(|e| e.into_inner());
        let seen = log.iter().filter(|p| p.purpose == prompt.purpose).count();
        log.push(prompt.clone());
        seen
    }
}

#[async_trait]
impl TextOracle for ScriptedOracle {
    async fn generate(&self, prompt: &Prompt) -> Result<String, OracleError> {
        let n = self.record(prompt);
        if let Some(delay) = self.delays.get(&prompt.purpose) {
            tokio::time::sleep(*delay).await;
        }
        match self.scripts.get(&prompt.purpose) {
            Some(Script::Replies(replies)) if !replies.is_empty() => {
                Ok(replies[n % replies.len()].clone())
            }
            Some(Script::Fail(e)) => Err(e.clone()),
            _ => Err(OracleError::Unavailable(format!(
                "no script for {} prompts",
                prompt.purpose
            ))),
        }
    }
}

/// Judge with a fixed verdict.
pub struct FixedJudge {
    verdict: bool,
    calls: AtomicU32,
    kinds: Mutex<Vec<CandidateKind>>,
}

impl FixedJudge {
    pub fn accepting() -> Self {
        Self {
            verdict: true,
            calls: AtomicU32::new(0),
            kinds: Mutex::default(),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            verdict: false,
            calls: AtomicU32::new(0),
            kinds: Mutex::default(),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Kinds of every candidate judged, in call order.
    pub fn kinds(&self) -> Vec<CandidateKind> {
        self.kinds.lock().map(|k| k.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ValidityJudge for FixedJudge {
    async fn judge(&self, _candidate: &str, kind: CandidateKind) -> Result<bool, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.kinds.lock().unwrap_or_else(|e| e.into_inner()).push(kind);
        Ok(self.verdict)
    }
}

/// A well-formed score reply giving `score` on every criterion of `rubric`.
pub fn uniform_scores(rubric: &Rubric, score: u32) -> String {
    let fields = rubric
        .criteria()
        .iter()
        .map(|c| format!("\"{}\": {score}", c.name))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{fields}}}")
}
