//! Conversation simulator: a scripted two-role dialogue between the fixed
//! counterpart and a candidate speaking under a unit's specification.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::judge::{generate_validated, CandidateKind, ValidityJudge};
use crate::oracle::{Oracle, Prompt, Purpose};
use crate::prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Counterpart,
    Candidate,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Counterpart => f.write_str("counterpart"),
            Role::Candidate => f.write_str("candidate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub role: Role,
    pub content: String,
}

/// Role-tagged utterances, strictly alternating and starting with the counterpart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    utterances: Vec<Utterance>,
}

impl Transcript {
    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    /// `role: content` lines.
    pub fn render(&self) -> String {
        self.utterances
            .iter()
            .map(|u| format!("{}: {}", u.role, u.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn push(&mut self, role: Role, content: String) {
        self.utterances.push(Utterance { role, content });
    }
}

pub struct ConversationSimulator {
    oracle: Oracle,
    judge: Arc<dyn ValidityJudge>,
    max_attempts: u32,
}

impl ConversationSimulator {
    pub fn new(oracle: Oracle, judge: Arc<dyn ValidityJudge>, max_attempts: u32) -> Self {
        Self {
            oracle,
            judge,
            max_attempts,
        }
    }

    /// Run `rounds` counterpart/candidate exchanges with `specification` as the
    /// candidate's system prompt.
    pub async fn converse(&self, specification: &str, rounds: usize) -> Transcript {
        let mut transcript = Transcript::default();

        for round in 0..rounds {
            let counterpart =
                Prompt::new(Purpose::Counterpart, prompt::counterpart_user(&transcript))
                    .system(prompt::counterpart_system());
            let mut line = self.oracle.generate(&counterpart).await;
            if transcript.is_empty() && line.trim().is_empty() {
                debug!("Counterpart opening was empty, seeding with fallback opener");
                line = prompt::FALLBACK_OPENER.to_string();
            }
            transcript.push(Role::Counterpart, line);

            let candidate = Prompt::new(Purpose::Candidate, prompt::candidate_user(&transcript))
                .system(specification);
            let reply = generate_validated(
                &self.oracle,
                self.judge.as_ref(),
                &candidate,
                CandidateKind::PersonaText,
                self.max_attempts,
            )
            .await;
            debug!(
                round,
                attempts = reply.attempts,
                accepted = reply.accepted,
                "Candidate turn"
            );
            transcript.push(Role::Candidate, reply.text);
        }

        transcript
    }
}
