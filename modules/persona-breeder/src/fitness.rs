//! Fitness evaluation: simulate a conversation per unit, score it against a fixed
//! rubric via the oracle, and record the round's elite.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ai_client::{strip_code_blocks, truncate_to_char_boundary};

use crate::error::OracleError;
use crate::oracle::{Oracle, Prompt, Purpose};
use crate::population::{Elite, Population};
use crate::prompt;
use crate::simulate::{ConversationSimulator, Transcript};

/// Highest score the oracle may give a single criterion.
pub const MAX_CRITERION_SCORE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    pub description: String,
}

impl Criterion {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// The fixed set of named criteria every transcript is scored on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    criteria: Vec<Criterion>,
}

impl Default for Rubric {
    fn default() -> Self {
        Self::new(vec![
            Criterion::new(
                "emotional_expression",
                "Does the reply express feelings clearly (\"Sure, sounds great!\", \"Hey, that's mean!\")?",
            ),
            Criterion::new(
                "emotional_flow",
                "Do the emotions shift naturally over the conversation, e.g. teasing turning sincere?",
            ),
            Criterion::new(
                "humor_playfulness",
                "Is there light joking or playfulness (\"Stop teasing me! lol\")?",
            ),
            Criterion::new(
                "affection_warmth",
                "Does the reply show fondness, cuteness or positive feelings toward the partner?",
            ),
            Criterion::new(
                "empathy_agreement",
                "Does the reply empathize with and accept what the partner said?",
            ),
            Criterion::new(
                "proactive_suggestions",
                "Beyond answering, does it reflect on the topic or propose something (\"Want to try it together?\")?",
            ),
            Criterion::new(
                "curiosity_engagement",
                "Does it show interest in the partner and try to keep the conversation going?",
            ),
        ])
    }
}

impl Rubric {
    pub fn new(criteria: Vec<Criterion>) -> Self {
        Self { criteria }
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    /// Strictly decode an oracle score reply: a JSON object with exactly the rubric's
    /// criteria as keys and numbers within `0..=MAX_CRITERION_SCORE` as values.
    pub fn decode(&self, reply: &str) -> Result<ScoreCard, OracleError> {
        let json_str = strip_code_blocks(reply);
        let raw: BTreeMap<String, f64> = serde_json::from_str(json_str).map_err(|e| {
            OracleError::Malformed(format!(
                "score reply is not a criterion→number object ({e}): {}",
                truncate_to_char_boundary(reply, 120)
            ))
        })?;

        if let Some(unknown) = raw
            .keys()
            .find(|k| !self.criteria.iter().any(|c| &c.name == *k))
        {
            return Err(OracleError::Malformed(format!("unknown criterion: {unknown}")));
        }

        let mut scores = BTreeMap::new();
        for criterion in &self.criteria {
            let value = *raw.get(&criterion.name).ok_or_else(|| {
                OracleError::Malformed(format!("missing criterion: {}", criterion.name))
            })?;
            if !value.is_finite() || !(0.0..=MAX_CRITERION_SCORE).contains(&value) {
                return Err(OracleError::Malformed(format!(
                    "score for {} out of range: {value}",
                    criterion.name
                )));
            }
            scores.insert(criterion.name.clone(), value);
        }

        Ok(ScoreCard { scores })
    }
}

/// Per-criterion scores of one transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    scores: BTreeMap<String, f64>,
}

impl ScoreCard {
    pub fn scores(&self) -> &BTreeMap<String, f64> {
        &self.scores
    }

    /// Scalar fitness: the sum of all criteria.
    pub fn total(&self) -> f64 {
        self.scores.values().sum()
    }

    fn into_scores(self) -> BTreeMap<String, f64> {
        self.scores
    }
}

pub struct FitnessEvaluator {
    simulator: ConversationSimulator,
    oracle: Oracle,
    rubric: Rubric,
    concurrency: usize,
    unit_timeout: Duration,
}

impl FitnessEvaluator {
    pub fn new(
        simulator: ConversationSimulator,
        oracle: Oracle,
        rubric: Rubric,
        concurrency: usize,
        unit_timeout: Duration,
    ) -> Self {
        Self {
            simulator,
            oracle,
            rubric,
            concurrency: concurrency.max(1),
            unit_timeout,
        }
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    /// Evaluate every unit, overwrite its fitness and append this round's elite.
    ///
    /// Units are evaluated independently, up to `concurrency` at a time. Fitness
    /// values are written only after the whole sweep has finished, so the elite always
    /// reflects the complete round.
    pub async fn evaluate(&self, population: &mut Population, num_evals: usize) -> Elite {
        let start = Instant::now();
        info!(
            generation = population.generation(),
            units = population.size(),
            num_evals,
            "Starting fitness evaluation"
        );

        let cards: Vec<Option<ScoreCard>> = stream::iter(
            population
                .units()
                .iter()
                .map(|unit| self.score_specification(unit.specification(), num_evals)),
        )
        .buffered(self.concurrency)
        .collect()
        .await;

        for (unit, card) in population.units_mut().iter_mut().zip(cards) {
            let card = card.unwrap_or_default();
            let fitness = card.total();
            unit.record_evaluation(fitness, card.into_scores());
            info!(unit = %unit.id(), fitness, "Unit evaluated");
        }

        let elite = population.capture_elite().clone();
        info!(
            generation = elite.generation(),
            elite = %elite.unit().id(),
            fitness = elite.fitness(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fitness evaluation complete"
        );
        elite
    }

    /// Simulate and score one specification. `None` means the unit scores 0 this
    /// round (timeout, transport failure or malformed score reply).
    async fn score_specification(
        &self,
        specification: &str,
        num_evals: usize,
    ) -> Option<ScoreCard> {
        let scored = tokio::time::timeout(self.unit_timeout, async {
            let transcript = self.simulator.converse(specification, num_evals).await;
            self.score_transcript(&transcript).await
        })
        .await;

        match scored {
            Ok(Ok(card)) => Some(card),
            Ok(Err(e)) => {
                warn!(error = %e, "Scoring failed, fitness set to 0");
                None
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.unit_timeout.as_secs(),
                    "Unit evaluation timed out, fitness set to 0"
                );
                None
            }
        }
    }

    pub async fn score_transcript(
        &self,
        transcript: &Transcript,
    ) -> Result<ScoreCard, OracleError> {
        let request = Prompt::new(Purpose::Scoring, prompt::scoring_user(transcript))
            .system(prompt::scoring_system(&self.rubric));
        let reply = self.oracle.try_generate(&request).await?;
        self.rubric.decode(&reply)
    }
}
