//! Mutation operators. Oracle-backed rewrites go through the shared fail-open
//! validation loop; crossover and shuffle are local text recombinations.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::seq::{index, IndexedRandom, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::BreederError;
use crate::exemplars::ExemplarCorpus;
use crate::judge::{generate_validated, CandidateKind, Validated, ValidityJudge};
use crate::oracle::{Oracle, Prompt, Purpose};
use crate::population::{Elite, Unit};
use crate::prompt;

/// Default sentence-terminal punctuation used to segment specifications.
pub const DEFAULT_DELIMITER: char = '.';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOperator {
    /// Zero-order hypermutation: rewrite the unit's mutation hint.
    HintRewrite,
    /// First-order: apply the mutation hint to the specification.
    GuidedRewrite,
    /// Working out: derive a specification from an ideal exemplar dialogue.
    ExemplarRewrite,
    /// Synthesize from the elite lineage.
    LineageRewrite,
    /// Recombine sentence segments with the tournament winner.
    Crossover,
    /// Reorder the unit's own sentence segments.
    Shuffle,
}

impl MutationOperator {
    pub const ALL: [MutationOperator; 6] = [
        MutationOperator::HintRewrite,
        MutationOperator::GuidedRewrite,
        MutationOperator::ExemplarRewrite,
        MutationOperator::LineageRewrite,
        MutationOperator::Crossover,
        MutationOperator::Shuffle,
    ];

    /// The oracle-backed rewrites, enabled unless configured otherwise.
    pub const REWRITES: [MutationOperator; 4] = [
        MutationOperator::GuidedRewrite,
        MutationOperator::LineageRewrite,
        MutationOperator::HintRewrite,
        MutationOperator::ExemplarRewrite,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MutationOperator::HintRewrite => "hint_rewrite",
            MutationOperator::GuidedRewrite => "guided_rewrite",
            MutationOperator::ExemplarRewrite => "exemplar_rewrite",
            MutationOperator::LineageRewrite => "lineage_rewrite",
            MutationOperator::Crossover => "crossover",
            MutationOperator::Shuffle => "shuffle",
        }
    }
}

impl fmt::Display for MutationOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MutationOperator {
    type Err = BreederError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|op| op.name() == wanted)
            .ok_or_else(|| BreederError::Config(format!("unknown mutation operator: {s}")))
    }
}

/// What an operator did to its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// `specification` changed and was appended to history.
    Revised { attempts: u32, accepted: bool },
    /// `mutation_hint` changed.
    HintRevised { attempts: u32, accepted: bool },
    /// Nothing changed.
    Unchanged { reason: &'static str },
}

// =============================================================================
// Segment operators
// =============================================================================

/// Trimmed, non-blank pieces of `text` between occurrences of `delimiter`.
pub fn split_segments(text: &str, delimiter: char) -> Vec<&str> {
    text.split(delimiter)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Whether `text` puts whitespace after its delimiters, as prose does after a period.
fn spaced_after(text: &str, delimiter: char) -> bool {
    text.split(delimiter)
        .skip(1)
        .any(|rest| rest.starts_with(char::is_whitespace))
}

fn join_segments(segments: &[&str], delimiter: char, spaced: bool, terminated: bool) -> String {
    let separator = if spaced {
        format!("{delimiter} ")
    } else {
        delimiter.to_string()
    };
    let mut text = segments.join(separator.as_str());
    if terminated && !segments.is_empty() {
        text.push(delimiter);
    }
    text
}

fn sample_half<'a, R: Rng + ?Sized>(segments: &[&'a str], rng: &mut R) -> Vec<&'a str> {
    index::sample(rng, segments.len(), segments.len() / 2)
        .into_iter()
        .map(|i| segments[i])
        .collect()
}

/// Child of two parents: half (rounded down) of each parent's segments, sampled in
/// random order, parent one's first. The child starts with fitness 0 and a history
/// holding only its own text; its hint comes from a randomly chosen parent.
pub fn crossover<R: Rng + ?Sized>(
    first: &Unit,
    second: &Unit,
    delimiter: char,
    rng: &mut R,
) -> Unit {
    let first_segments = split_segments(first.specification(), delimiter);
    let second_segments = split_segments(second.specification(), delimiter);

    let mut picked = sample_half(&first_segments, rng);
    picked.extend(sample_half(&second_segments, rng));

    let spaced = spaced_after(first.specification(), delimiter)
        || spaced_after(second.specification(), delimiter);
    let text = join_segments(&picked, delimiter, spaced, true);
    let hint = if rng.random_bool(0.5) {
        first.mutation_hint()
    } else {
        second.mutation_hint()
    };
    Unit::seed(text, hint)
}

/// Reorder the segments of `specification` uniformly at random. The result ends with
/// the delimiter exactly when the input did.
pub fn shuffle<R: Rng + ?Sized>(specification: &str, delimiter: char, rng: &mut R) -> String {
    let mut segments = split_segments(specification, delimiter);
    segments.shuffle(rng);
    let terminated = specification.trim_end().ends_with(delimiter);
    join_segments(
        &segments,
        delimiter,
        spaced_after(specification, delimiter),
        terminated,
    )
}

// =============================================================================
// Mutator
// =============================================================================

/// Applies mutation operators to borrowed units.
pub struct Mutator {
    oracle: Oracle,
    judge: Arc<dyn ValidityJudge>,
    exemplars: ExemplarCorpus,
    delimiter: char,
    max_attempts: u32,
}

impl Mutator {
    pub fn new(
        oracle: Oracle,
        judge: Arc<dyn ValidityJudge>,
        exemplars: ExemplarCorpus,
        delimiter: char,
        max_attempts: u32,
    ) -> Self {
        Self {
            oracle,
            judge,
            exemplars,
            delimiter,
            max_attempts,
        }
    }

    /// Apply `operator` to `unit`. `partner` is the other unit of the tournament pair
    /// (crossover material); `elites` is the lineage so far.
    pub async fn apply<R: Rng + Send + ?Sized>(
        &self,
        operator: MutationOperator,
        unit: &mut Unit,
        partner: &Unit,
        elites: &[Elite],
        rng: &mut R,
    ) -> MutationOutcome {
        let outcome = match operator {
            MutationOperator::HintRewrite => {
                let request = mutation_prompt(prompt::hint_rewrite(unit.mutation_hint()));
                let validated = self.validated(&request, CandidateKind::MutationHint).await;
                if validated.text.trim().is_empty() {
                    MutationOutcome::Unchanged {
                        reason: "oracle produced no hint",
                    }
                } else {
                    unit.set_mutation_hint(validated.text);
                    MutationOutcome::HintRevised {
                        attempts: validated.attempts,
                        accepted: validated.accepted,
                    }
                }
            }
            MutationOperator::GuidedRewrite => {
                let request = mutation_prompt(prompt::guided_rewrite(
                    unit.mutation_hint(),
                    unit.specification(),
                ));
                let validated = self.validated(&request, CandidateKind::PersonaText).await;
                revise_with(unit, validated)
            }
            MutationOperator::ExemplarRewrite => {
                let Some(exemplar) = self.exemplars.exemplars().choose(rng) else {
                    return self.log_outcome(
                        operator,
                        unit,
                        MutationOutcome::Unchanged {
                            reason: "no exemplars available",
                        },
                    );
                };
                let request =
                    mutation_prompt(prompt::exemplar_rewrite(&exemplar.conversation.render()));
                let validated = self.validated(&request, CandidateKind::PersonaText).await;
                revise_with(unit, validated)
            }
            MutationOperator::LineageRewrite => {
                if elites.is_empty() {
                    MutationOutcome::Unchanged {
                        reason: "no elites captured yet",
                    }
                } else {
                    let request = mutation_prompt(prompt::lineage_rewrite(elites));
                    let validated = self.validated(&request, CandidateKind::PersonaText).await;
                    revise_with(unit, validated)
                }
            }
            MutationOperator::Crossover => {
                let child = crossover(unit, partner, self.delimiter, rng);
                if child.specification().is_empty() {
                    MutationOutcome::Unchanged {
                        reason: "parents too short to recombine",
                    }
                } else {
                    let hint = child.mutation_hint().to_string();
                    if unit.revise(child.specification().to_string()) {
                        unit.set_mutation_hint(hint);
                        MutationOutcome::Revised {
                            attempts: 0,
                            accepted: true,
                        }
                    } else {
                        MutationOutcome::Unchanged {
                            reason: "recombination identical to parent",
                        }
                    }
                }
            }
            MutationOperator::Shuffle => {
                let shuffled = shuffle(unit.specification(), self.delimiter, rng);
                if unit.revise(shuffled) {
                    MutationOutcome::Revised {
                        attempts: 0,
                        accepted: true,
                    }
                } else {
                    MutationOutcome::Unchanged {
                        reason: "shuffle kept the original order",
                    }
                }
            }
        };

        self.log_outcome(operator, unit, outcome)
    }

    /// Rewrite the seed description through the unit's own mutation hint.
    pub async fn apply_hint_to_seed(
        &self,
        unit: &mut Unit,
        problem_description: &str,
    ) -> MutationOutcome {
        let request = mutation_prompt(prompt::initial_application(
            unit.mutation_hint(),
            problem_description,
        ));
        let validated = self.validated(&request, CandidateKind::PersonaText).await;
        revise_with(unit, validated)
    }

    async fn validated(&self, request: &Prompt, kind: CandidateKind) -> Validated {
        generate_validated(
            &self.oracle,
            self.judge.as_ref(),
            request,
            kind,
            self.max_attempts,
        )
        .await
    }

    fn log_outcome(
        &self,
        operator: MutationOperator,
        unit: &Unit,
        outcome: MutationOutcome,
    ) -> MutationOutcome {
        match &outcome {
            MutationOutcome::Unchanged { reason } => {
                info!(unit = %unit.id(), %operator, reason, "Mutation left unit unchanged");
            }
            _ => {
                info!(unit = %unit.id(), %operator, ?outcome, "Mutated unit");
                debug!(
                    unit = %unit.id(),
                    specification = unit.specification(),
                    "Mutated specification"
                );
            }
        }
        outcome
    }
}

fn mutation_prompt(user: String) -> Prompt {
    Prompt::new(Purpose::Mutation, user).system(prompt::mutation_system())
}

/// Archive a validated candidate as the unit's new specification. Empty text is
/// "no text produced" and never becomes a revision.
fn revise_with(unit: &mut Unit, validated: Validated) -> MutationOutcome {
    if validated.text.trim().is_empty() {
        return MutationOutcome::Unchanged {
            reason: "oracle produced no text",
        };
    }
    if unit.revise(validated.text) {
        MutationOutcome::Revised {
            attempts: validated.attempts,
            accepted: validated.accepted,
        }
    } else {
        MutationOutcome::Unchanged {
            reason: "candidate identical to current specification",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use crate::oracle::RetryPolicy;
    use crate::population::Population;
    use crate::testing::{FixedJudge, ScriptedOracle};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sorted<'a>(mut v: Vec<&'a str>) -> Vec<&'a str> {
        v.sort_unstable();
        v
    }

    fn mutator(
        oracle: Arc<ScriptedOracle>,
        judge: Arc<FixedJudge>,
        exemplars: ExemplarCorpus,
    ) -> Mutator {
        Mutator::new(
            Oracle::new(oracle, RetryPolicy::default()),
            judge,
            exemplars,
            DEFAULT_DELIMITER,
            5,
        )
    }

    #[test]
    fn split_ignores_blank_pieces() {
        assert_eq!(split_segments("A. B.  .C", '.'), vec!["A", "B", "C"]);
        assert!(split_segments("", '.').is_empty());
    }

    #[test]
    fn crossover_takes_half_of_each_parent() {
        let mut rng = StdRng::seed_from_u64(7);
        let first = Unit::seed("a1.a2.a3.a4.a5.", "hint one");
        let second = Unit::seed("b1.b2.b3.", "hint two");

        let child = crossover(&first, &second, '.', &mut rng);

        let segments = split_segments(child.specification(), '.');
        assert_eq!(segments.len(), 5 / 2 + 3 / 2);
        assert_eq!(segments.iter().filter(|s| s.starts_with('a')).count(), 2);
        assert_eq!(segments.iter().filter(|s| s.starts_with('b')).count(), 1);
        assert!(child.specification().ends_with('.'));
        assert_eq!(child.fitness(), 0.0);
        assert_eq!(child.history(), [child.specification().to_string()]);
        assert!(["hint one", "hint two"].contains(&child.mutation_hint()));
    }

    #[test]
    fn crossover_keeps_prose_spacing() {
        let mut rng = StdRng::seed_from_u64(21);
        let first = Unit::seed("Be kind. Be brief. Ask questions. Tease gently.", "m");
        let second = Unit::seed("Use names. Stay warm.", "m");

        let child = crossover(&first, &second, '.', &mut rng);

        let text = child.specification();
        assert!(!text.starts_with(char::is_whitespace));
        assert_eq!(text.matches(". ").count(), 2);
        assert!(text.ends_with('.'));
        assert!(!text.contains(".B") && !text.contains(".A") && !text.contains(".U"));
    }

    #[test]
    fn crossover_of_single_sentences_is_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        let child = crossover(&Unit::seed("one.", "m"), &Unit::seed("two.", "m"), '.', &mut rng);
        assert_eq!(child.specification(), "");
    }

    #[test]
    fn shuffle_preserves_segments_and_terminator() {
        let mut rng = StdRng::seed_from_u64(42);
        let input = "Be kind. Be brief. Ask questions. Use first names.";
        for _ in 0..20 {
            let output = shuffle(input, '.', &mut rng);
            assert!(output.ends_with('.'));
            assert!(!output.starts_with(char::is_whitespace));
            assert_eq!(output.matches(". ").count(), 3);
            assert_eq!(
                sorted(split_segments(&output, '.')),
                sorted(split_segments(input, '.'))
            );
        }

        let unterminated = shuffle("x。y。z", '。', &mut rng);
        assert!(!unterminated.ends_with('。'));
        assert_eq!(sorted(split_segments(&unterminated, '。')), vec!["x", "y", "z"]);
    }

    #[test]
    fn operator_names_round_trip_through_from_str() {
        for op in MutationOperator::ALL {
            assert_eq!(op.name().parse::<MutationOperator>().unwrap(), op);
        }
        assert_eq!(
            "Guided-Rewrite".parse::<MutationOperator>().unwrap(),
            MutationOperator::GuidedRewrite
        );
        assert!("teleport".parse::<MutationOperator>().is_err());
    }

    #[tokio::test]
    async fn rejected_candidates_fail_open_after_five_attempts() {
        let oracle = Arc::new(
            ScriptedOracle::new().respond(Purpose::Mutation, ["c1", "c2", "c3", "c4", "c5", "c6"]),
        );
        let judge = Arc::new(FixedJudge::rejecting());
        let mutator = mutator(oracle.clone(), judge.clone(), ExemplarCorpus::empty());
        let mut unit = Unit::seed("seed", "make it warmer");
        let partner = unit.clone();
        let mut rng = StdRng::seed_from_u64(0);

        let outcome = mutator
            .apply(MutationOperator::GuidedRewrite, &mut unit, &partner, &[], &mut rng)
            .await;

        assert_eq!(
            outcome,
            MutationOutcome::Revised {
                attempts: 5,
                accepted: false
            }
        );
        assert_eq!(oracle.calls(Purpose::Mutation), 5);
        assert_eq!(judge.calls(), 5);
        assert_eq!(unit.specification(), "c5");
        assert_eq!(unit.history(), ["seed", "c5"]);
    }

    #[tokio::test]
    async fn guided_rewrite_sends_hint_then_specification() {
        let oracle = Arc::new(ScriptedOracle::new().respond(Purpose::Mutation, ["X"]));
        let judge = Arc::new(FixedJudge::accepting());
        let mutator = mutator(oracle.clone(), judge, ExemplarCorpus::empty());
        let mut unit = Unit::seed("seed text", "HINT");
        let partner = unit.clone();
        let mut rng = StdRng::seed_from_u64(0);

        mutator
            .apply(MutationOperator::GuidedRewrite, &mut unit, &partner, &[], &mut rng)
            .await;

        let sent = &oracle.prompts(Purpose::Mutation)[0].user;
        assert!(sent.find("HINT").unwrap() < sent.find("seed text").unwrap());
        assert_eq!(unit.specification(), "X");
    }

    #[tokio::test]
    async fn hint_rewrite_leaves_specification_alone() {
        let oracle = Arc::new(ScriptedOracle::new().respond(Purpose::Mutation, ["better hint"]));
        let judge = Arc::new(FixedJudge::accepting());
        let mutator = mutator(oracle, judge.clone(), ExemplarCorpus::empty());
        let mut unit = Unit::seed("seed", "hint");
        let partner = unit.clone();
        let mut rng = StdRng::seed_from_u64(0);

        let outcome = mutator
            .apply(MutationOperator::HintRewrite, &mut unit, &partner, &[], &mut rng)
            .await;

        assert!(matches!(outcome, MutationOutcome::HintRevised { accepted: true, .. }));
        assert_eq!(unit.mutation_hint(), "better hint");
        assert_eq!(judge.kinds(), [CandidateKind::MutationHint]);
        assert_eq!(unit.specification(), "seed");
        assert_eq!(unit.history(), ["seed"]);
    }

    #[tokio::test]
    async fn exemplar_rewrite_without_corpus_is_a_no_op() {
        let oracle = Arc::new(ScriptedOracle::new().respond(Purpose::Mutation, ["X"]));
        let judge = Arc::new(FixedJudge::accepting());
        let mutator = mutator(oracle.clone(), judge, ExemplarCorpus::empty());
        let mut unit = Unit::seed("seed", "hint");
        let partner = unit.clone();
        let mut rng = StdRng::seed_from_u64(0);

        let outcome = mutator
            .apply(MutationOperator::ExemplarRewrite, &mut unit, &partner, &[], &mut rng)
            .await;

        assert!(matches!(outcome, MutationOutcome::Unchanged { .. }));
        assert_eq!(oracle.calls(Purpose::Mutation), 0);
        assert_eq!(unit.specification(), "seed");
    }

    #[tokio::test]
    async fn exemplar_rewrite_quotes_the_exemplar() {
        let corpus = ExemplarCorpus::from_json(r#"[{"conversation": "ideal chat"}]"#).unwrap();
        let oracle = Arc::new(ScriptedOracle::new().respond(Purpose::Mutation, ["derived"]));
        let mutator = mutator(oracle.clone(), Arc::new(FixedJudge::accepting()), corpus);
        let mut unit = Unit::seed("seed", "hint");
        let partner = unit.clone();
        let mut rng = StdRng::seed_from_u64(0);

        mutator
            .apply(MutationOperator::ExemplarRewrite, &mut unit, &partner, &[], &mut rng)
            .await;

        assert!(oracle.prompts(Purpose::Mutation)[0].user.contains("ideal chat"));
        assert_eq!(unit.specification(), "derived");
    }

    #[tokio::test]
    async fn lineage_rewrite_uses_elites() {
        let mut population = Population::create(["m"], "elite text").unwrap();
        population.capture_elite();

        let oracle = Arc::new(ScriptedOracle::new().respond(Purpose::Mutation, ["from lineage"]));
        let judge = Arc::new(FixedJudge::accepting());
        let mutator = mutator(oracle.clone(), judge, ExemplarCorpus::empty());
        let mut unit = Unit::seed("seed", "hint");
        let partner = unit.clone();
        let mut rng = StdRng::seed_from_u64(0);

        let empty = mutator
            .apply(MutationOperator::LineageRewrite, &mut unit, &partner, &[], &mut rng)
            .await;
        assert!(matches!(empty, MutationOutcome::Unchanged { .. }));

        mutator
            .apply(
                MutationOperator::LineageRewrite,
                &mut unit,
                &partner,
                population.elites(),
                &mut rng,
            )
            .await;
        assert!(oracle.prompts(Purpose::Mutation)[0].user.contains("Rank 1"));
        assert_eq!(unit.specification(), "from lineage");
    }

    #[tokio::test]
    async fn empty_oracle_output_never_becomes_a_revision() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .fail(Purpose::Mutation, OracleError::Unavailable("down".into())),
        );
        let judge = Arc::new(FixedJudge::accepting());
        let mutator = mutator(oracle, judge.clone(), ExemplarCorpus::empty());
        let mut unit = Unit::seed("seed", "hint");
        let partner = unit.clone();
        let mut rng = StdRng::seed_from_u64(0);

        let outcome = mutator
            .apply(MutationOperator::GuidedRewrite, &mut unit, &partner, &[], &mut rng)
            .await;

        assert!(matches!(outcome, MutationOutcome::Unchanged { .. }));
        assert_eq!(judge.calls(), 0);
        assert_eq!(unit.history(), ["seed"]);
    }

    #[tokio::test]
    async fn crossover_operator_appends_to_the_losers_history() {
        let oracle = Arc::new(ScriptedOracle::new());
        let mutator = mutator(oracle, Arc::new(FixedJudge::accepting()), ExemplarCorpus::empty());
        let mut loser = Unit::seed("a1.a2.", "loser hint");
        let winner = Unit::seed("b1.b2.", "winner hint");
        let mut rng = StdRng::seed_from_u64(3);

        let outcome = mutator
            .apply(MutationOperator::Crossover, &mut loser, &winner, &[], &mut rng)
            .await;

        assert!(matches!(outcome, MutationOutcome::Revised { .. }));
        assert_eq!(loser.history().len(), 2);
        assert_eq!(loser.history()[0], "a1.a2.");
        assert_eq!(split_segments(loser.specification(), '.').len(), 2);
    }
}
