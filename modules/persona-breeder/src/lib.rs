//! Evolutionary optimizer for persona system prompts.
//!
//! A fixed population of candidate prompts is paired off every generation. The loser of
//! each pair is rewritten by a randomly drawn mutation operator, then every prompt is
//! scored by simulating a short conversation and grading it against a rubric. The best
//! unit of each evaluation round is kept as an elite.

pub mod config;
pub mod error;
pub mod evolve;
pub mod exemplars;
pub mod fitness;
pub mod hints;
pub mod judge;
pub mod mutation;
pub mod oracle;
pub mod population;
pub mod prompt;
pub mod report;
pub mod simulate;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::BreederConfig;
pub use error::{BreederError, OracleError};
pub use evolve::{tournament, EvolutionConfig, Evolver, GenerationSummary, Tournament};
pub use exemplars::ExemplarCorpus;
pub use fitness::{FitnessEvaluator, Rubric, ScoreCard};
pub use judge::{generate_validated, CandidateKind, OracleJudge, ValidityJudge};
pub use mutation::{MutationOperator, Mutator};
pub use oracle::{ClaudeOracle, Oracle, Prompt, Purpose, RetryPolicy, TextOracle};
pub use population::{Elite, Population, Unit};
pub use report::RunReport;
pub use simulate::{ConversationSimulator, Transcript};
