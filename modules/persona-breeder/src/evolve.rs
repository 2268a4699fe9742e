//! Evolver: tournament selection over a fixed population.
//!
//! Each generation shuffles the units into disjoint pairs, mutates the loser of every
//! pair with a randomly drawn operator, then re-evaluates the whole population.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::SeedableRng;
use tracing::{info, warn};

use crate::error::BreederError;
use crate::exemplars::ExemplarCorpus;
use crate::fitness::{FitnessEvaluator, Rubric};
use crate::judge::{ValidityJudge, MAX_VALIDATION_ATTEMPTS};
use crate::mutation::{MutationOperator, MutationOutcome, Mutator, DEFAULT_DELIMITER};
use crate::oracle::Oracle;
use crate::population::{Elite, Population, Unit};
use crate::simulate::ConversationSimulator;

/// Configuration for an evolution run.
#[derive(Debug, Clone)]
pub struct EvolutionConfig {
    /// Conversation rounds simulated per unit per evaluation.
    pub num_evals: usize,
    pub max_validation_attempts: u32,
    /// Units evaluated at the same time within one sweep.
    pub concurrency: usize,
    /// Budget for one unit's simulation and scoring.
    pub unit_timeout: Duration,
    pub delimiter: char,
    /// Operators drawn uniformly for each tournament loser.
    pub operators: Vec<MutationOperator>,
    /// Fixed RNG seed for reproducible pairing and operator draws.
    pub seed: Option<u64>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            num_evals: 5,
            max_validation_attempts: MAX_VALIDATION_ATTEMPTS,
            concurrency: 4,
            unit_timeout: Duration::from_secs(600),
            delimiter: DEFAULT_DELIMITER,
            operators: MutationOperator::REWRITES.to_vec(),
            seed: None,
        }
    }
}

/// One tournament of a generation.
#[derive(Debug, Clone)]
pub struct Tournament {
    /// Unit indices in the order the shuffle listed them.
    pub pair: (usize, usize),
    pub winner: usize,
    pub loser: usize,
    pub operator: MutationOperator,
    pub outcome: MutationOutcome,
}

/// What one generation did.
#[derive(Debug, Clone)]
pub struct GenerationSummary {
    pub generation: u32,
    pub tournaments: Vec<Tournament>,
    pub elite: Elite,
}

/// `(winner, loser)` of the pair `(a, b)`. Strictly lower fitness loses; on a tie the
/// second-listed unit `b` loses.
pub fn tournament(units: &[Unit], a: usize, b: usize) -> (usize, usize) {
    if units[a].fitness() < units[b].fitness() {
        (b, a)
    } else {
        (a, b)
    }
}

pub struct Evolver {
    mutator: Mutator,
    evaluator: FitnessEvaluator,
    config: EvolutionConfig,
    rng: StdRng,
}

impl Evolver {
    pub fn new(
        oracle: Oracle,
        judge: Arc<dyn ValidityJudge>,
        exemplars: ExemplarCorpus,
        rubric: Rubric,
        config: EvolutionConfig,
    ) -> Result<Self, BreederError> {
        if config.operators.is_empty() {
            return Err(BreederError::Config(
                "at least one mutation operator must be enabled".into(),
            ));
        }
        if exemplars.is_empty() && config.operators.contains(&MutationOperator::ExemplarRewrite) {
            warn!("Exemplar rewrite enabled without exemplars; it will leave units unchanged");
        }

        let simulator = ConversationSimulator::new(
            oracle.clone(),
            judge.clone(),
            config.max_validation_attempts,
        );
        let evaluator = FitnessEvaluator::new(
            simulator,
            oracle.clone(),
            rubric,
            config.concurrency,
            config.unit_timeout,
        );
        let mutator = Mutator::new(
            oracle,
            judge,
            exemplars,
            config.delimiter,
            config.max_validation_attempts,
        );
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            mutator,
            evaluator,
            config,
            rng,
        })
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Apply every unit's mutation hint to the seed description, then evaluate.
    /// The evaluation captures the generation-0 elite.
    pub async fn initialize(&mut self, population: &mut Population) -> Elite {
        let start = Instant::now();
        let problem = population.problem_description().to_string();
        info!(units = population.size(), "Applying mutation hints to the seed");

        for unit in population.units_mut() {
            self.mutator.apply_hint_to_seed(unit, &problem).await;
        }

        let elite = self
            .evaluator
            .evaluate(population, self.config.num_evals)
            .await;
        info!(
            fitness = elite.fitness(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Initial population evaluated"
        );
        elite
    }

    /// One generational cycle: pair, mutate losers, re-evaluate everyone.
    pub async fn run_generation(&mut self, population: &mut Population) -> GenerationSummary {
        let start = Instant::now();
        let generation = population.generation() + 1;
        info!(generation, units = population.size(), "=== Generation start ===");

        let mut order: Vec<usize> = (0..population.size()).collect();
        order.shuffle(&mut self.rng);
        if order.len() % 2 == 1 {
            info!(generation, unit = order[order.len() - 1], "Odd unit out sits this round");
        }

        let mut tournaments = Vec::with_capacity(order.len() / 2);
        for pair in order.chunks_exact(2) {
            let (a, b) = (pair[0], pair[1]);
            let (winner, loser) = tournament(population.units(), a, b);
            let partner = population.units()[winner].clone();

            let Some(&operator) = self.config.operators.choose(&mut self.rng) else {
                break;
            };

            let (units, elites) = population.units_and_elites();
            let outcome = self
                .mutator
                .apply(operator, &mut units[loser], &partner, elites, &mut self.rng)
                .await;

            tournaments.push(Tournament {
                pair: (a, b),
                winner,
                loser,
                operator,
                outcome,
            });
        }

        population.advance_generation();
        let elite = self
            .evaluator
            .evaluate(population, self.config.num_evals)
            .await;

        info!(
            generation,
            tournaments = tournaments.len(),
            elite_fitness = elite.fitness(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "=== Generation complete ==="
        );

        GenerationSummary {
            generation,
            tournaments,
            elite,
        }
    }

    /// Run `generations` cycles back to back.
    pub async fn run_for(
        &mut self,
        population: &mut Population,
        generations: u32,
    ) -> Vec<GenerationSummary> {
        let mut summaries = Vec::with_capacity(generations as usize);
        for _ in 0..generations {
            summaries.push(self.run_generation(population).await);
        }

        if let Some(best) = population
            .elites()
            .iter()
            .max_by(|a, b| a.fitness().total_cmp(&b.fitness()))
        {
            info!(
                generations,
                best_generation = best.generation(),
                best_fitness = best.fitness(),
                "Evolution complete"
            );
        }
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{Purpose, RetryPolicy};
    use std::collections::BTreeMap;
    use crate::testing::{uniform_scores, FixedJudge, ScriptedOracle};

    fn evolver(oracle: ScriptedOracle, config: EvolutionConfig) -> Evolver {
        Evolver::new(
            Oracle::new(Arc::new(oracle), RetryPolicy::default()),
            Arc::new(FixedJudge::accepting()),
            ExemplarCorpus::empty(),
            Rubric::default(),
            config,
        )
        .unwrap()
    }

    fn scripted(score: u32) -> ScriptedOracle {
        ScriptedOracle::new()
            .respond(Purpose::Mutation, ["X"])
            .respond(Purpose::Counterpart, ["hi"])
            .respond(Purpose::Candidate, ["hello"])
            .respond(Purpose::Scoring, [uniform_scores(&Rubric::default(), score)])
    }

    #[test]
    fn rejects_empty_operator_set() {
        let result = Evolver::new(
            Oracle::new(Arc::new(ScriptedOracle::new()), RetryPolicy::default()),
            Arc::new(FixedJudge::accepting()),
            ExemplarCorpus::empty(),
            Rubric::default(),
            EvolutionConfig {
                operators: vec![],
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(BreederError::Config(_))));
    }

    fn scored(fitness: &[f64]) -> Vec<Unit> {
        fitness
            .iter()
            .map(|&f| {
                let mut unit = Unit::seed("seed", "m");
                unit.record_evaluation(f, BTreeMap::new());
                unit
            })
            .collect()
    }

    #[test]
    fn lower_fitness_loses_whichever_position_it_holds() {
        let units = scored(&[3.0, 9.0]);
        assert_eq!(tournament(&units, 0, 1), (1, 0));
        assert_eq!(tournament(&units, 1, 0), (1, 0));
    }

    #[test]
    fn tie_makes_second_listed_unit_the_loser() {
        let units = scored(&[5.0, 5.0]);
        assert_eq!(tournament(&units, 0, 1), (0, 1));
        assert_eq!(tournament(&units, 1, 0), (1, 0));
    }

    #[tokio::test]
    async fn generation_mutates_the_lower_fitness_unit() {
        for seed in 0..4 {
            let config = EvolutionConfig {
                operators: vec![MutationOperator::GuidedRewrite],
                num_evals: 1,
                seed: Some(seed),
                ..Default::default()
            };
            let mut evolver = evolver(scripted(2), config);
            let mut population = Population::create(["m1", "m2"], "seed").unwrap();
            population.units_mut()[0].record_evaluation(1.0, BTreeMap::new());
            population.units_mut()[1].record_evaluation(8.0, BTreeMap::new());

            let summary = evolver.run_generation(&mut population).await;

            let t = &summary.tournaments[0];
            assert_eq!((t.winner, t.loser), (1, 0));
            assert_eq!(population.units()[0].specification(), "X");
            assert_eq!(population.units()[1].specification(), "seed");
        }
    }

    #[tokio::test]
    async fn tied_generation_mutates_the_second_listed_unit() {
        let config = EvolutionConfig {
            operators: vec![MutationOperator::GuidedRewrite],
            num_evals: 1,
            seed: Some(11),
            ..Default::default()
        };
        let mut evolver = evolver(scripted(2), config);
        let mut population = Population::create(["m1", "m2"], "seed").unwrap();

        let summary = evolver.run_generation(&mut population).await;

        assert_eq!(summary.tournaments.len(), 1);
        let t = &summary.tournaments[0];
        assert_eq!(t.loser, t.pair.1);
        assert_eq!(t.winner, t.pair.0);
        assert_eq!(population.units()[t.loser].specification(), "X");
        assert_eq!(population.units()[t.winner].specification(), "seed");
        assert_eq!(summary.generation, 1);
        assert_eq!(summary.elite.generation(), 1);
    }

    #[tokio::test]
    async fn odd_population_leaves_one_unit_untouched() {
        let config = EvolutionConfig {
            operators: vec![MutationOperator::GuidedRewrite],
            num_evals: 1,
            seed: Some(5),
            ..Default::default()
        };
        let mut evolver = evolver(scripted(1), config);
        let mut population = Population::create(["m1", "m2", "m3"], "seed").unwrap();

        let summary = evolver.run_generation(&mut population).await;

        assert_eq!(summary.tournaments.len(), 1);
        let mutated = population
            .units()
            .iter()
            .filter(|u| u.specification() == "X")
            .count();
        assert_eq!(mutated, 1);
        assert!(population.units().iter().all(|u| u.fitness() == 7.0));
    }

    #[tokio::test]
    async fn initialize_rewrites_every_unit_and_records_an_elite() {
        let config = EvolutionConfig {
            num_evals: 1,
            ..Default::default()
        };
        let mut evolver = evolver(scripted(3), config);
        let mut population = Population::create(["m1", "m2"], "seed").unwrap();

        let elite = evolver.initialize(&mut population).await;

        assert!(population.units().iter().all(|u| u.history() == ["seed", "X"]));
        assert_eq!(population.elites().len(), 1);
        assert_eq!(population.generation(), 0);
        assert_eq!(elite.generation(), 0);
        assert_eq!(elite.fitness(), 21.0);
    }
}
