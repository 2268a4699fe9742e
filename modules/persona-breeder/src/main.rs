use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::Claude;
use persona_breeder::{
    hints, BreederConfig, ClaudeOracle, EvolutionConfig, Evolver, ExemplarCorpus,
    MutationOperator, Oracle, OracleJudge, Population, Rubric, RunReport,
};

#[derive(Parser)]
#[command(
    name = "persona-breeder",
    about = "Evolve persona system prompts through simulated conversations"
)]
struct Cli {
    /// Population size: how many mutation hints to sample
    #[arg(short = 'm', long, default_value_t = 4)]
    num_mutation_hints: usize,

    /// Conversation rounds simulated per unit per evaluation
    #[arg(short = 'e', long, default_value_t = 5)]
    num_evals: usize,

    /// Generations to run
    #[arg(short = 'n', long, default_value_t = 10)]
    generations: u32,

    /// Seed system prompt every unit starts from
    #[arg(
        short = 'p',
        long,
        default_value = "You are a warm, affectionate companion. Chat casually and show how you feel."
    )]
    problem: String,

    /// JSON file of ideal conversations for the exemplar operator
    #[arg(long)]
    exemplars: Option<PathBuf>,

    /// Where to write the final run report
    #[arg(long)]
    report: Option<PathBuf>,

    /// RNG seed for reproducible pairing and operator draws
    #[arg(long)]
    seed: Option<u64>,

    /// Comma-separated mutation operators to enable
    #[arg(long, value_delimiter = ',')]
    operators: Vec<MutationOperator>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Skip applying mutation hints to the seed before the first generation
    #[arg(long)]
    skip_init: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("persona_breeder=info"));
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = BreederConfig::from_env().context("Failed to load configuration")?;
    config.log_redacted();

    let claude = Claude::new(&config.anthropic_api_key, &config.model)
        .with_request_timeout(config.oracle_timeout)
        .context("Failed to build oracle client")?;
    let judge_claude = Claude::new(&config.anthropic_api_key, &config.judge_model)
        .with_request_timeout(config.oracle_timeout)
        .context("Failed to build judge client")?;

    // Judge calls count against the same in-flight ceiling as every other call.
    let oracle = Oracle::new(Arc::new(ClaudeOracle::new(claude)), config.retry_policy());
    let judge_oracle = oracle.sharing_permits(Arc::new(ClaudeOracle::new(judge_claude)));
    let judge = Arc::new(OracleJudge::new(judge_oracle));

    let exemplars = cli
        .exemplars
        .as_deref()
        .map(ExemplarCorpus::load_or_empty)
        .unwrap_or_default();

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mutation_hints = hints::sample_hints(cli.num_mutation_hints, &mut rng);
    let mut population = Population::create(mutation_hints, cli.problem.as_str())
        .context("Failed to create population")?;

    let defaults = EvolutionConfig::default();
    let evolution = EvolutionConfig {
        num_evals: cli.num_evals,
        concurrency: config.max_concurrency,
        unit_timeout: config.unit_timeout,
        operators: if cli.operators.is_empty() {
            defaults.operators.clone()
        } else {
            cli.operators.clone()
        },
        seed: cli.seed,
        ..defaults
    };
    info!(
        units = population.size(),
        generations = cli.generations,
        num_evals = evolution.num_evals,
        operators = ?evolution.operators,
        "Starting evolution"
    );

    let mut evolver = Evolver::new(oracle, judge, exemplars, Rubric::default(), evolution)
        .context("Failed to build evolver")?;

    if !cli.skip_init {
        evolver.initialize(&mut population).await;
    }
    evolver.run_for(&mut population, cli.generations).await;

    let report = RunReport::from_population(&population);
    if let Some(champion) = report.champion() {
        info!(
            generation = champion.generation(),
            fitness = champion.fitness(),
            "Champion specification:\n{}",
            champion.specification()
        );
    }
    if let Some(path) = cli.report.as_deref() {
        report.save(path).context("Failed to write run report")?;
    }

    Ok(())
}
