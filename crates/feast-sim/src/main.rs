use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use feast_core::FeastConfig;
use feast_sim::{
    run_plan, stress_plan, supersede_plan, ClientProfile, PlannedQuery, SimulatorConfig,
    SimulatorReport,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "feast-sim", version, about = "Fridge Feast orchestration simulator")]
struct Cli {
    /// Orchestrator configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output the report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one query and show every update
    Run {
        /// Ingredient list
        query: String,
        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Start a second query while the first is still enriching
    Supersede {
        /// First ingredient list
        #[arg(long, default_value = "eggs, flour, milk")]
        first: String,
        /// Second ingredient list
        #[arg(long, default_value = "rice, leeks, lemon")]
        second: String,
        /// Delay between the two starts (ms)
        #[arg(long, default_value_t = 150)]
        overlap_ms: u64,
        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Fire many overlapping queries and audit the result
    Stress {
        /// Number of queries
        #[arg(long, default_value_t = 200)]
        queries: usize,
        /// Largest pause between two starts (ms)
        #[arg(long, default_value_t = 50)]
        max_gap_ms: u64,
        /// Probability that a primary call fails
        #[arg(long, default_value_t = 0.05)]
        primary_failure_rate: f64,
        /// Probability that a primary call returns nothing
        #[arg(long, default_value_t = 0.05)]
        no_results_rate: f64,
        #[command(flatten)]
        backend: BackendArgs,
    },
}

#[derive(Debug, Args)]
struct BackendArgs {
    /// Random seed for reproducibility
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Probability that an enrichment call fails
    #[arg(long, default_value_t = 0.1)]
    failure_rate: f64,
}

impl BackendArgs {
    fn simulator_config(&self, feast: FeastConfig, verbose: bool) -> SimulatorConfig {
        SimulatorConfig {
            seed: self.seed,
            profile: ClientProfile::default().with_enrich_failure_rate(self.failure_rate),
            feast,
            verbose,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let feast = match &cli.config {
        Some(path) => FeastConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => FeastConfig::default(),
    };
    tracing::info!(
        "Starting feast-sim v{} (feast-core v{})",
        env!("CARGO_PKG_VERSION"),
        feast_core::VERSION
    );

    let report = match cli.command {
        Command::Run { query, backend } => {
            let config = backend.simulator_config(feast, true);
            run_plan(&config, vec![PlannedQuery::immediate(query)]).await?
        }
        Command::Supersede {
            first,
            second,
            overlap_ms,
            backend,
        } => {
            let config = backend.simulator_config(feast, true);
            let plan = supersede_plan(&first, &second, Duration::from_millis(overlap_ms));
            run_plan(&config, plan).await?
        }
        Command::Stress {
            queries,
            max_gap_ms,
            primary_failure_rate,
            no_results_rate,
            backend,
        } => {
            let mut config = backend.simulator_config(feast, false);
            config.profile = config
                .profile
                .with_primary_rates(primary_failure_rate, no_results_rate);
            let plan = stress_plan(backend.seed, queries, Duration::from_millis(max_gap_ms));
            run_plan(&config, plan).await?
        }
    };

    print_report(&report, cli.json)?;
    std::process::exit(if report.passed() { 0 } else { 1 });
}

fn print_report(report: &SimulatorReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report.generate_text());
    }
    Ok(())
}
