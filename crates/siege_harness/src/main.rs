//! Offline battle simulator.
//!
//! Runs scenarios without any presentation and writes JSON reports.
//!
//! # Usage
//!
//! ```bash
//! # Run one battle, print the report to stdout
//! cargo run -p siege_harness -- run --scenario scenarios/skirmish.ron
//!
//! # Every sort toggle combination over 100 seeds
//! cargo run -p siege_harness -- batch --scenario scenarios/skirmish.ron --count 100
//!
//! # Report configuration problems without running
//! cargo run -p siege_harness -- validate --scenario scenarios/duel.ron
//!
//! # Check that repeated runs agree
//! cargo run -p siege_harness -- verify --scenario scenarios/skirmish.ron --runs 5
//! ```
//!
//! Reports go to stdout or `--output`; logs go to stderr. `RUST_LOG`
//! overrides the level chosen by `--verbose`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use siege_harness::{
    batch::{run_batch, verify_scenario, BatchConfig},
    scenario::Scenario,
    simulator::simulate,
    HarnessError,
};

#[derive(Parser)]
#[command(name = "siege_harness")]
#[command(about = "Offline battle simulator for balance testing")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single battle
    Run {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override the scenario seed
        #[arg(long)]
        seed: Option<u64>,

        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a scenario over many seeds and firing orders
    Batch {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Number of seeds
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Starting seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Worker threads (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: usize,

        /// Keep the scenario's firing order instead of trying all four
        #[arg(long)]
        no_variants: bool,

        /// Output JSON file for results
        #[arg(short, long, default_value = "results/batch.json")]
        output: PathBuf,
    },

    /// Check a scenario without running it
    Validate {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,
    },

    /// Verify determinism by running the same scenario several times
    Verify {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs to stderr; stdout carries reports
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Run {
            scenario,
            seed,
            output,
        } => cmd_run(scenario, seed, output),
        Commands::Batch {
            scenario,
            count,
            seed,
            parallel,
            no_variants,
            output,
        } => cmd_batch(scenario, count, seed, parallel, no_variants, output),
        Commands::Validate { scenario } => cmd_validate(scenario),
        Commands::Verify { scenario, runs } => cmd_verify(scenario, runs),
    };

    if let Err(e) = result {
        report_error(&e);
        std::process::exit(1);
    }
}

fn report_error(error: &HarnessError) {
    eprintln!("ERROR: {error}");
    for issue in error.issues() {
        eprintln!("  - {issue}");
    }
}

/// Run one battle
fn cmd_run(path: PathBuf, seed: Option<u64>, output: Option<PathBuf>) -> Result<(), HarnessError> {
    let mut scenario = Scenario::load(&path)?;
    if let Some(seed) = seed {
        scenario.config.seed = seed;
    }
    tracing::info!("Running scenario '{}' (seed {})", scenario.name, scenario.config.seed);

    let report = simulate(&scenario)?;

    eprintln!("Outcome: {:?}", report.outcome);
    eprintln!("  Ticks: {} (t = {})", report.ticks, report.time);
    eprintln!("  Final day: {}", report.final_day);
    eprintln!("  Surviving soldiers: {}", report.survivors());
    eprintln!("  Towers standing: {}", report.towers_standing());
    eprintln!("  State hash: {:016x}", report.state_hash);

    match output {
        Some(path) => {
            report.save(&path)?;
            eprintln!("Report saved to: {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

/// Run a batch
fn cmd_batch(
    path: PathBuf,
    count: u32,
    seed: u64,
    parallel: usize,
    no_variants: bool,
    output: PathBuf,
) -> Result<(), HarnessError> {
    let scenario = Scenario::load(&path)?;
    let mut config = BatchConfig::new(count).with_seed(seed);
    config.parallel = parallel;
    if no_variants {
        config = config.without_variants();
    }

    let results = run_batch(&scenario, &config)?;
    results.save(&output)?;

    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Battles run: {}", results.runs.len());
    if !results.errors.is_empty() {
        eprintln!("Battles FAILED: {}", results.errors.len());
    }
    eprintln!("Duration: {:.1}s", results.duration_seconds);
    eprintln!("\nBy firing order:");
    for summary in &results.summary {
        eprintln!(
            "  defense={:<5} hp={:<5} victories {:>5.1}%  defeats {}  unfinished {}  mean ticks {:.0}",
            summary.firing_order.by_defense,
            summary.firing_order.by_hp,
            summary.victory_rate() * 100.0,
            summary.defeats,
            summary.no_termination,
            summary.mean_ticks,
        );
    }
    for error in results.errors.iter().take(10) {
        eprintln!("  seed {} ({:?}): {}", error.seed, error.firing_order, error.message);
    }
    eprintln!("\nResults saved to: {}", output.display());
    Ok(())
}

/// Validate a scenario
fn cmd_validate(path: PathBuf) -> Result<(), HarnessError> {
    let scenario = Scenario::load(&path)?;
    let issues = scenario.validate();
    if !issues.is_empty() {
        return Err(HarnessError::Validation(issues));
    }
    eprintln!("OK: '{}' is valid", scenario.name);
    Ok(())
}

/// Verify determinism
fn cmd_verify(path: PathBuf, runs: u32) -> Result<(), HarnessError> {
    let scenario = Scenario::load(&path)?;
    tracing::info!("Verifying determinism: '{}' ({} runs)", scenario.name, runs);

    let outcome = verify_scenario(&scenario, runs)?;
    if outcome.is_deterministic() {
        eprintln!("PASS: All {} runs produced identical results", outcome.runs);
        eprintln!("  Hash: {:016x}", outcome.reference_hash);
        Ok(())
    } else {
        eprintln!("FAIL: Non-determinism detected in runs {:?}", outcome.divergent);
        std::process::exit(1);
    }
}
