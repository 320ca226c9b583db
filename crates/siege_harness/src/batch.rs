//! Batch runner for balance testing.
//!
//! Runs one scenario across many seeds and firing-line orderings in
//! parallel using rayon. Battles share nothing, so each worker owns its
//! battle outright and results come back in input order.

use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use siege_core::events::Outcome;
use siege_core::squad::FiringOrder;
use tracing::{debug, info, warn};

use crate::error::HarnessError;
use crate::report::BattleReport;
use crate::scenario::Scenario;
use crate::simulator::simulate;

/// Every combination of the two sort toggles.
pub const SORT_VARIANTS: [FiringOrder; 4] = [
    FiringOrder {
        by_defense: false,
        by_hp: false,
    },
    FiringOrder {
        by_defense: true,
        by_hp: false,
    },
    FiringOrder {
        by_defense: false,
        by_hp: true,
    },
    FiringOrder {
        by_defense: true,
        by_hp: true,
    },
];

/// Configuration for a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Seeds to run.
    pub seed_count: u32,
    /// First seed.
    pub seed_start: u64,
    /// Run every sort toggle combination per seed instead of the
    /// scenario's own.
    pub sort_variants: bool,
    /// Worker threads (0 = rayon default).
    pub parallel: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            seed_count: 100,
            seed_start: 0,
            sort_variants: true,
            parallel: 0,
        }
    }
}

impl BatchConfig {
    /// Config for `seed_count` seeds.
    pub fn new(seed_count: u32) -> Self {
        Self {
            seed_count,
            ..Default::default()
        }
    }

    /// Set seed start.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Keep the scenario's own firing order.
    pub fn without_variants(mut self) -> Self {
        self.sort_variants = false;
        self
    }
}

/// Condensed result of one battle of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRun {
    /// Seed.
    pub seed: u64,
    /// Firing order.
    pub firing_order: FiringOrder,
    /// Outcome.
    pub outcome: Outcome,
    /// Ticks run.
    pub ticks: u64,
    /// Day the battle ended on.
    pub final_day: u32,
    /// Soldiers alive at the end.
    pub survivors: usize,
    /// Towers standing at the end.
    pub towers_standing: usize,
    /// Final state hash.
    pub state_hash: u64,
}

impl BatchRun {
    fn from_report(report: &BattleReport) -> Self {
        Self {
            seed: report.seed,
            firing_order: report.firing_order,
            outcome: report.outcome,
            ticks: report.ticks,
            final_day: report.final_day,
            survivors: report.survivors(),
            towers_standing: report.towers_standing(),
            state_hash: report.state_hash,
        }
    }
}

/// A battle of the batch that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Seed.
    pub seed: u64,
    /// Firing order.
    pub firing_order: FiringOrder,
    /// Error message.
    pub message: String,
}

/// Outcome tallies for one firing order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderSummary {
    /// Firing order.
    pub firing_order: FiringOrder,
    /// Battles run.
    pub runs: u32,
    /// Victories.
    pub victories: u32,
    /// Defeats.
    pub defeats: u32,
    /// Battles stopped by the tick limit.
    pub no_termination: u32,
    /// Mean ticks per battle.
    pub mean_ticks: f64,
    /// Mean surviving soldiers per battle.
    pub mean_survivors: f64,
}

impl OrderSummary {
    /// Share of battles won.
    #[must_use]
    pub fn victory_rate(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            f64::from(self.victories) / f64::from(self.runs)
        }
    }
}

/// Results from a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResults {
    /// Scenario name.
    pub scenario: String,
    /// Configuration used.
    pub config: BatchConfig,
    /// Individual battles, in seed then variant order.
    pub runs: Vec<BatchRun>,
    /// Per firing order tallies.
    pub summary: Vec<OrderSummary>,
    /// Errors encountered.
    pub errors: Vec<BatchError>,
    /// Wall-clock runtime.
    pub duration_seconds: f64,
}

impl BatchResults {
    /// Save results to a JSON file.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from a JSON file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

#[allow(clippy::cast_precision_loss)]
fn summarize(runs: &[BatchRun], orders: &[FiringOrder]) -> Vec<OrderSummary> {
    orders
        .iter()
        .map(|&order| {
            let mut summary = OrderSummary {
                firing_order: order,
                ..OrderSummary::default()
            };
            let mut ticks = 0u64;
            let mut survivors = 0usize;
            for run in runs.iter().filter(|r| r.firing_order == order) {
                summary.runs += 1;
                match run.outcome {
                    Outcome::Victory => summary.victories += 1,
                    Outcome::Defeat => summary.defeats += 1,
                    Outcome::NoTermination => summary.no_termination += 1,
                }
                ticks += run.ticks;
                survivors += run.survivors;
            }
            if summary.runs > 0 {
                let n = f64::from(summary.runs);
                summary.mean_ticks = ticks as f64 / n;
                summary.mean_survivors = survivors as f64 / n;
            }
            summary
        })
        .collect()
}

fn pool(parallel: usize) -> Result<rayon::ThreadPool, HarnessError> {
    Ok(rayon::ThreadPoolBuilder::new().num_threads(parallel).build()?)
}

/// Run `scenario` over the configured seeds and firing orders.
///
/// The scenario is validated once up front; a validation failure aborts
/// the whole batch before any battle runs. Failures of individual battles
/// are collected in [`BatchResults::errors`].
pub fn run_batch(scenario: &Scenario, config: &BatchConfig) -> Result<BatchResults, HarnessError> {
    let issues = scenario.validate();
    if !issues.is_empty() {
        return Err(HarnessError::Validation(issues));
    }

    let orders: Vec<FiringOrder> = if config.sort_variants {
        SORT_VARIANTS.to_vec()
    } else {
        vec![scenario.config.firing_order]
    };
    let jobs: Vec<(u64, FiringOrder)> = (0..u64::from(config.seed_count))
        .map(|i| config.seed_start.wrapping_add(i))
        .flat_map(|seed| orders.iter().map(move |&order| (seed, order)))
        .collect();

    info!(
        scenario = %scenario.name,
        battles = jobs.len(),
        variants = orders.len(),
        "starting batch"
    );
    let start = Instant::now();

    let results: Vec<Result<BatchRun, BatchError>> = pool(config.parallel)?.install(|| {
        jobs.par_iter()
            .map(|&(seed, order)| {
                let variant = scenario.variant(seed, order);
                match simulate(&variant) {
                    Ok(report) => {
                        debug!(seed, ?order, outcome = ?report.outcome, "battle done");
                        Ok(BatchRun::from_report(&report))
                    }
                    Err(e) => {
                        warn!(seed, ?order, "battle failed: {e}");
                        Err(BatchError {
                            seed,
                            firing_order: order,
                            message: e.to_string(),
                        })
                    }
                }
            })
            .collect()
    });

    let (runs, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let runs: Vec<BatchRun> = runs.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();
    let summary = summarize(&runs, &orders);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} battles in {:.1}s ({} failed)",
        runs.len(),
        duration_seconds,
        errors.len()
    );

    Ok(BatchResults {
        scenario: scenario.name.clone(),
        config: *config,
        runs,
        summary,
        errors,
        duration_seconds,
    })
}

/// Result of running one scenario several times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOutcome {
    /// Runs performed.
    pub runs: u32,
    /// State hash of the first run.
    pub reference_hash: u64,
    /// Indices of runs whose report differed from the first.
    pub divergent: Vec<u32>,
}

impl VerifyOutcome {
    /// Every run matched the first.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.divergent.is_empty()
    }
}

/// Run `scenario` `runs` times in parallel and compare full reports.
pub fn verify_scenario(scenario: &Scenario, runs: u32) -> Result<VerifyOutcome, HarnessError> {
    let reports: Vec<BattleReport> = (0..runs.max(1))
        .into_par_iter()
        .map(|_| simulate(scenario))
        .collect::<Result<_, _>>()?;

    let reference = &reports[0];
    let divergent = reports
        .iter()
        .zip(0u32..)
        .skip(1)
        .filter(|(report, _)| *report != reference)
        .map(|(_, index)| index)
        .collect();

    Ok(VerifyOutcome {
        runs: runs.max(1),
        reference_hash: reference.state_hash,
        divergent,
    })
}
