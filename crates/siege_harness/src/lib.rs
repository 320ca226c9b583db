//! Offline battle simulator for balance testing.
//!
//! The harness drives the same [`siege_core::battle::Battle`] the live game
//! uses, without any presentation, from a scenario file to a final result.
//! This enables:
//!
//! - **Balance testing**: compare firing-line orderings and seeds in bulk
//! - **CI verification**: check that a scenario replays identically
//! - **Scenario authoring**: report every configuration problem up front
//!
//! # Example
//!
//! ```bash
//! # Run one battle and write the report
//! cargo run -p siege_harness -- run --scenario scenarios/skirmish.ron --output report.json
//!
//! # Every sort toggle combination over 50 seeds
//! cargo run -p siege_harness -- batch --scenario scenarios/skirmish.ron --count 50
//!
//! # Check a scenario without running it
//! cargo run -p siege_harness -- validate --scenario scenarios/duel.ron
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod batch;
pub mod error;
pub mod report;
pub mod scenario;
pub mod simulator;

pub use batch::{run_batch, verify_scenario, BatchConfig, BatchResults, VerifyOutcome};
pub use error::{HarnessError, ValidationIssue};
pub use report::BattleReport;
pub use scenario::{Scenario, SquadEntry, Stats, TowerEntry, TowerStats, TurretEntry};
pub use simulator::simulate;
