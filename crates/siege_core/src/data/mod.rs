//! Authored stat data.
//!
//! Stat blocks are opaque input to the combat core: designers author them
//! in RON, the core only reads them. Everything here is plain data plus
//! parsing from an in-memory string. Reading files is the caller's job.

mod stat_block;
mod stat_table;
mod tower_data;

pub use stat_block::StatBlock;
pub use stat_table::StatTable;
pub use tower_data::{TowerData, TowerLevel};
