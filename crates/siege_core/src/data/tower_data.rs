//! Tower level progression.

use serde::{Deserialize, Serialize};

use super::StatBlock;
use crate::error::{CoreError, Result};
use crate::math::{decimal_serde, Fixed};

/// Stats of one tower level plus how often it spawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TowerLevel {
    /// Combat stats at this level.
    pub stats: StatBlock,
    /// Mean time between spawn attempts.
    #[serde(with = "decimal_serde")]
    pub spawn_interval: Fixed,
}

/// Data-driven tower definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TowerData {
    /// Unique identifier.
    pub id: String,
    /// Levels, index 0 first.
    pub levels: Vec<TowerLevel>,
}

impl TowerData {
    /// Stats for `level`.
    pub fn level(&self, level: u8) -> Result<&TowerLevel> {
        self.levels.get(usize::from(level)).ok_or_else(|| {
            CoreError::config(format!(
                "tower '{}' has no level {level} ({} defined)",
                self.id,
                self.levels.len()
            ))
        })
    }

    /// Validate every level.
    pub fn validate(&self) -> Result<()> {
        if self.levels.is_empty() {
            return Err(CoreError::config(format!("tower '{}' has no levels", self.id)));
        }
        for (i, level) in self.levels.iter().enumerate() {
            level.stats.validate(&format!("tower '{}' level {i}", self.id))?;
            if level.spawn_interval <= Fixed::ZERO {
                return Err(CoreError::config(format!(
                    "tower '{}' level {i}: spawn interval must be positive",
                    self.id
                )));
            }
        }
        Ok(())
    }
}
