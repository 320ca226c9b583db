//! Authored per-entity stat line.

use serde::{Deserialize, Serialize};

use crate::entity::{CombatProfile, TierValues};
use crate::error::{CoreError, Result};
use crate::math::{decimal_serde, Fixed};

/// Stats of one soldier, turret or tower level, as written by designers.
///
/// # Example RON
///
/// ```ron
/// StatBlock(
///     max_hp: 60,
///     attack: (short: 20, mid: 8, long: 0),
///     defense: (short: 4, mid: 4, long: 2),
///     shot_period: 1.5,
///     speed: 3.0,
/// )
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatBlock {
    /// Maximum hit points.
    pub max_hp: u32,
    /// Per-tier attack.
    #[serde(default)]
    pub attack: TierValues<u32>,
    /// Per-tier defense.
    #[serde(default)]
    pub defense: TierValues<u32>,
    /// Area attack magnitude.
    #[serde(default)]
    pub explosive_attack: u32,
    /// Area defense.
    #[serde(default)]
    pub explosive_defense: u32,
    /// Blast radius of the area attack.
    #[serde(default = "zero", with = "decimal_serde")]
    pub blast_radius: Fixed,
    /// Time between shots.
    #[serde(with = "decimal_serde")]
    pub shot_period: Fixed,
    /// Movement speed.
    #[serde(default = "zero", with = "decimal_serde")]
    pub speed: Fixed,
    /// Body radius; structures with a body block sight.
    #[serde(default = "zero", with = "decimal_serde")]
    pub body_radius: Fixed,
}

const fn zero() -> Fixed {
    Fixed::ZERO
}

impl StatBlock {
    /// Runtime profile for entity creation.
    #[must_use]
    pub const fn to_profile(&self) -> CombatProfile {
        CombatProfile {
            max_hp: self.max_hp,
            attack: self.attack,
            defense: self.defense,
            explosive_attack: self.explosive_attack,
            explosive_defense: self.explosive_defense,
            blast_radius: self.blast_radius,
            shot_period: self.shot_period,
            speed: self.speed,
            body_radius: self.body_radius,
        }
    }

    /// Reject stat lines the battle cannot run: zero hp, non-positive shot
    /// period or negative radii.
    pub fn validate(&self, label: &str) -> Result<()> {
        if self.max_hp == 0 {
            return Err(CoreError::config(format!("{label}: max_hp must be positive")));
        }
        if self.shot_period <= Fixed::ZERO {
            return Err(CoreError::config(format!(
                "{label}: shot period must be positive"
            )));
        }
        if self.blast_radius < Fixed::ZERO || self.body_radius < Fixed::ZERO || self.speed < Fixed::ZERO {
            return Err(CoreError::config(format!(
                "{label}: radii and speed must not be negative"
            )));
        }
        Ok(())
    }

    /// Highest defense across tiers.
    #[must_use]
    pub fn max_defense(&self) -> u32 {
        self.defense.max_value()
    }
}

impl From<&StatBlock> for CombatProfile {
    fn from(block: &StatBlock) -> Self {
        block.to_profile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_defaults() {
        let block: StatBlock = ron::from_str(
            "(max_hp: 60, attack: (short: 20, mid: 8, long: 0), shot_period: 1.5)",
        )
        .unwrap();
        assert_eq!(block.max_hp, 60);
        assert_eq!(block.attack.short, 20);
        assert_eq!(block.defense, TierValues::default());
        assert_eq!(block.shot_period, Fixed::from_num(1.5));
        assert_eq!(block.speed, Fixed::ZERO);
        assert!(block.validate("soldier").is_ok());
    }

    #[test]
    fn test_rejects_zero_period() {
        let block: StatBlock = ron::from_str("(max_hp: 10, shot_period: 0.0)").unwrap();
        assert!(matches!(
            block.validate("turret"),
            Err(CoreError::InvalidConfiguration(msg)) if msg.contains("turret")
        ));
    }
}
