//! Scenario loading and validation.
//!
//! A scenario is everything one offline battle needs: the rules, the
//! squads, the towers and turrets, terrain blockers, the tick delta and the
//! tick limit. Stat lines are written inline or looked up by name in the
//! scenario's own stat table.

use std::path::Path;

use serde::{Deserialize, Serialize};
use siege_core::battle::{BattleConfig, BattleSetup, SquadSetup, TowerSetup, TurretSetup};
use siege_core::data::{StatBlock, StatTable};
use siege_core::entity::RangeTier;
use siege_core::error::CoreError;
use siege_core::math::{decimal_serde, decimal_vec_serde, Fixed, Vec2Fixed};
use siege_core::spatial::Obstacle;
use siege_core::squad::{FiringOrder, PositionPolicy, MAX_SQUAD_SIZE};

use crate::error::{HarnessError, ValidationIssue};

/// Soldiers every harness squad fields.
pub const SQUAD_SIZE: usize = MAX_SQUAD_SIZE;

/// Default tick limit.
pub const DEFAULT_MAX_TICKS: u64 = 100_000;

/// Where a stat line comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stats {
    /// Entry of the scenario's stat table.
    Named(String),
    /// Written in place.
    Inline(StatBlock),
}

impl Stats {
    fn resolve(&self, table: &StatTable, soldier: bool) -> Result<StatBlock, CoreError> {
        match self {
            Stats::Inline(block) => Ok(*block),
            Stats::Named(name) if soldier => table.soldier(name).copied(),
            Stats::Named(name) => table.turret(name).copied(),
        }
    }
}

/// Where a tower's stats and spawn interval come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TowerStats {
    /// One level of a tower in the stat table.
    Named {
        /// Tower name.
        tower: String,
        /// Level, 0 first.
        #[serde(default)]
        level: u8,
    },
    /// Written in place.
    Inline {
        /// Combat stats.
        stats: StatBlock,
        /// Mean time between spawn attempts.
        #[serde(with = "decimal_serde")]
        spawn_interval: Fixed,
    },
}

/// One squad of the scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadEntry {
    /// Soldiers in registration order.
    pub soldiers: Vec<Stats>,
    /// Tier the squad positions itself for.
    #[serde(default = "default_preferred")]
    pub preferred: RangeTier,
    /// Deployment policy.
    #[serde(default)]
    pub policy: PositionPolicy,
    /// Home position.
    #[serde(with = "decimal_vec_serde")]
    pub home: Vec2Fixed,
}

const fn default_preferred() -> RangeTier {
    RangeTier::Short
}

/// One tower of the scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TowerEntry {
    /// Position.
    #[serde(with = "decimal_vec_serde")]
    pub position: Vec2Fixed,
    /// Stats source.
    pub stats: TowerStats,
    /// Active towers shoot and spawn.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Towers under construction do neither.
    #[serde(default)]
    pub building: bool,
}

const fn default_true() -> bool {
    true
}

/// One player turret of the scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurretEntry {
    /// Position.
    #[serde(with = "decimal_vec_serde")]
    pub position: Vec2Fixed,
    /// Stats source.
    pub stats: Stats,
}

/// A complete offline battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Battle rules (bands, day timing, healing, sort toggles, seed).
    #[serde(default)]
    pub config: BattleConfig,
    /// Fixed tick delta.
    #[serde(default = "default_dt", with = "decimal_serde")]
    pub dt: Fixed,
    /// Safety bound on the number of ticks.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
    /// Named stat lines referenced by the entries below.
    #[serde(default)]
    pub table: StatTable,
    /// Squads in registration order.
    pub squads: Vec<SquadEntry>,
    /// Towers.
    pub towers: Vec<TowerEntry>,
    /// Player turrets.
    #[serde(default)]
    pub turrets: Vec<TurretEntry>,
    /// Circular terrain blockers.
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
}

fn default_dt() -> Fixed {
    Fixed::ONE
}

const fn default_max_ticks() -> u64 {
    DEFAULT_MAX_TICKS
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HarnessError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, HarnessError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Write the scenario as pretty RON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), HarnessError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Build a scenario from core setup types, all stats inline.
    #[must_use]
    pub fn from_setup(name: &str, config: BattleConfig, setup: &BattleSetup) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            config,
            dt: default_dt(),
            max_ticks: DEFAULT_MAX_TICKS,
            table: StatTable::default(),
            squads: setup
                .squads
                .iter()
                .map(|squad| SquadEntry {
                    soldiers: squad.soldiers.iter().copied().map(Stats::Inline).collect(),
                    preferred: squad.preferred,
                    policy: squad.policy,
                    home: squad.home,
                })
                .collect(),
            towers: setup
                .towers
                .iter()
                .map(|tower| TowerEntry {
                    position: tower.position,
                    stats: TowerStats::Inline {
                        stats: tower.stats,
                        spawn_interval: tower.spawn_interval,
                    },
                    active: tower.active,
                    building: tower.building,
                })
                .collect(),
            turrets: setup
                .turrets
                .iter()
                .map(|turret| TurretEntry {
                    position: turret.position,
                    stats: Stats::Inline(turret.stats),
                })
                .collect(),
            obstacles: Vec::new(),
        }
    }

    /// Same scenario with another seed and firing order.
    #[must_use]
    pub fn variant(&self, seed: u64, firing_order: FiringOrder) -> Self {
        let mut scenario = self.clone();
        scenario.config.seed = seed;
        scenario.config.firing_order = firing_order;
        scenario
    }

    /// Every problem that would stop this scenario from running.
    ///
    /// An empty list means [`Scenario::to_setup`] and battle creation will
    /// succeed.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut check = |field: String, result: Result<(), CoreError>| {
            if let Err(e) = result {
                issues.push(ValidationIssue::new(field, core_message(&e)));
            }
        };

        check("config.bands".into(), self.config.bands.validate());
        check("config.phases".into(), self.config.phases.validate());
        check("config.spawn".into(), self.config.spawn.validate());
        check("table".into(), self.table.validate());
        if self.dt <= Fixed::ZERO {
            check("dt".into(), Err(CoreError::config("tick delta must be positive")));
        }
        if self.max_ticks == 0 {
            check("max_ticks".into(), Err(CoreError::config("must be at least 1")));
        }

        if self.squads.is_empty() {
            check("squads".into(), Err(CoreError::config("at least one squad is required")));
        }
        for (i, squad) in self.squads.iter().enumerate() {
            if squad.soldiers.len() != SQUAD_SIZE {
                check(
                    format!("squads[{i}].soldiers"),
                    Err(CoreError::config(format!(
                        "expected exactly {SQUAD_SIZE} soldiers, found {}",
                        squad.soldiers.len()
                    ))),
                );
            }
            for (slot, stats) in squad.soldiers.iter().enumerate() {
                let field = format!("squads[{i}].soldiers[{slot}]");
                let result = stats
                    .resolve(&self.table, true)
                    .and_then(|block| block.validate(&field));
                check(field, result);
            }
        }

        if self.towers.is_empty() {
            check("towers".into(), Err(CoreError::config("at least one tower is required")));
        }
        for (i, tower) in self.towers.iter().enumerate() {
            let field = format!("towers[{i}]");
            let result = self.resolve_tower(tower).and_then(|setup| {
                setup.stats.validate(&field)?;
                if setup.spawn_interval <= self.config.spawn.jitter {
                    return Err(CoreError::config(format!(
                        "spawn interval {} must exceed the spawn jitter {}",
                        setup.spawn_interval, self.config.spawn.jitter
                    )));
                }
                Ok(())
            });
            check(field, result);
        }

        for (i, turret) in self.turrets.iter().enumerate() {
            let field = format!("turrets[{i}]");
            let result = turret
                .stats
                .resolve(&self.table, false)
                .and_then(|block| block.validate(&field));
            check(field, result);
        }

        for (i, obstacle) in self.obstacles.iter().enumerate() {
            if obstacle.radius < Fixed::ZERO {
                check(
                    format!("obstacles[{i}].radius"),
                    Err(CoreError::config("must not be negative")),
                );
            }
        }

        issues
    }

    fn resolve_tower(&self, tower: &TowerEntry) -> Result<TowerSetup, CoreError> {
        let (stats, spawn_interval, level) = match &tower.stats {
            TowerStats::Inline {
                stats,
                spawn_interval,
            } => (*stats, *spawn_interval, 0),
            TowerStats::Named { tower: name, level } => {
                let data = self.table.tower(name)?.level(*level)?;
                (data.stats, data.spawn_interval, *level)
            }
        };
        Ok(TowerSetup {
            position: tower.position,
            stats,
            spawn_interval,
            level,
            active: tower.active,
            building: tower.building,
        })
    }

    /// Resolve every stat reference into a core battle setup.
    pub fn to_setup(&self) -> Result<BattleSetup, HarnessError> {
        let squads = self
            .squads
            .iter()
            .map(|squad| {
                let soldiers = squad
                    .soldiers
                    .iter()
                    .map(|stats| stats.resolve(&self.table, true))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SquadSetup {
                    soldiers,
                    preferred: squad.preferred,
                    policy: squad.policy,
                    home: squad.home,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;
        let towers = self
            .towers
            .iter()
            .map(|tower| self.resolve_tower(tower))
            .collect::<Result<Vec<_>, _>>()?;
        let turrets = self
            .turrets
            .iter()
            .map(|turret| {
                Ok(TurretSetup {
                    position: turret.position,
                    stats: turret.stats.resolve(&self.table, false)?,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;
        Ok(BattleSetup {
            squads,
            towers,
            turrets,
        })
    }
}

fn core_message(error: &CoreError) -> String {
    match error {
        CoreError::InvalidConfiguration(message) => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        Scenario(
            name: "Minimal",
            table: (
                soldiers: {
                    "rifle": (max_hp: 60, attack: (short: 20, mid: 10, long: 0), shot_period: 1.0),
                },
                towers: {
                    "keep": (id: "keep", levels: [
                        (stats: (max_hp: 200, shot_period: 2.0), spawn_interval: 20.0),
                        (stats: (max_hp: 300, shot_period: 2.0), spawn_interval: 15.0),
                    ]),
                },
            ),
            squads: [
                (
                    soldiers: [Named("rifle"), Named("rifle"), Named("rifle"),
                        Inline((max_hp: 90, shot_period: 2.0))],
                    home: (-30.0, 0.0),
                ),
            ],
            towers: [
                (position: (0.0, 0.0), stats: Named(tower: "keep", level: 1)),
            ],
        )
    "#;

    #[test]
    fn test_parse_from_ron() {
        let scenario = Scenario::from_ron_str(MINIMAL).expect("parse");
        assert_eq!(scenario.name, "Minimal");
        assert_eq!(scenario.dt, Fixed::ONE);
        assert_eq!(scenario.max_ticks, DEFAULT_MAX_TICKS);
        assert_eq!(scenario.config, BattleConfig::default());
        assert!(scenario.validate().is_empty());
    }

    #[test]
    fn test_named_stats_resolve() {
        let scenario = Scenario::from_ron_str(MINIMAL).expect("parse");
        let setup = scenario.to_setup().expect("setup");
        assert_eq!(setup.squads[0].soldiers[0].max_hp, 60);
        assert_eq!(setup.squads[0].soldiers[3].max_hp, 90);
        assert_eq!(setup.towers[0].stats.max_hp, 300);
        assert_eq!(setup.towers[0].level, 1);
        assert_eq!(setup.towers[0].spawn_interval, Fixed::from_num(15));
    }

    #[test]
    fn test_validation_collects_every_issue() {
        let mut scenario = Scenario::from_ron_str(MINIMAL).expect("parse");
        scenario.squads[0].soldiers.pop();
        scenario.squads[0].soldiers[0] = Stats::Named("grenadier".into());
        scenario.towers[0].stats = TowerStats::Named {
            tower: "keep".into(),
            level: 5,
        };
        scenario.dt = Fixed::ZERO;

        let issues = scenario.validate();
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"dt"));
        assert!(fields.contains(&"squads[0].soldiers"));
        assert!(fields.contains(&"squads[0].soldiers[0]"));
        assert!(fields.contains(&"towers[0]"));
        assert_eq!(issues.len(), 4);
    }

    #[test]
    fn test_spawn_interval_must_exceed_jitter() {
        let mut scenario = Scenario::from_ron_str(MINIMAL).expect("parse");
        scenario.config.spawn.jitter = Fixed::from_num(15);
        let issues = scenario.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "towers[0]");
    }

    #[test]
    fn test_variant_overrides_seed_and_order() {
        let scenario = Scenario::from_ron_str(MINIMAL).expect("parse");
        let order = FiringOrder {
            by_defense: true,
            by_hp: false,
        };
        let variant = scenario.variant(9, order);
        assert_eq!(variant.config.seed, 9);
        assert_eq!(variant.config.firing_order, order);
        assert_eq!(variant.squads, scenario.squads);
    }
}
