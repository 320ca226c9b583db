//! Battle reports.
//!
//! A [`BattleReport`] is the complete, serializable result of one offline
//! battle: outcome, clock, per-day tallies, final state of every squad and
//! tower and the ordered event log.

use std::path::Path;

use serde::{Deserialize, Serialize};
use siege_core::battle::Battle;
use siege_core::entity::{CombatEntity, EntityId, EntityKind, SquadId};
use siege_core::events::{BattleEvent, DaySummary, Outcome, TimedEvent};
use siege_core::math::{decimal_serde, Fixed};
use siege_core::squad::FiringOrder;

/// Final state of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    /// Entity id.
    pub entity: EntityId,
    /// Hp at the end.
    pub hp: u32,
    /// Maximum hp.
    pub max_hp: u32,
    /// Still standing.
    pub alive: bool,
}

impl From<&CombatEntity> for UnitReport {
    fn from(entity: &CombatEntity) -> Self {
        Self {
            entity: entity.id,
            hp: entity.hp,
            max_hp: entity.max_hp,
            alive: entity.alive,
        }
    }
}

/// Final state of one squad, in its last firing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadReport {
    /// Squad id.
    pub squad: SquadId,
    /// Soldiers, front first.
    pub soldiers: Vec<UnitReport>,
}

impl SquadReport {
    /// Soldiers still alive.
    #[must_use]
    pub fn survivors(&self) -> usize {
        self.soldiers.iter().filter(|s| s.alive).count()
    }
}

/// Result of one offline battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleReport {
    /// Scenario name.
    pub scenario: String,
    /// Seed used.
    pub seed: u64,
    /// Firing order used.
    pub firing_order: FiringOrder,
    /// How the battle ended.
    pub outcome: Outcome,
    /// Ticks run.
    pub ticks: u64,
    /// Battle time at the end.
    #[serde(with = "decimal_serde")]
    pub time: Fixed,
    /// Day the battle ended on.
    pub final_day: u32,
    /// Tallies of every completed day.
    pub days: Vec<DaySummary>,
    /// Squads at the end.
    pub squads: Vec<SquadReport>,
    /// Towers at the end.
    pub towers: Vec<UnitReport>,
    /// Spawned enemies still alive.
    pub enemies_alive: usize,
    /// State hash at the end.
    pub state_hash: u64,
    /// Ordered event log.
    pub events: Vec<TimedEvent>,
}

impl BattleReport {
    /// Collect the report from a finished battle.
    #[must_use]
    pub fn from_battle(scenario: &str, battle: &Battle) -> Self {
        let world = battle.world();
        let squads = battle
            .squads()
            .iter()
            .map(|squad| SquadReport {
                squad: squad.id,
                soldiers: squad
                    .line
                    .iter()
                    .filter_map(|&id| world.get(id))
                    .map(UnitReport::from)
                    .collect(),
            })
            .collect();
        let towers = world
            .iter()
            .filter(|e| matches!(e.kind, EntityKind::Tower { .. }))
            .map(UnitReport::from)
            .collect();
        let enemies_alive = world
            .alive()
            .filter(|e| matches!(e.kind, EntityKind::SpawnedEnemy { .. }))
            .count();
        let days = battle
            .events()
            .iter()
            .filter_map(|timed| match timed.event {
                BattleEvent::DayEnded {
                    day,
                    healed,
                    counters,
                } => Some(DaySummary {
                    day,
                    healed,
                    counters,
                }),
                _ => None,
            })
            .collect();

        Self {
            scenario: scenario.to_string(),
            seed: battle.config().seed,
            firing_order: battle.config().firing_order,
            outcome: battle.outcome().unwrap_or(Outcome::NoTermination),
            ticks: battle.tick(),
            time: battle.time(),
            final_day: battle.day(),
            days,
            squads,
            towers,
            enemies_alive,
            state_hash: battle.state_hash(),
            events: battle.events().to_vec(),
        }
    }

    /// Soldiers alive across every squad.
    #[must_use]
    pub fn survivors(&self) -> usize {
        self.squads.iter().map(SquadReport::survivors).sum()
    }

    /// Towers still standing.
    #[must_use]
    pub fn towers_standing(&self) -> usize {
        self.towers.iter().filter(|t| t.alive).count()
    }

    /// Save the report as pretty JSON.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load a report from JSON.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}
