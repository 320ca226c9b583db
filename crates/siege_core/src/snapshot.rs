//! Minimal persistent battle state.
//!
//! A snapshot holds what a save system needs to put a battle back exactly
//! where it was: per-entity mutable state, the day clock, squad lines,
//! locks and spawn timers. Static stats are not included; restoring
//! requires a battle built from the same config and setup. Enemies spawned
//! after setup are rebuilt from their tower's stats. The core defines the
//! types only, no file format.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, SquadId};
use crate::events::{DayCounters, Outcome};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::phase::DayPhase;
use crate::spawn::SpawnController;
use crate::targeting::TargetLocks;

/// Mutable state of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Entity id.
    pub id: EntityId,
    /// Position.
    pub position: Vec2Fixed,
    /// Current hp.
    pub hp: u32,
    /// Cooldown left.
    #[serde(with = "fixed_serde")]
    pub cooldown_remaining: Fixed,
    /// Alive flag.
    pub alive: bool,
    /// Tower active flag (true for non-towers).
    pub active: bool,
    /// Tower building flag (false for non-towers).
    pub building: bool,
    /// Spawning tower, for spawned enemies.
    #[serde(default)]
    pub owner: Option<EntityId>,
}

/// Mutable state of one squad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadSnapshot {
    /// Squad id.
    pub id: SquadId,
    /// Firing line, front first.
    pub line: Vec<EntityId>,
    /// Out on the field.
    pub engaged: bool,
    /// Deployment point while engaged.
    pub deployed_at: Option<Vec2Fixed>,
}

/// Everything needed to resume a battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleSnapshot {
    /// Ticks run so far.
    pub tick: u64,
    /// Battle time.
    #[serde(with = "fixed_serde")]
    pub time: Fixed,
    /// Current phase.
    pub phase: DayPhase,
    /// Current day.
    pub day: u32,
    /// Time into the phase.
    #[serde(with = "fixed_serde")]
    pub elapsed_in_phase: Fixed,
    /// Time into the day.
    #[serde(with = "fixed_serde")]
    pub elapsed_in_day: Fixed,
    /// Every entity, in id order.
    pub entities: Vec<EntitySnapshot>,
    /// Every squad, in registration order.
    pub squads: Vec<SquadSnapshot>,
    /// Target locks.
    pub locks: TargetLocks,
    /// Spawn timers, in tower id order.
    pub spawners: Vec<SpawnController>,
    /// Counters of the running day.
    pub counters: DayCounters,
    /// Events emitted before the snapshot was taken.
    pub event_count: usize,
    /// Outcome, if the battle had ended.
    pub outcome: Option<Outcome>,
}
