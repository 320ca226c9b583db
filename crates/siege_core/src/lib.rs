//! # Siege Core
//!
//! Deterministic combat core for squad-versus-stronghold battles.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math in the combat path (uses fixed-point)
//!
//! The same code drives the live game and the offline balance harness, so
//! identical inputs and tick deltas always yield identical event logs.
//!
//! ## Crate Structure
//!
//! - [`spatial`] - Radius queries and line of sight
//! - [`targeting`] - Range-tiered target selection and locks
//! - [`entity`] / [`world`] - Combat participants and their arena
//! - [`damage`] - Tier and area damage resolution
//! - [`phase`] - Day cycle state machine and engagement legality
//! - [`spawn`] - Tower spawn controllers
//! - [`battle`] - The battle driver tying it all together
//! - [`data`] - Authored stat blocks

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod battle;
pub mod damage;
pub mod data;
pub mod entity;
pub mod error;
pub mod events;
pub mod math;
pub mod phase;
pub mod rng;
pub mod snapshot;
pub mod spatial;
pub mod spawn;
pub mod squad;
pub mod targeting;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::battle::{Battle, BattleConfig, BattleSetup, SquadSetup, TowerSetup, TurretSetup};
    pub use crate::damage::{resolve_explosive, resolve_tier_damage, ExplosionReport, HitReport};
    pub use crate::data::{StatBlock, StatTable, TowerData, TowerLevel};
    pub use crate::entity::{
        CombatEntity, CombatProfile, EntityId, EntityKind, Faction, RangeBands, RangeTier, Role,
        SquadId, TierValues,
    };
    pub use crate::error::{CoreError, Result};
    pub use crate::events::{
        BattleEvent, BattleObserver, DayCounters, DaySummary, ObserverId, Outcome, TimedEvent,
    };
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::phase::{engagement_allowed, DayCycle, DayPhase, PhaseConfig, PhaseTransition};
    pub use crate::snapshot::{BattleSnapshot, EntitySnapshot};
    pub use crate::spatial::{
        find_within_radius, line_of_sight, CollisionProvider, FactionFilter, Obstacle,
        ObstacleField, OpenField,
    };
    pub use crate::spawn::{SpawnController, SpawnSettings};
    pub use crate::squad::{FiringOrder, PositionPolicy, Squad};
    pub use crate::targeting::{select_target, tier_order, Coefficients, Selection, TargetLock};
    pub use crate::world::World;
}
