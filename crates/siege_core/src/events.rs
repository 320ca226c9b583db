//! Battle event log and observer hooks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{CombatEntity, EntityId, RangeTier};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::phase::{DayPhase, PhaseTransition};

/// How a battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Every tower destroyed.
    Victory,
    /// Every soldier of every squad dead.
    Defeat,
    /// Tick limit reached first.
    NoTermination,
}

/// Per-day tallies, reset at every day end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DayCounters {
    /// Attacks committed against a live target.
    pub shots: u32,
    /// Hp removed by those attacks and their blasts.
    pub damage_dealt: u64,
    /// Entities destroyed.
    pub kills: u32,
    /// Enemies spawned.
    pub spawns: u32,
}

/// Something that happened during a battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleEvent {
    /// Direct attack.
    Shot {
        /// Attacker.
        attacker: EntityId,
        /// Target.
        target: EntityId,
        /// Tier the attack resolved in.
        tier: RangeTier,
        /// Hp removed.
        damage: u32,
    },
    /// Area damage following a direct hit.
    Explosion {
        /// Source of the blast.
        attacker: EntityId,
        /// Blast centre.
        center: Vec2Fixed,
        /// `(victim, damage)` pairs by id.
        hits: Vec<(EntityId, u32)>,
    },
    /// An entity's hp reached zero.
    Death {
        /// Destroyed entity.
        entity: EntityId,
        /// Attacker responsible, if any.
        killer: Option<EntityId>,
    },
    /// A tower placed an enemy.
    Spawn {
        /// Spawning tower.
        tower: EntityId,
        /// New enemy.
        enemy: EntityId,
        /// Where it appeared.
        position: Vec2Fixed,
    },
    /// Day cycle boundary.
    PhaseChanged {
        /// Phase left.
        from: DayPhase,
        /// Phase entered.
        to: DayPhase,
        /// Day of the transition.
        day: u32,
    },
    /// Day end bookkeeping finished.
    DayEnded {
        /// Day that ended.
        day: u32,
        /// Total hp restored to soldiers.
        healed: u32,
        /// Tallies of the day.
        counters: DayCounters,
    },
    /// The battle is over.
    Terminal {
        /// Result.
        outcome: Outcome,
    },
}

/// Event stamped with when it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    /// Tick it was produced in (1-based; 0 is setup).
    pub tick: u64,
    /// Battle time when produced.
    #[serde(with = "fixed_serde")]
    pub time: Fixed,
    /// Payload.
    pub event: BattleEvent,
}

/// Summary handed to observers at day end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySummary {
    /// Day that ended.
    pub day: u32,
    /// Total hp restored.
    pub healed: u32,
    /// Tallies of the day.
    pub counters: DayCounters,
}

/// Hooks for the game layer (effects, UI, analytics).
///
/// Every method has an empty default so observers implement only what they
/// care about. Observers run synchronously inside the tick that produced
/// the notification.
pub trait BattleObserver: Send {
    /// An entity was destroyed.
    fn on_entity_destroyed(&mut self, _entity: &CombatEntity, _killer: Option<EntityId>) {}

    /// The day cycle crossed a boundary.
    fn on_phase_changed(&mut self, _transition: &PhaseTransition) {}

    /// Day end bookkeeping finished.
    fn on_day_ended(&mut self, _summary: &DaySummary) {}
}

/// Handle returned by [`ObserverRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u32);

/// Observers owned by one battle, notified in subscription order.
#[derive(Default)]
pub struct ObserverRegistry {
    next: u32,
    observers: BTreeMap<ObserverId, Box<dyn BattleObserver>>,
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("count", &self.observers.len())
            .finish()
    }
}

impl ObserverRegistry {
    /// Register an observer.
    pub fn subscribe(&mut self, observer: Box<dyn BattleObserver>) -> ObserverId {
        let id = ObserverId(self.next);
        self.next += 1;
        self.observers.insert(id, observer);
        id
    }

    /// Remove an observer. Returns it if it was registered.
    pub fn unsubscribe(&mut self, id: ObserverId) -> Option<Box<dyn BattleObserver>> {
        self.observers.remove(&id)
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether nobody is listening.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub(crate) fn entity_destroyed(&mut self, entity: &CombatEntity, killer: Option<EntityId>) {
        for observer in self.observers.values_mut() {
            observer.on_entity_destroyed(entity, killer);
        }
    }

    pub(crate) fn phase_changed(&mut self, transition: &PhaseTransition) {
        for observer in self.observers.values_mut() {
            observer.on_phase_changed(transition);
        }
    }

    pub(crate) fn day_ended(&mut self, summary: &DaySummary) {
        for observer in self.observers.values_mut() {
            observer.on_day_ended(summary);
        }
    }
}
