//! Squads and their firing line.
//!
//! A squad's `line` is its soldiers in firing order, front first. Only the
//! front-most living soldier of an engaged squad can be targeted; when it
//! falls the next one steps up. Squads sitting at home are fully screened.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::entity::{CombatEntity, EntityId, RangeBands, RangeTier, Role, SquadId};
use crate::math::{decimal_vec_serde, Fixed, Vec2Fixed};
use crate::world::World;

/// Largest squad the core accepts.
pub const MAX_SQUAD_SIZE: usize = 4;

/// Where a squad deploys at the start of a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PositionPolicy {
    /// Engage the living tower closest to home.
    #[default]
    NearestTower,
    /// Engage the living tower with the least hp.
    WeakestTower,
    /// Stay home all day.
    HoldAtBase,
}

/// Day-start firing line ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FiringOrder {
    /// Highest max-defense-across-tiers to the front.
    #[serde(default)]
    pub by_defense: bool,
    /// Highest current hp to the front.
    #[serde(default)]
    pub by_hp: bool,
}

impl FiringOrder {
    /// Whether any key is set.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        self.by_defense || self.by_hp
    }

    /// Front-first comparison between two living soldiers. Defense is the
    /// primary key and hp the secondary when both are set.
    #[must_use]
    pub fn compare(self, a: &CombatEntity, b: &CombatEntity) -> Ordering {
        let defense = if self.by_defense {
            b.defense.max_value().cmp(&a.defense.max_value())
        } else {
            Ordering::Equal
        };
        let hp = if self.by_hp {
            b.hp.cmp(&a.hp)
        } else {
            Ordering::Equal
        };
        defense.then(hp)
    }
}

/// A group of up to four soldiers that deploys and fights together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Squad {
    /// Squad id, in registration order.
    pub id: SquadId,
    /// Soldiers in firing order, front first.
    pub line: Vec<EntityId>,
    /// Tier the squad positions itself for.
    pub preferred: RangeTier,
    /// Deployment policy.
    pub policy: PositionPolicy,
    /// Home position.
    #[serde(with = "decimal_vec_serde")]
    pub home: Vec2Fixed,
    /// Out on the field (in transit or deployed).
    pub engaged: bool,
    /// Deployment point while engaged.
    pub deployed_at: Option<Vec2Fixed>,
}

impl Squad {
    /// Create a squad at home.
    #[must_use]
    pub fn new(
        id: SquadId,
        line: Vec<EntityId>,
        preferred: RangeTier,
        policy: PositionPolicy,
        home: Vec2Fixed,
    ) -> Self {
        Self {
            id,
            line,
            preferred,
            policy,
            home,
            engaged: false,
            deployed_at: None,
        }
    }

    /// Front-most living soldier.
    #[must_use]
    pub fn front(&self, world: &World) -> Option<EntityId> {
        self.line.iter().copied().find(|&id| world.is_alive(id))
    }

    /// Whether any soldier still lives.
    #[must_use]
    pub fn has_survivors(&self, world: &World) -> bool {
        self.front(world).is_some()
    }

    /// Reorder the line. Living soldiers are stably sorted to the front by
    /// `order`; the dead keep their relative order behind them.
    pub fn sort_line(&mut self, world: &World, order: FiringOrder) {
        let (mut living, dead): (Vec<EntityId>, Vec<EntityId>) =
            self.line.iter().partition(|&&id| world.is_alive(id));
        if order.is_enabled() {
            living.sort_by(|&a, &b| match (world.get(a), world.get(b)) {
                (Some(a), Some(b)) => order.compare(a, b),
                _ => Ordering::Equal,
            });
        }
        living.extend(dead);
        self.line = living;
    }
}

/// Living tower a squad should engage under `policy`, if any.
///
/// Ties go to the nearer tower, then the lower id.
#[must_use]
pub fn pick_tower(world: &World, from: Vec2Fixed, policy: PositionPolicy) -> Option<EntityId> {
    let towers = world.alive_with_role(Role::Tower);
    match policy {
        PositionPolicy::HoldAtBase => None,
        PositionPolicy::NearestTower => towers
            .min_by_key(|t| (t.position.distance_squared(from), t.id))
            .map(|t| t.id),
        PositionPolicy::WeakestTower => towers
            .min_by_key(|t| (t.hp, t.position.distance_squared(from), t.id))
            .map(|t| t.id),
    }
}

/// Point on the home side of `tower` at the middle of `tier`'s band.
#[must_use]
pub fn deployment_point(
    bands: &RangeBands,
    tower: Vec2Fixed,
    home: Vec2Fixed,
    tier: RangeTier,
) -> Vec2Fixed {
    let mut direction = (home - tower).normalize();
    if direction == Vec2Fixed::ZERO {
        direction = Vec2Fixed::new(Fixed::ONE, Fixed::ZERO);
    }
    tower + direction.scale(bands.midpoint(tier))
}
