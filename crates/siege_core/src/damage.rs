//! Damage resolution.
//!
//! Flat subtraction per tier: `max(attack[tier] - defense[tier], 0)`, and the
//! same for area (explosive) damage against explosive defense. Resolution
//! is idempotent on dead targets: a second hit on a corpse deals nothing and
//! reports no second death, which is what keeps several attackers resolving
//! against one target in the same tick safe.

use serde::{Deserialize, Serialize};

use crate::entity::{CombatEntity, EntityId, RangeTier};
use crate::math::{Fixed, Vec2Fixed};
use crate::spatial::{find_within_radius, FactionFilter};
use crate::world::World;

/// Raw per-tier damage between two stat lines, before hp clamping.
#[must_use]
pub fn tier_damage(attacker: &CombatEntity, target: &CombatEntity, tier: RangeTier) -> u32 {
    attacker
        .attack
        .get(tier)
        .saturating_sub(target.defense.get(tier))
}

/// Raw explosive damage between two stat lines, before hp clamping.
#[must_use]
pub fn explosive_damage(attacker: &CombatEntity, target: &CombatEntity) -> u32 {
    attacker
        .explosive_attack
        .saturating_sub(target.explosive_defense)
}

/// Result of one resolved hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HitReport {
    /// Hp actually removed, within `[0, hp_before]`.
    pub damage: u32,
    /// True only for the hit that brought hp to zero.
    pub killed: bool,
}

/// Result of one explosion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExplosionReport {
    /// `(victim, damage)` for every entity caught in the blast, by id.
    pub hits: Vec<(EntityId, u32)>,
    /// Victims killed by this blast, by id.
    pub killed: Vec<EntityId>,
}

impl ExplosionReport {
    /// Total hp removed by the blast.
    #[must_use]
    pub fn total_damage(&self) -> u32 {
        self.hits.iter().map(|(_, d)| *d).sum()
    }
}

fn apply(world: &mut World, target: EntityId, amount: u32) -> HitReport {
    let Some(entity) = world.get_mut(target) else {
        return HitReport::default();
    };
    if !entity.alive {
        return HitReport::default();
    }
    let damage = entity.apply_damage(amount);
    let killed = entity.hp == 0 && world.mark_dead(target);
    if killed {
        tracing::debug!(entity = target, "entity destroyed");
    }
    HitReport { damage, killed }
}

/// Apply per-tier damage from `attacker` to `target`.
///
/// Unknown or dead attackers and targets are a no-op returning zero.
/// Cooldown bookkeeping belongs to the caller that made the attempt.
pub fn resolve_tier_damage(
    world: &mut World,
    attacker: EntityId,
    target: EntityId,
    tier: RangeTier,
) -> HitReport {
    let amount = match (world.get(attacker), world.get(target)) {
        (Some(a), Some(t)) if a.alive && t.alive => tier_damage(a, t, tier),
        _ => return HitReport::default(),
    };
    apply(world, target, amount)
}

/// Apply area damage around `center` to every living entity of any faction
/// within `radius`, except the attacker itself.
pub fn resolve_explosive(
    world: &mut World,
    attacker: EntityId,
    center: Vec2Fixed,
    radius: Fixed,
) -> ExplosionReport {
    let mut report = ExplosionReport::default();
    if radius <= Fixed::ZERO {
        return report;
    }
    let Some(source) = world.get(attacker).cloned() else {
        return report;
    };

    let victims = find_within_radius(world, center, radius, Fixed::ZERO, FactionFilter::Any);
    for victim in victims.into_iter().filter(|&id| id != attacker) {
        let amount = match world.get(victim) {
            Some(v) => explosive_damage(&source, v),
            None => continue,
        };
        let hit = apply(world, victim, amount);
        report.hits.push((victim, hit.damage));
        if hit.killed {
            report.killed.push(victim);
        }
    }
    report
}
