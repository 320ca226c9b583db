//! Range-tiered target selection and target locks.
//!
//! # Selection rule
//!
//! A caller supplies one priority coefficient per tier (usually the
//! attacker's own per-tier attack). Tiers are searched from the highest
//! coefficient down; a tier whose coefficient is zero or negative is never
//! searched. Tiers with equal coefficients keep their natural Short, Mid,
//! Long order, so the farther tied tier acts as a fallback when the nearer
//! one is empty.
//!
//! Inside a tier the nearest living, unscreened, visible hostile wins, with
//! the lowest id breaking exact distance ties.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{CombatEntity, EntityId, RangeBands, RangeTier, TierValues};
use crate::math::{fixed_serde, Fixed};
use crate::spatial::{find_within_radius, line_of_sight, FactionFilter};
use crate::world::World;

/// Per-tier selection priorities. Values at or below zero disable a tier.
pub type Coefficients = TierValues<i64>;

/// Convert per-tier attack into selection coefficients.
#[must_use]
pub fn coefficients_from(values: TierValues<u32>) -> Coefficients {
    TierValues::new(
        i64::from(values.short),
        i64::from(values.mid),
        i64::from(values.long),
    )
}

/// Outcome of a successful selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Chosen target.
    pub target: EntityId,
    /// Tier the target was found in.
    pub tier: RangeTier,
    /// Squared distance at selection time.
    #[serde(with = "fixed_serde")]
    pub distance_sq: Fixed,
}

/// Tiers that will be searched, in search order.
#[must_use]
pub fn tier_order(coeff: &Coefficients) -> Vec<RangeTier> {
    let mut tiers: Vec<RangeTier> = RangeTier::ALL
        .into_iter()
        .filter(|&t| coeff.get(t) > 0)
        .collect();
    // Stable: equal coefficients stay Short, Mid, Long.
    tiers.sort_by(|a, b| coeff.get(*b).cmp(&coeff.get(*a)));
    tiers
}

/// Whether `candidate` may be picked by `source` at all, ignoring range.
fn is_candidate(world: &World, source: &CombatEntity, candidate: &CombatEntity) -> bool {
    candidate.alive
        && !candidate.screened
        && candidate.id != source.id
        && candidate.faction != source.faction
        && line_of_sight(world, source.id, candidate.id)
}

/// Pick the best reachable target for `source`.
///
/// Returns `None` when `source` is unknown or dead, or when every searched
/// tier is empty.
#[must_use]
pub fn select_target(
    world: &World,
    bands: &RangeBands,
    source: EntityId,
    coeff: &Coefficients,
) -> Option<Selection> {
    select_target_where(world, bands, source, coeff, |_| true)
}

/// [`select_target`] with an extra acceptance predicate.
///
/// The battle uses the predicate to apply phase legality (no towers during
/// Retreat, for example) without changing the ranking rule.
#[must_use]
pub fn select_target_where<F>(
    world: &World,
    bands: &RangeBands,
    source: EntityId,
    coeff: &Coefficients,
    accept: F,
) -> Option<Selection>
where
    F: Fn(&CombatEntity) -> bool,
{
    let src = world.get(source).filter(|e| e.alive)?;

    for tier in tier_order(coeff) {
        let (min, max) = bands.band(tier);
        let best = find_within_radius(
            world,
            src.position,
            max,
            min,
            FactionFilter::HostileTo(src.faction),
        )
        .into_iter()
        .filter_map(|id| world.get(id))
        .filter(|c| is_candidate(world, src, c) && accept(c))
        .map(|c| (c.position.distance_squared(src.position), c.id))
        .min();

        if let Some((distance_sq, target)) = best {
            return Some(Selection {
                target,
                tier,
                distance_sq,
            });
        }
    }

    None
}

// ============================================================================
// Target locks
// ============================================================================

/// Transient attacker -> target binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetLock {
    /// Locked target.
    pub target: EntityId,
    /// Tier the lock was acquired in.
    pub tier: RangeTier,
}

impl From<Selection> for TargetLock {
    fn from(selection: Selection) -> Self {
        Self {
            target: selection.target,
            tier: selection.tier,
        }
    }
}

/// All locks of one battle, at most one per attacker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetLocks {
    locks: BTreeMap<EntityId, TargetLock>,
}

impl TargetLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lock of an attacker.
    #[must_use]
    pub fn get(&self, attacker: EntityId) -> Option<TargetLock> {
        self.locks.get(&attacker).copied()
    }

    /// Bind an attacker, replacing any previous lock.
    pub fn set(&mut self, attacker: EntityId, lock: TargetLock) {
        self.locks.insert(attacker, lock);
    }

    /// Release an attacker's lock.
    pub fn release(&mut self, attacker: EntityId) {
        self.locks.remove(&attacker);
    }

    /// Drop every lock pointing at `target` and the target's own lock.
    pub fn invalidate_target(&mut self, target: EntityId) {
        self.locks.remove(&target);
        self.locks.retain(|_, lock| lock.target != target);
    }

    /// Iterate `(attacker, lock)` in attacker id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, TargetLock)> + '_ {
        self.locks.iter().map(|(&a, &l)| (a, l))
    }

    /// Drop all locks (retreat / day end).
    pub fn clear(&mut self) {
        self.locks.clear();
    }

    /// Number of active locks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no lock is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Reverse index: target -> attackers locked onto it, both sorted.
    #[must_use]
    pub fn targeted_by(&self) -> BTreeMap<EntityId, Vec<EntityId>> {
        let mut index: BTreeMap<EntityId, Vec<EntityId>> = BTreeMap::new();
        for (&attacker, lock) in &self.locks {
            index.entry(lock.target).or_default().push(attacker);
        }
        index
    }
}

/// Whether a held lock still stands: target alive, unscreened, still in the
/// locked tier's band, visible, and accepted by `accept`.
#[must_use]
pub fn lock_holds<F>(
    world: &World,
    bands: &RangeBands,
    attacker: EntityId,
    lock: TargetLock,
    accept: F,
) -> bool
where
    F: Fn(&CombatEntity) -> bool,
{
    let (Some(src), Some(target)) = (world.get(attacker), world.get(lock.target)) else {
        return false;
    };
    src.alive
        && is_candidate(world, src, target)
        && bands.contains_sq(lock.tier, src.position.distance_squared(target.position))
        && accept(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CombatProfile, EntityKind};
    use crate::math::Vec2Fixed;

    fn bands() -> RangeBands {
        RangeBands::new(
            Fixed::from_num(4),
            Fixed::from_num(10),
            Fixed::from_num(18),
        )
    }

    fn spawn(world: &mut World, kind: EntityKind, x: i32) -> EntityId {
        world.spawn(CombatEntity::new(
            kind,
            &CombatProfile::default(),
            Vec2Fixed::from_ints(x, 0),
        ))
    }

    fn enemy() -> EntityKind {
        EntityKind::SpawnedEnemy { owner: 0 }
    }

    #[test]
    fn test_tier_order_descending_and_skips_non_positive() {
        assert_eq!(
            tier_order(&TierValues::new(1, 5, 3)),
            vec![RangeTier::Mid, RangeTier::Long, RangeTier::Short]
        );
        assert_eq!(
            tier_order(&TierValues::new(10, 10, 0)),
            vec![RangeTier::Short, RangeTier::Mid]
        );
        assert!(tier_order(&TierValues::new(0, -2, 0)).is_empty());
    }

    #[test]
    fn test_tied_tier_falls_back_but_zero_tier_never_searched() {
        let mut world = World::new();
        let turret = spawn(&mut world, EntityKind::Turret, 0);
        let mid = spawn(&mut world, enemy(), 7);
        let _long = spawn(&mut world, enemy(), 15);

        let pick = select_target(&world, &bands(), turret, &TierValues::new(10, 10, 0)).unwrap();
        assert_eq!(pick.target, mid);
        assert_eq!(pick.tier, RangeTier::Mid);
    }

    #[test]
    fn test_higher_coefficient_beats_nearer_target() {
        let mut world = World::new();
        let turret = spawn(&mut world, EntityKind::Turret, 0);
        let _near = spawn(&mut world, enemy(), 2);
        let far = spawn(&mut world, enemy(), 16);

        let pick = select_target(&world, &bands(), turret, &TierValues::new(1, 1, 9)).unwrap();
        assert_eq!(pick.target, far);
        assert_eq!(pick.tier, RangeTier::Long);
    }

    #[test]
    fn test_nearest_then_lowest_id_within_tier() {
        let mut world = World::new();
        let turret = spawn(&mut world, EntityKind::Turret, 0);
        let a = spawn(&mut world, enemy(), 8);
        let b = world.spawn(CombatEntity::new(
            enemy(),
            &CombatProfile::default(),
            Vec2Fixed::from_ints(0, 6),
        ));
        let c = world.spawn(CombatEntity::new(
            enemy(),
            &CombatProfile::default(),
            Vec2Fixed::from_ints(0, -6),
        ));

        let pick = select_target(&world, &bands(), turret, &TierValues::new(0, 1, 0)).unwrap();
        assert_eq!(pick.target, b);
        assert!(b < c && a < b);
    }

    #[test]
    fn test_dead_screened_and_friendly_are_skipped() {
        let mut world = World::new();
        let turret = spawn(&mut world, EntityKind::Turret, 0);
        let dead = spawn(&mut world, enemy(), 1);
        let screened = spawn(&mut world, enemy(), 2);
        let _friend = spawn(&mut world, EntityKind::Turret, 3);
        world.mark_dead(dead);
        world.get_mut(screened).unwrap().screened = true;

        assert!(select_target(&world, &bands(), turret, &TierValues::splat(1)).is_none());
    }

    #[test]
    fn test_lock_invalidation_and_reverse_index() {
        let mut locks = TargetLocks::new();
        let lock = TargetLock {
            target: 9,
            tier: RangeTier::Short,
        };
        locks.set(1, lock);
        locks.set(2, lock);
        locks.set(3, TargetLock { target: 4, ..lock });

        assert_eq!(locks.targeted_by()[&9], vec![1, 2]);
        locks.invalidate_target(9);
        assert_eq!(locks.len(), 1);
        assert!(locks.get(3).is_some());
    }

    #[test]
    fn test_lock_breaks_when_target_leaves_band() {
        let mut world = World::new();
        let turret = spawn(&mut world, EntityKind::Turret, 0);
        let target = spawn(&mut world, enemy(), 3);
        let lock = TargetLock {
            target,
            tier: RangeTier::Short,
        };
        assert!(lock_holds(&world, &bands(), turret, lock, |_| true));

        world.move_entity(target, Vec2Fixed::from_ints(6, 0));
        assert!(!lock_holds(&world, &bands(), turret, lock, |_| true));
    }
}
