//! Tower spawn controller.
//!
//! Every tower owns an independent countdown drawn as `mean ± jitter` from a
//! stream seeded by the battle seed and the tower id. The countdown only
//! runs while the tower can act; when it expires the tower tries to place
//! one enemy on the nearest free cell and a fresh interval is drawn whether
//! or not the attempt succeeded.
//!
//! Overshoot past zero is carried into the next interval, so attempts fall
//! due on the same instants whatever the tick delta. Attempts are reported
//! at the end of the tick they fall due in; gaps read off tick times stay
//! inside `[mean - jitter, mean + jitter]` when the tick delta divides both
//! bounds, and are otherwise off by less than one tick delta.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::entity::{CombatEntity, CombatProfile, EntityId, EntityKind, RangeBands, RangeTier, TierValues};
use crate::error::{CoreError, Result};
use crate::math::{decimal_serde, fixed_serde, Fixed, Vec2Fixed};
use crate::rng::SimRng;
use crate::world::World;

/// Default half-width of the interval window.
pub const DEFAULT_SPAWN_JITTER: i32 = 5;

/// Spawn settings shared by every tower of a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnSettings {
    /// Half-width of the interval window.
    #[serde(with = "decimal_serde")]
    pub jitter: Fixed,
    /// Side length of a spawn cell.
    #[serde(with = "decimal_serde")]
    pub cell_size: Fixed,
    /// Movement speed of spawned enemies, per time unit.
    #[serde(with = "decimal_serde")]
    pub enemy_speed: Fixed,
}

impl SpawnSettings {
    /// Reject settings a controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.jitter < Fixed::ZERO {
            return Err(CoreError::config("spawn jitter must not be negative"));
        }
        if self.cell_size <= Fixed::ZERO {
            return Err(CoreError::config("spawn cell size must be positive"));
        }
        if self.enemy_speed < Fixed::ZERO {
            return Err(CoreError::config("enemy speed must not be negative"));
        }
        Ok(())
    }
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            jitter: Fixed::from_num(DEFAULT_SPAWN_JITTER),
            cell_size: Fixed::from_num(2),
            enemy_speed: Fixed::from_num(2),
        }
    }
}

/// Countdown state of one tower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnController {
    /// Owning tower.
    pub tower: EntityId,
    #[serde(with = "fixed_serde")]
    mean: Fixed,
    #[serde(with = "fixed_serde")]
    jitter: Fixed,
    #[serde(with = "fixed_serde")]
    timer: Fixed,
    rng: SimRng,
}

impl SpawnController {
    /// Create a controller and draw its first interval.
    ///
    /// The mean must exceed the jitter so every drawn interval is positive.
    pub fn new(tower: EntityId, mean: Fixed, jitter: Fixed, seed: u64) -> Result<Self> {
        if mean <= jitter {
            return Err(CoreError::config(format!(
                "tower {tower}: spawn interval {mean} must exceed jitter {jitter}"
            )));
        }
        let mut controller = Self {
            tower,
            mean,
            jitter,
            timer: Fixed::ZERO,
            rng: SimRng::derive(seed, tower),
        };
        controller.redraw();
        Ok(controller)
    }

    /// Time left before the next attempt.
    #[must_use]
    pub const fn timer(&self) -> Fixed {
        self.timer
    }

    /// Mean interval.
    #[must_use]
    pub const fn mean(&self) -> Fixed {
        self.mean
    }

    /// Draw a fresh interval.
    pub fn redraw(&mut self) {
        self.timer = self.rng.jitter(self.mean, self.jitter);
    }

    /// Run the countdown by `dt` and return how many attempts fell due.
    ///
    /// Each expiry adds a fresh interval on top of the overshoot, so a `dt`
    /// longer than the shortest interval can yield several attempts.
    pub fn tick(&mut self, dt: Fixed) -> u32 {
        self.timer -= dt;
        let mut due = 0;
        while self.timer <= Fixed::ZERO {
            self.timer += self.rng.jitter(self.mean, self.jitter);
            due += 1;
        }
        due
    }
}

/// Stats of an enemy spawned by `tower`.
#[must_use]
pub fn spawned_profile(tower: &CombatEntity, enemy_speed: Fixed) -> CombatProfile {
    CombatProfile {
        max_hp: (tower.max_hp / 5).max(1),
        attack: TierValues::splat((tower.attack.max_value() / 10).max(1)),
        defense: TierValues::splat(tower.defense.max_value() / 2),
        explosive_attack: 0,
        explosive_defense: 0,
        blast_radius: Fixed::ZERO,
        shot_period: tower.shot_period,
        speed: enemy_speed,
        body_radius: Fixed::ZERO,
    }
}

fn cell_of(point: Vec2Fixed, cell: Fixed) -> (i32, i32) {
    (
        (point.x / cell).floor().saturating_to_num::<i32>(),
        (point.y / cell).floor().saturating_to_num::<i32>(),
    )
}

fn cell_center(cell: (i32, i32), size: Fixed) -> Vec2Fixed {
    let half = size / Fixed::from_num(2);
    Vec2Fixed::new(
        Fixed::from_num(cell.0).saturating_mul(size).saturating_add(half),
        Fixed::from_num(cell.1).saturating_mul(size).saturating_add(half),
    )
}

/// Free spawn cell centres around `origin`, best first.
///
/// Short band cells come first, then Mid, then Long; inside a band cells are
/// ordered by distance, then row, then column. Cells holding any living
/// entity, cells in `reserved`, and cells the collision provider calls
/// unwalkable are left out.
#[must_use]
pub fn candidate_cells(
    world: &World,
    bands: &RangeBands,
    origin: Vec2Fixed,
    cell_size: Fixed,
    reserved: &BTreeSet<(i32, i32)>,
) -> Vec<Vec2Fixed> {
    let occupied: BTreeSet<(i32, i32)> = world
        .alive()
        .map(|e| cell_of(e.position, cell_size))
        .collect();

    let reach = bands.long;
    let lo = cell_of(
        Vec2Fixed::new(origin.x.saturating_sub(reach), origin.y.saturating_sub(reach)),
        cell_size,
    );
    let hi = cell_of(
        Vec2Fixed::new(origin.x.saturating_add(reach), origin.y.saturating_add(reach)),
        cell_size,
    );

    let mut ranked = Vec::new();
    for cy in lo.1..=hi.1 {
        for cx in lo.0..=hi.0 {
            let cell = (cx, cy);
            if occupied.contains(&cell) || reserved.contains(&cell) {
                continue;
            }
            let center = cell_center(cell, cell_size);
            let distance_sq = center.distance_squared(origin);
            let Some(tier) = RangeTier::ALL
                .into_iter()
                .find(|&t| bands.contains_sq(t, distance_sq))
            else {
                continue;
            };
            if !world.collision().is_walkable(center) {
                continue;
            }
            ranked.push((tier.index(), distance_sq, cy, cx, center));
        }
    }
    ranked.sort_by(|a, b| (a.0, a.1, a.2, a.3).cmp(&(b.0, b.1, b.2, b.3)));
    ranked.into_iter().map(|(.., center)| center).collect()
}

/// Cell index of a point, for building reservation sets.
#[must_use]
pub fn reserve_cell(point: Vec2Fixed, cell_size: Fixed) -> (i32, i32) {
    cell_of(point, cell_size)
}

/// Place one enemy next to `tower`.
///
/// Returns `None` without touching the world when the tower is missing,
/// dead, not operational, or has no free cell around it.
pub fn spawn_enemy(
    world: &mut World,
    bands: &RangeBands,
    tower: EntityId,
    settings: &SpawnSettings,
    reserved: &BTreeSet<(i32, i32)>,
) -> Option<EntityId> {
    let source = world
        .get(tower)
        .filter(|t| t.alive && t.is_operational() && matches!(t.kind, EntityKind::Tower { .. }))?;
    let profile = spawned_profile(source, settings.enemy_speed);
    let cell = candidate_cells(world, bands, source.position, settings.cell_size, reserved)
        .into_iter()
        .next()?;

    let id = world.spawn(CombatEntity::new(
        EntityKind::SpawnedEnemy { owner: tower },
        &profile,
        cell,
    ));
    tracing::debug!(tower, enemy = id, x = %cell.x, y = %cell.y, "enemy spawned");
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Obstacle, ObstacleField};

    fn bands() -> RangeBands {
        RangeBands::new(Fixed::from_num(2), Fixed::from_num(4), Fixed::from_num(6))
    }

    fn tower_at(world: &mut World, x: i32, y: i32) -> EntityId {
        world.spawn(CombatEntity::new(
            EntityKind::Tower {
                level: 0,
                active: true,
                building: false,
            },
            &CombatProfile {
                max_hp: 103,
                attack: TierValues::new(5, 25, 0),
                defense: TierValues::new(7, 3, 0),
                shot_period: Fixed::from_num(3),
                ..Default::default()
            },
            Vec2Fixed::from_ints(x, y),
        ))
    }

    #[test]
    fn test_spawned_stats_derive_from_tower() {
        let mut world = World::new();
        let tower = tower_at(&mut world, 0, 0);
        let p = spawned_profile(world.get(tower).unwrap(), Fixed::ONE);
        assert_eq!(p.max_hp, 20);
        assert_eq!(p.attack, TierValues::splat(2));
        assert_eq!(p.defense, TierValues::splat(3));
        assert_eq!(p.shot_period, Fixed::from_num(3));
    }

    #[test]
    fn test_spawned_stats_have_floors() {
        let weak = CombatEntity::new(
            EntityKind::Tower {
                level: 0,
                active: true,
                building: false,
            },
            &CombatProfile {
                max_hp: 3,
                ..Default::default()
            },
            Vec2Fixed::ZERO,
        );
        let p = spawned_profile(&weak, Fixed::ONE);
        assert_eq!(p.max_hp, 1);
        assert_eq!(p.attack, TierValues::splat(1));
        assert_eq!(p.defense, TierValues::splat(0));
    }

    #[test]
    fn test_cells_ordered_short_band_first_and_skip_occupied() {
        let mut world = World::new();
        let tower = tower_at(&mut world, 1, 1);
        let cells = candidate_cells(
            &world,
            &bands(),
            world.get(tower).unwrap().position,
            Fixed::from_num(2),
            &BTreeSet::new(),
        );
        // The tower's own cell (centre 1,1) is occupied.
        assert!(!cells.contains(&Vec2Fixed::from_ints(1, 1)));
        // Four orthogonal neighbours at distance 2 come first, row then column.
        assert_eq!(
            &cells[..4],
            &[
                Vec2Fixed::from_ints(1, -1),
                Vec2Fixed::from_ints(-1, 1),
                Vec2Fixed::from_ints(3, 1),
                Vec2Fixed::from_ints(1, 3),
            ]
        );
    }

    #[test]
    fn test_no_free_cell_spawns_nothing() {
        let mut world = World::with_collision(Box::new(ObstacleField::new(vec![Obstacle {
            center: Vec2Fixed::ZERO,
            radius: Fixed::from_num(50),
        }])));
        let tower = tower_at(&mut world, 0, 0);
        let before = world.len();
        let spawned = spawn_enemy(
            &mut world,
            &bands(),
            tower,
            &SpawnSettings::default(),
            &BTreeSet::new(),
        );
        assert_eq!(spawned, None);
        assert_eq!(world.len(), before);
    }

    #[test]
    fn test_reserved_cells_are_skipped() {
        let mut world = World::new();
        let tower = tower_at(&mut world, 1, 1);
        let settings = SpawnSettings::default();
        let reserved: BTreeSet<_> = [(0, -1)].into_iter().collect();
        let id = spawn_enemy(&mut world, &bands(), tower, &settings, &reserved).unwrap();
        assert_eq!(world.get(id).unwrap().position, Vec2Fixed::from_ints(-1, 1));
    }

    /// Tick times at which attempts fall due over `total` time units.
    fn due_times(seed: u64, dt: Fixed, total: i32) -> Vec<Fixed> {
        let mut c = SpawnController::new(1, Fixed::from_num(20), Fixed::from_num(5), seed).unwrap();
        let mut now = Fixed::ZERO;
        let mut times = Vec::new();
        while now < Fixed::from_num(total) {
            now += dt;
            for _ in 0..c.tick(dt) {
                times.push(now);
            }
        }
        times
    }

    #[test]
    fn test_controller_intervals_within_window() {
        for dt in [Fixed::ONE, Fixed::from_num(2.5), Fixed::from_num(0.5)] {
            let times = due_times(9, dt, 2000);
            assert!(times.len() > 50);
            for pair in times.windows(2) {
                let gap = pair[1] - pair[0];
                assert!(
                    gap >= Fixed::from_num(15) && gap <= Fixed::from_num(25),
                    "dt {dt}: gap {gap}"
                );
            }
        }
    }

    #[test]
    fn test_overshoot_carries_into_next_interval() {
        for seed in [0, 3, 17] {
            let fine = due_times(seed, Fixed::ONE, 2000);
            let coarse = due_times(seed, Fixed::from_num(4), 2000);
            // Same instants, only rounded up to a coarser tick.
            assert_eq!(fine.len(), coarse.len(), "seed {seed}");
            for (a, b) in fine.iter().zip(&coarse) {
                assert!(*b >= *a && *b - *a < Fixed::from_num(4), "seed {seed}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn test_coarse_tick_reports_every_due_attempt() {
        let mut c = SpawnController::new(1, Fixed::from_num(20), Fixed::from_num(5), 4).unwrap();
        // Every interval is under 25, so 100 time units hold at least four.
        assert!(c.tick(Fixed::from_num(100)) >= 4);
        assert!(c.timer() > Fixed::ZERO);
    }

    #[test]
    fn test_controller_rejects_jitter_above_mean() {
        assert!(SpawnController::new(1, Fixed::from_num(5), Fixed::from_num(5), 0).is_err());
    }
}
