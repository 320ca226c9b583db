//! Radius-bounded entity lookup and line-of-sight testing.
//!
//! Everything here is read-only. Static geometry comes from an opaque
//! [`CollisionProvider`] supplied by the host (the live collision world in
//! the game, an [`ObstacleField`] in the offline harness); live structures
//! with a body are added on top of it from the entity arena.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, Faction};
use crate::math::{decimal_serde, decimal_vec_serde, fixed_sqrt, Fixed, Vec2Fixed};
use crate::world::World;

// ============================================================================
// Collision provider
// ============================================================================

/// Static collision geometry supplied by the host.
pub trait CollisionProvider: std::fmt::Debug + Send + Sync {
    /// Ray parameter in `[0, 1]` of the first static obstruction on the
    /// segment `from -> to`, or `None` if the segment is clear.
    fn first_static_hit(&self, from: Vec2Fixed, to: Vec2Fixed) -> Option<Fixed>;

    /// Whether a unit may stand at `point`.
    fn is_walkable(&self, point: Vec2Fixed) -> bool;
}

/// Flat terrain with nothing in the way.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenField;

impl CollisionProvider for OpenField {
    fn first_static_hit(&self, _from: Vec2Fixed, _to: Vec2Fixed) -> Option<Fixed> {
        None
    }

    fn is_walkable(&self, _point: Vec2Fixed) -> bool {
        true
    }
}

/// Circular blocker (rock, wall segment, building footprint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obstacle {
    /// Centre of the blocker.
    #[serde(with = "decimal_vec_serde")]
    pub center: Vec2Fixed,
    /// Radius of the blocker.
    #[serde(with = "decimal_serde")]
    pub radius: Fixed,
}

/// Terrain made of circular blockers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObstacleField {
    /// All blockers, in authoring order.
    pub obstacles: Vec<Obstacle>,
}

impl ObstacleField {
    /// Build from a list of blockers.
    #[must_use]
    pub fn new(obstacles: Vec<Obstacle>) -> Self {
        Self { obstacles }
    }
}

impl CollisionProvider for ObstacleField {
    fn first_static_hit(&self, from: Vec2Fixed, to: Vec2Fixed) -> Option<Fixed> {
        self.obstacles
            .iter()
            .filter_map(|o| segment_circle_entry(from, to, o.center, o.radius))
            .min()
    }

    fn is_walkable(&self, point: Vec2Fixed) -> bool {
        self.obstacles
            .iter()
            .all(|o| point.distance_squared(o.center) > o.radius.saturating_mul(o.radius))
    }
}

/// Ray parameter in `[0, 1]` where the segment `from -> to` first touches a
/// circle, or `None` if it misses.
#[must_use]
pub fn segment_circle_entry(
    from: Vec2Fixed,
    to: Vec2Fixed,
    center: Vec2Fixed,
    radius: Fixed,
) -> Option<Fixed> {
    let r_sq = radius.saturating_mul(radius);
    let offset = from - center;
    if offset.dot(offset) <= r_sq {
        return Some(Fixed::ZERO);
    }

    let dir = to - from;
    let len_sq = dir.dot(dir);
    if len_sq == Fixed::ZERO {
        return None;
    }

    let t_closest = (-offset.dot(dir) / len_sq).clamp(Fixed::ZERO, Fixed::ONE);
    let closest = from + dir.scale(t_closest);
    let miss_sq = closest.distance_squared(center);
    if miss_sq > r_sq {
        return None;
    }

    let back = fixed_sqrt((r_sq - miss_sq) / len_sq);
    Some((t_closest - back).max(Fixed::ZERO))
}

// ============================================================================
// Spatial index
// ============================================================================

type Cell = (i32, i32);

/// Uniform-grid bucket index over living entities.
///
/// Buckets are kept in a `BTreeMap` and each bucket is sorted, so a scan
/// visits entities in the same order on every run.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: Fixed,
    buckets: BTreeMap<Cell, Vec<EntityId>>,
    cells: HashMap<EntityId, Cell>,
}

impl SpatialGrid {
    /// Create an empty index with the given bucket size.
    #[must_use]
    pub fn new(cell_size: Fixed) -> Self {
        Self {
            cell_size: cell_size.max(Fixed::ONE),
            buckets: BTreeMap::new(),
            cells: HashMap::new(),
        }
    }

    fn cell_of(&self, position: Vec2Fixed) -> Cell {
        (
            (position.x / self.cell_size).floor().saturating_to_num::<i32>(),
            (position.y / self.cell_size).floor().saturating_to_num::<i32>(),
        )
    }

    /// Index an entity at a position.
    pub fn insert(&mut self, id: EntityId, position: Vec2Fixed) {
        let cell = self.cell_of(position);
        let bucket = self.buckets.entry(cell).or_default();
        if let Err(at) = bucket.binary_search(&id) {
            bucket.insert(at, id);
        }
        self.cells.insert(id, cell);
    }

    /// Drop an entity from the index.
    pub fn remove(&mut self, id: EntityId) {
        let Some(cell) = self.cells.remove(&id) else {
            return;
        };
        if let Some(bucket) = self.buckets.get_mut(&cell) {
            bucket.retain(|&other| other != id);
            if bucket.is_empty() {
                self.buckets.remove(&cell);
            }
        }
    }

    /// Move an indexed entity.
    pub fn update(&mut self, id: EntityId, position: Vec2Fixed) {
        if self.cells.get(&id) == Some(&self.cell_of(position)) {
            return;
        }
        self.remove(id);
        self.insert(id, position);
    }

    /// Whether nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Whether an id is indexed.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.cells.contains_key(&id)
    }

    /// Candidate ids whose bucket overlaps the square around `center`.
    #[must_use]
    pub fn candidates(&self, center: Vec2Fixed, radius: Fixed) -> Vec<EntityId> {
        let lo = self.cell_of(Vec2Fixed::new(
            center.x.saturating_sub(radius),
            center.y.saturating_sub(radius),
        ));
        let hi = self.cell_of(Vec2Fixed::new(
            center.x.saturating_add(radius),
            center.y.saturating_add(radius),
        ));
        let span = (i64::from(hi.0) - i64::from(lo.0) + 1) * (i64::from(hi.1) - i64::from(lo.1) + 1);

        let mut out: Vec<EntityId> = if span as usize > self.buckets.len() {
            self.buckets
                .iter()
                .filter(|(cell, _)| {
                    cell.0 >= lo.0 && cell.0 <= hi.0 && cell.1 >= lo.1 && cell.1 <= hi.1
                })
                .flat_map(|(_, ids)| ids.iter().copied())
                .collect()
        } else {
            let mut ids = Vec::new();
            for cy in lo.1..=hi.1 {
                for cx in lo.0..=hi.0 {
                    if let Some(bucket) = self.buckets.get(&(cx, cy)) {
                        ids.extend_from_slice(bucket);
                    }
                }
            }
            ids
        };
        out.sort_unstable();
        out
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Which factions a radius query accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactionFilter {
    /// Every faction.
    Any,
    /// Exactly this faction.
    Only(Faction),
    /// Everyone opposed to this faction.
    HostileTo(Faction),
}

impl FactionFilter {
    /// Whether a faction passes the filter.
    #[must_use]
    pub fn accepts(self, faction: Faction) -> bool {
        match self {
            FactionFilter::Any => true,
            FactionFilter::Only(f) => faction == f,
            FactionFilter::HostileTo(f) => faction != f,
        }
    }
}

/// Living entities whose distance from `center` lies in
/// `[radius_min, radius_max]`, filtered by faction, sorted by id.
#[must_use]
pub fn find_within_radius(
    world: &World,
    center: Vec2Fixed,
    radius_max: Fixed,
    radius_min: Fixed,
    filter: FactionFilter,
) -> Vec<EntityId> {
    if radius_max < radius_min || radius_max < Fixed::ZERO {
        return Vec::new();
    }
    let max_sq = radius_max.saturating_mul(radius_max);
    let min_sq = radius_min.max(Fixed::ZERO).saturating_mul(radius_min.max(Fixed::ZERO));

    world
        .grid()
        .candidates(center, radius_max)
        .into_iter()
        .filter(|&id| {
            world.get(id).is_some_and(|e| {
                let d_sq = e.position.distance_squared(center);
                e.alive && filter.accepts(e.faction) && d_sq >= min_sq && d_sq <= max_sq
            })
        })
        .collect()
}

/// True iff the first obstruction on the segment from `a` to `b` is `b`
/// itself, or nothing obstructs it.
///
/// Obstructions are static geometry plus living structures with a body.
/// `a` never blocks its own view. When an obstruction and `b` are touched at
/// the same ray parameter, `b` counts as first.
#[must_use]
pub fn line_of_sight(world: &World, a: EntityId, b: EntityId) -> bool {
    let (Some(source), Some(target)) = (world.get(a), world.get(b)) else {
        return false;
    };
    if !target.alive {
        return false;
    }
    if a == b {
        return true;
    }

    let from = source.position;
    let to = target.position;
    let target_t = if target.blocks_sight() {
        segment_circle_entry(from, to, to, target.body_radius).unwrap_or(Fixed::ONE)
    } else {
        Fixed::ONE
    };

    if let Some(t) = world.collision().first_static_hit(from, to) {
        if t < target_t {
            return false;
        }
    }

    !world
        .alive()
        .filter(|e| e.id != a && e.id != b && e.blocks_sight())
        .filter_map(|e| segment_circle_entry(from, to, e.position, e.body_radius))
        .any(|t| t < target_t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CombatEntity, CombatProfile, EntityKind};

    fn place(world: &mut World, kind: EntityKind, x: i32, y: i32, body: i32) -> EntityId {
        world.spawn(CombatEntity::new(
            kind,
            &CombatProfile {
                body_radius: Fixed::from_num(body),
                ..Default::default()
            },
            Vec2Fixed::from_ints(x, y),
        ))
    }

    fn enemy() -> EntityKind {
        EntityKind::SpawnedEnemy { owner: 0 }
    }

    fn tower() -> EntityKind {
        EntityKind::Tower {
            level: 0,
            active: true,
            building: false,
        }
    }

    #[test]
    fn test_radius_query_is_boundary_inclusive() {
        let mut world = World::new();
        let inner = place(&mut world, enemy(), 3, 0, 0);
        let edge = place(&mut world, enemy(), 5, 0, 0);
        let outside = place(&mut world, enemy(), 0, 6, 0);

        let found = find_within_radius(
            &world,
            Vec2Fixed::ZERO,
            Fixed::from_num(5),
            Fixed::from_num(3),
            FactionFilter::Any,
        );
        assert_eq!(found, vec![inner, edge]);
        assert!(!found.contains(&outside));
    }

    #[test]
    fn test_radius_query_filters_faction_and_dead() {
        let mut world = World::new();
        let hostile = place(&mut world, enemy(), 1, 0, 0);
        let friendly = place(&mut world, EntityKind::Turret, 2, 0, 0);
        let dead = place(&mut world, enemy(), 1, 1, 0);
        world.mark_dead(dead);

        let found = find_within_radius(
            &world,
            Vec2Fixed::ZERO,
            Fixed::from_num(10),
            Fixed::ZERO,
            FactionFilter::HostileTo(Faction::Player),
        );
        assert_eq!(found, vec![hostile]);

        let players = find_within_radius(
            &world,
            Vec2Fixed::ZERO,
            Fixed::from_num(10),
            Fixed::ZERO,
            FactionFilter::Only(Faction::Player),
        );
        assert_eq!(players, vec![friendly]);
    }

    #[test]
    fn test_segment_circle_entry() {
        let hit = segment_circle_entry(
            Vec2Fixed::ZERO,
            Vec2Fixed::from_ints(10, 0),
            Vec2Fixed::from_ints(5, 0),
            Fixed::from_num(1),
        )
        .unwrap();
        assert!((hit - Fixed::from_num(0.4)).abs() < Fixed::from_num(0.001));

        let miss = segment_circle_entry(
            Vec2Fixed::ZERO,
            Vec2Fixed::from_ints(10, 0),
            Vec2Fixed::from_ints(5, 3),
            Fixed::from_num(1),
        );
        assert!(miss.is_none());
    }

    #[test]
    fn test_structure_blocks_sight_but_units_do_not() {
        let mut world = World::new();
        let shooter = place(&mut world, EntityKind::Turret, 0, 0, 1);
        let target = place(&mut world, enemy(), 10, 0, 0);
        let _screen = place(&mut world, enemy(), 5, 0, 0);
        assert!(line_of_sight(&world, shooter, target));

        let wall = place(&mut world, tower(), 5, 0, 1);
        assert!(!line_of_sight(&world, shooter, target));

        world.mark_dead(wall);
        assert!(line_of_sight(&world, shooter, target));
    }

    #[test]
    fn test_target_structure_is_its_own_first_obstruction() {
        let mut world = World::new();
        let shooter = place(&mut world, EntityKind::Turret, 0, 0, 1);
        let target = place(&mut world, tower(), 10, 0, 2);
        assert!(line_of_sight(&world, shooter, target));
    }

    #[test]
    fn test_static_obstacle_blocks_sight() {
        let field = ObstacleField::new(vec![Obstacle {
            center: Vec2Fixed::from_ints(5, 0),
            radius: Fixed::from_num(1),
        }]);
        assert!(!field.is_walkable(Vec2Fixed::from_ints(5, 0)));
        let mut world = World::with_collision(Box::new(field));
        let shooter = place(&mut world, EntityKind::Turret, 0, 0, 0);
        let hidden = place(&mut world, enemy(), 10, 0, 0);
        let visible = place(&mut world, enemy(), 0, 10, 0);
        assert!(!line_of_sight(&world, shooter, hidden));
        assert!(line_of_sight(&world, shooter, visible));
    }

    #[test]
    fn test_grid_update_moves_bucket() {
        let mut grid = SpatialGrid::new(Fixed::from_num(4));
        grid.insert(7, Vec2Fixed::ZERO);
        grid.update(7, Vec2Fixed::from_ints(40, 40));
        assert!(grid.candidates(Vec2Fixed::ZERO, Fixed::from_num(2)).is_empty());
        assert_eq!(
            grid.candidates(Vec2Fixed::from_ints(40, 40), Fixed::from_num(2)),
            vec![7]
        );
    }
}
