//! Entity arena for one battle.
//!
//! Entities live in a flat vector indexed by id. Ids are handed out
//! sequentially from 1 and never reused, so iteration in storage order is
//! iteration in id order and needs no sorting. Dead entities stay in the
//! arena (their final state is still reportable) but are dropped from the
//! spatial index at the instant they die.

use crate::entity::{CombatEntity, EntityId, Faction, Role};
use crate::math::{Fixed, Vec2Fixed};
use crate::spatial::{CollisionProvider, OpenField, SpatialGrid};

/// Default bucket size of the spatial index.
pub const DEFAULT_INDEX_CELL: i32 = 8;

/// Arena of combat entities plus the indices queries need.
#[derive(Debug)]
pub struct World {
    entities: Vec<CombatEntity>,
    grid: SpatialGrid,
    collision: Box<dyn CollisionProvider>,
}

impl World {
    /// Create an empty world over open terrain.
    #[must_use]
    pub fn new() -> Self {
        Self::with_collision(Box::new(OpenField))
    }

    /// Create an empty world using an external collision provider.
    #[must_use]
    pub fn with_collision(collision: Box<dyn CollisionProvider>) -> Self {
        Self {
            entities: Vec::new(),
            grid: SpatialGrid::new(Fixed::from_num(DEFAULT_INDEX_CELL)),
            collision,
        }
    }

    /// Insert an entity and return its id.
    pub fn spawn(&mut self, mut entity: CombatEntity) -> EntityId {
        let id = self.entities.len() as EntityId + 1;
        entity.id = id;
        if entity.alive {
            self.grid.insert(id, entity.position);
        }
        self.entities.push(entity);
        id
    }

    /// Get an entity by id, dead or alive.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&CombatEntity> {
        let index = usize::try_from(id.checked_sub(1)?).ok()?;
        self.entities.get(index)
    }

    /// Mutable access for damage, heal and cooldown updates.
    ///
    /// Position changes must go through [`World::move_entity`] so the index
    /// stays in sync.
    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut CombatEntity> {
        let index = usize::try_from(id.checked_sub(1)?).ok()?;
        self.entities.get_mut(index)
    }

    /// Whether the id refers to a living entity.
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.get(id).is_some_and(|e| e.alive)
    }

    /// Relocate an entity, keeping the spatial index current.
    pub fn move_entity(&mut self, id: EntityId, position: Vec2Fixed) {
        let Some(entity) = self.get_mut(id) else {
            return;
        };
        entity.position = position;
        if entity.alive {
            self.grid.update(id, position);
        }
    }

    /// Mark an entity dead and drop it from every index.
    ///
    /// Returns `false` if it was already dead, so callers can fire the
    /// death notification exactly once.
    pub(crate) fn mark_dead(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.get_mut(id) else {
            return false;
        };
        if !entity.alive {
            return false;
        }
        entity.alive = false;
        entity.hp = 0;
        self.grid.remove(id);
        true
    }

    /// Restore a dead entity (snapshot restore only).
    pub(crate) fn revive(&mut self, id: EntityId) {
        let Some(entity) = self.get_mut(id) else {
            return;
        };
        if entity.alive {
            return;
        }
        entity.alive = true;
        let position = entity.position;
        self.grid.insert(id, position);
    }

    /// Drop every entity with an id above `len` (snapshot restore only).
    pub(crate) fn truncate(&mut self, len: usize) {
        for entity in self.entities.iter().skip(len) {
            self.grid.remove(entity.id);
        }
        self.entities.truncate(len);
    }

    /// Iterate over every entity in id order.
    pub fn iter(&self) -> impl Iterator<Item = &CombatEntity> {
        self.entities.iter()
    }

    /// Iterate over living entities in id order.
    pub fn alive(&self) -> impl Iterator<Item = &CombatEntity> {
        self.entities.iter().filter(|e| e.alive)
    }

    /// Living entities with a given role, in id order.
    pub fn alive_with_role(&self, role: Role) -> impl Iterator<Item = &CombatEntity> {
        self.alive().filter(move |e| e.role() == role)
    }

    /// Number of living entities of a faction.
    #[must_use]
    pub fn alive_count(&self, faction: Faction) -> usize {
        self.alive().filter(|e| e.faction == faction).count()
    }

    /// Decrement every living entity's cooldown.
    pub(crate) fn tick_cooldowns(&mut self, dt: Fixed) {
        for entity in self.entities.iter_mut().filter(|e| e.alive) {
            entity.tick_cooldown(dt);
        }
    }

    /// Total number of entities ever spawned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True if nothing was ever spawned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub(crate) fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    /// Collision provider backing line-of-sight and walkability.
    #[must_use]
    pub fn collision(&self) -> &dyn CollisionProvider {
        self.collision.as_ref()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CombatProfile, EntityKind};

    fn turret_at(x: i32, y: i32) -> CombatEntity {
        CombatEntity::new(
            EntityKind::Turret,
            &CombatProfile::default(),
            Vec2Fixed::from_ints(x, y),
        )
    }

    #[test]
    fn test_ids_are_sequential_from_one() {
        let mut world = World::new();
        assert_eq!(world.spawn(turret_at(0, 0)), 1);
        assert_eq!(world.spawn(turret_at(1, 0)), 2);
        assert_eq!(world.get(2).unwrap().position, Vec2Fixed::from_ints(1, 0));
        assert!(world.get(0).is_none());
        assert!(world.get(3).is_none());
    }

    #[test]
    fn test_mark_dead_is_one_shot() {
        let mut world = World::new();
        let id = world.spawn(turret_at(0, 0));
        assert!(world.mark_dead(id));
        assert!(!world.mark_dead(id));
        assert!(!world.is_alive(id));
        assert!(world.grid().is_empty());
    }
}
