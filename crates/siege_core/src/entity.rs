//! Combat participant model.
//!
//! Soldiers, turrets, towers and tower-spawned enemies share one
//! [`CombatEntity`] record. What differs between them is carried by the
//! [`EntityKind`] tag, so damage and cooldown logic is written once.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Unique identifier for entities.
pub type EntityId = u64;

/// Identifier of a squad, assigned in registration order.
pub type SquadId = u32;

// ============================================================================
// Range tiers
// ============================================================================

/// One of the three attack/defense distance bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RangeTier {
    /// Closest band, starting at distance zero.
    Short,
    /// Middle band, starting where Short ends.
    Mid,
    /// Farthest band, starting where Mid ends.
    Long,
}

impl RangeTier {
    /// All tiers in natural (near to far) order.
    pub const ALL: [RangeTier; 3] = [RangeTier::Short, RangeTier::Mid, RangeTier::Long];

    /// Position in [`RangeTier::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            RangeTier::Short => 0,
            RangeTier::Mid => 1,
            RangeTier::Long => 2,
        }
    }
}

/// One value per range tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TierValues<T> {
    /// Short-range value.
    pub short: T,
    /// Mid-range value.
    pub mid: T,
    /// Long-range value.
    pub long: T,
}

impl<T: Copy> TierValues<T> {
    /// Build from three values.
    #[must_use]
    pub const fn new(short: T, mid: T, long: T) -> Self {
        Self { short, mid, long }
    }

    /// Same value in every tier.
    #[must_use]
    pub const fn splat(value: T) -> Self {
        Self {
            short: value,
            mid: value,
            long: value,
        }
    }

    /// Value for one tier.
    #[must_use]
    pub const fn get(&self, tier: RangeTier) -> T {
        match tier {
            RangeTier::Short => self.short,
            RangeTier::Mid => self.mid,
            RangeTier::Long => self.long,
        }
    }
}

impl TierValues<u32> {
    /// Largest value across the three tiers.
    #[must_use]
    pub fn max_value(&self) -> u32 {
        self.short.max(self.mid).max(self.long)
    }
}

/// Radius configuration for the three range tiers.
///
/// Each field is the *maximum* radius of its tier; the minimum of a tier is
/// the maximum of the previous one (zero for Short). Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeBands {
    /// Outer radius of the Short band.
    #[serde(with = "crate::math::decimal_serde")]
    pub short: Fixed,
    /// Outer radius of the Mid band.
    #[serde(with = "crate::math::decimal_serde")]
    pub mid: Fixed,
    /// Outer radius of the Long band.
    #[serde(with = "crate::math::decimal_serde")]
    pub long: Fixed,
}

impl RangeBands {
    /// Build bands from three outer radii.
    #[must_use]
    pub const fn new(short: Fixed, mid: Fixed, long: Fixed) -> Self {
        Self { short, mid, long }
    }

    /// `(min, max)` radii of a tier.
    #[must_use]
    pub fn band(&self, tier: RangeTier) -> (Fixed, Fixed) {
        match tier {
            RangeTier::Short => (Fixed::ZERO, self.short),
            RangeTier::Mid => (self.short, self.mid),
            RangeTier::Long => (self.mid, self.long),
        }
    }

    /// Whether a squared distance lies inside a tier's band.
    #[must_use]
    pub fn contains_sq(&self, tier: RangeTier, distance_sq: Fixed) -> bool {
        let (min, max) = self.band(tier);
        distance_sq >= min.saturating_mul(min) && distance_sq <= max.saturating_mul(max)
    }

    /// Midpoint radius of a tier, used as a standing distance.
    #[must_use]
    pub fn midpoint(&self, tier: RangeTier) -> Fixed {
        let (min, max) = self.band(tier);
        min + (max - min) / Fixed::from_num(2)
    }

    /// Reject non-positive or non-increasing radii.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.short <= Fixed::ZERO || self.mid <= Fixed::ZERO || self.long <= Fixed::ZERO {
            return Err(crate::error::CoreError::config(
                "tier radii must all be positive",
            ));
        }
        if self.short >= self.mid || self.mid >= self.long {
            return Err(crate::error::CoreError::config(
                "tier radii must increase from Short to Long",
            ));
        }
        Ok(())
    }
}

impl Default for RangeBands {
    fn default() -> Self {
        Self::new(
            Fixed::from_num(4),
            Fixed::from_num(10),
            Fixed::from_num(18),
        )
    }
}

// ============================================================================
// Factions and kinds
// ============================================================================

/// Which side an entity fights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Faction {
    /// Squads and turrets.
    Player,
    /// Towers and the enemies they spawn.
    Hostile,
}

impl Faction {
    /// The opposing faction.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Faction::Player => Faction::Hostile,
            Faction::Hostile => Faction::Player,
        }
    }
}

/// Variant data for each kind of combat participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// Squad member.
    Soldier {
        /// Owning squad.
        squad: SquadId,
        /// Slot within the squad's firing line (0 is front).
        slot: u8,
    },
    /// Player-built stationary defense.
    Turret,
    /// Hostile stronghold.
    Tower {
        /// Upgrade level the stats were taken from.
        level: u8,
        /// Inactive towers neither shoot nor spawn.
        active: bool,
        /// Towers under construction neither shoot nor spawn.
        building: bool,
    },
    /// Enemy spawned by a tower.
    SpawnedEnemy {
        /// Tower that spawned it.
        owner: EntityId,
    },
}

/// Coarse role used by the phase legality matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Squad member.
    Soldier,
    /// Player turret.
    Turret,
    /// Hostile tower.
    Tower,
    /// Tower-spawned enemy.
    Enemy,
}

impl EntityKind {
    /// Role of this kind.
    #[must_use]
    pub const fn role(&self) -> Role {
        match self {
            EntityKind::Soldier { .. } => Role::Soldier,
            EntityKind::Turret => Role::Turret,
            EntityKind::Tower { .. } => Role::Tower,
            EntityKind::SpawnedEnemy { .. } => Role::Enemy,
        }
    }

    /// Faction implied by the kind.
    #[must_use]
    pub const fn faction(&self) -> Faction {
        match self {
            EntityKind::Soldier { .. } | EntityKind::Turret => Faction::Player,
            EntityKind::Tower { .. } | EntityKind::SpawnedEnemy { .. } => Faction::Hostile,
        }
    }

    /// Structures block line of sight when they have a body.
    #[must_use]
    pub const fn is_structure(&self) -> bool {
        matches!(self, EntityKind::Turret | EntityKind::Tower { .. })
    }

    /// Spawning tower of a spawned enemy.
    #[must_use]
    pub const fn owner(&self) -> Option<EntityId> {
        match self {
            EntityKind::SpawnedEnemy { owner } => Some(*owner),
            _ => None,
        }
    }
}

// ============================================================================
// Combat entity
// ============================================================================

/// Stats needed to instantiate a combat entity.
///
/// This is the runtime copy of a data-layer stat block; see
/// [`crate::data::StatBlock`] for the authored form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatProfile {
    /// Maximum (and starting) hit points.
    pub max_hp: u32,
    /// Per-tier attack.
    pub attack: TierValues<u32>,
    /// Per-tier defense.
    pub defense: TierValues<u32>,
    /// Area attack magnitude (0 = none).
    pub explosive_attack: u32,
    /// Area defense.
    pub explosive_defense: u32,
    /// Blast radius for area attacks.
    #[serde(with = "fixed_serde")]
    pub blast_radius: Fixed,
    /// Time between shots.
    #[serde(with = "fixed_serde")]
    pub shot_period: Fixed,
    /// Movement speed in units per time unit.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Collision radius; structures with a body block line of sight.
    #[serde(with = "fixed_serde")]
    pub body_radius: Fixed,
}

impl Default for CombatProfile {
    fn default() -> Self {
        Self {
            max_hp: 100,
            attack: TierValues::default(),
            defense: TierValues::default(),
            explosive_attack: 0,
            explosive_defense: 0,
            blast_radius: Fixed::ZERO,
            shot_period: Fixed::ONE,
            speed: Fixed::ZERO,
            body_radius: Fixed::ZERO,
        }
    }
}

/// A live (or dead) combat participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatEntity {
    /// Arena id.
    pub id: EntityId,
    /// Variant tag.
    pub kind: EntityKind,
    /// Side.
    pub faction: Faction,
    /// Current hit points.
    pub hp: u32,
    /// Maximum hit points.
    pub max_hp: u32,
    /// Per-tier attack.
    pub attack: TierValues<u32>,
    /// Area attack magnitude.
    pub explosive_attack: u32,
    /// Blast radius for area attacks.
    #[serde(with = "fixed_serde")]
    pub blast_radius: Fixed,
    /// Per-tier defense.
    pub defense: TierValues<u32>,
    /// Area defense.
    pub explosive_defense: u32,
    /// Time left until the next shot may be attempted.
    #[serde(with = "fixed_serde")]
    pub cooldown_remaining: Fixed,
    /// Cooldown after each attempt.
    #[serde(with = "fixed_serde")]
    pub shot_period: Fixed,
    /// Movement speed.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Collision radius.
    #[serde(with = "fixed_serde")]
    pub body_radius: Fixed,
    /// World position.
    pub position: Vec2Fixed,
    /// False once hp has reached zero.
    pub alive: bool,
    /// Hidden from target selection (screened soldier, squad at home).
    pub screened: bool,
}

impl CombatEntity {
    /// Create a full-health entity. The arena assigns the real id.
    #[must_use]
    pub fn new(kind: EntityKind, profile: &CombatProfile, position: Vec2Fixed) -> Self {
        Self {
            id: 0,
            kind,
            faction: kind.faction(),
            hp: profile.max_hp,
            max_hp: profile.max_hp,
            attack: profile.attack,
            explosive_attack: profile.explosive_attack,
            blast_radius: profile.blast_radius,
            defense: profile.defense,
            explosive_defense: profile.explosive_defense,
            cooldown_remaining: Fixed::ZERO,
            shot_period: profile.shot_period,
            speed: profile.speed,
            body_radius: profile.body_radius,
            position,
            alive: profile.max_hp > 0,
            screened: false,
        }
    }

    /// Role used for phase legality.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.kind.role()
    }

    /// Whether the cooldown allows an attack attempt.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cooldown_remaining <= Fixed::ZERO
    }

    /// Decrement the cooldown by `dt`, never below zero.
    pub fn tick_cooldown(&mut self, dt: Fixed) {
        self.cooldown_remaining = (self.cooldown_remaining - dt).max(Fixed::ZERO);
    }

    /// Restart the cooldown after an attack attempt.
    pub fn reset_cooldown(&mut self) {
        self.cooldown_remaining = self.shot_period;
    }

    /// Remove up to `amount` hp and return what was actually removed.
    ///
    /// Dead entities absorb nothing.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        if !self.alive {
            return 0;
        }
        let dealt = amount.min(self.hp);
        self.hp -= dealt;
        dealt
    }

    /// Restore up to `amount` hp, capped at `max_hp`. Returns hp restored.
    pub fn heal(&mut self, amount: u32) -> u32 {
        if !self.alive {
            return 0;
        }
        let restored = amount.min(self.max_hp - self.hp);
        self.hp += restored;
        restored
    }

    /// Whether this entity may shoot and spawn. Towers must be active and built.
    #[must_use]
    pub const fn is_operational(&self) -> bool {
        match self.kind {
            EntityKind::Tower {
                active, building, ..
            } => active && !building,
            _ => true,
        }
    }

    /// Whether this entity currently blocks line of sight.
    #[must_use]
    pub fn blocks_sight(&self) -> bool {
        self.alive && self.kind.is_structure() && self.body_radius > Fixed::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soldier() -> CombatEntity {
        CombatEntity::new(
            EntityKind::Soldier { squad: 0, slot: 0 },
            &CombatProfile {
                max_hp: 40,
                ..Default::default()
            },
            Vec2Fixed::ZERO,
        )
    }

    #[test]
    fn test_damage_is_clamped_to_remaining_hp() {
        let mut s = soldier();
        assert_eq!(s.apply_damage(25), 25);
        assert_eq!(s.apply_damage(25), 15);
        assert_eq!(s.hp, 0);
    }

    #[test]
    fn test_heal_caps_at_max() {
        let mut s = soldier();
        s.apply_damage(10);
        assert_eq!(s.heal(100), 10);
        assert_eq!(s.hp, s.max_hp);
    }

    #[test]
    fn test_dead_entity_ignores_damage_and_heal() {
        let mut s = soldier();
        s.alive = false;
        assert_eq!(s.apply_damage(5), 0);
        assert_eq!(s.heal(5), 0);
        assert_eq!(s.hp, 40);
    }

    #[test]
    fn test_cooldown_floors_at_zero() {
        let mut s = soldier();
        s.shot_period = Fixed::from_num(3);
        s.reset_cooldown();
        s.tick_cooldown(Fixed::from_num(2));
        assert!(!s.is_ready());
        s.tick_cooldown(Fixed::from_num(2));
        assert!(s.is_ready());
        assert_eq!(s.cooldown_remaining, Fixed::ZERO);
    }

    #[test]
    fn test_band_edges_are_inclusive() {
        let bands = RangeBands::default();
        let edge = bands.short * bands.short;
        assert!(bands.contains_sq(RangeTier::Short, edge));
        assert!(bands.contains_sq(RangeTier::Mid, edge));
        assert!(!bands.contains_sq(RangeTier::Long, edge));
    }

    #[test]
    fn test_band_validation() {
        assert!(RangeBands::default().validate().is_ok());
        let flat = RangeBands::new(Fixed::from_num(5), Fixed::from_num(5), Fixed::from_num(9));
        assert!(flat.validate().is_err());
        let negative = RangeBands::new(Fixed::from_num(-1), Fixed::from_num(5), Fixed::from_num(9));
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_kind_faction_and_role() {
        let tower = EntityKind::Tower {
            level: 1,
            active: true,
            building: false,
        };
        assert_eq!(tower.faction(), Faction::Hostile);
        assert_eq!(tower.role(), Role::Tower);
        assert!(tower.is_structure());
        assert_eq!(EntityKind::Turret.faction(), Faction::Player);
    }
}
