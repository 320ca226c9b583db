//! Test fixtures and helpers.
//!
//! Pre-built battle setups and stat lines for consistent testing.

use fixed::types::I32F32;
use siege_core::battle::{BattleConfig, BattleSetup, SquadSetup, TowerSetup, TurretSetup};
use siege_core::data::StatBlock;
use siege_core::entity::{RangeBands, RangeTier, TierValues};
use siege_core::math::{Fixed, Vec2Fixed};
use siege_core::phase::PhaseConfig;
use siege_core::spawn::SpawnSettings;
use siege_core::squad::PositionPolicy;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Integer position.
#[must_use]
pub fn pos(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// Stat line with the given hp, per-tier attack and defense and shot period.
#[must_use]
pub fn stats(max_hp: u32, attack: TierValues<u32>, defense: TierValues<u32>, period: i32) -> StatBlock {
    StatBlock {
        max_hp,
        attack,
        defense,
        explosive_attack: 0,
        explosive_defense: 0,
        blast_radius: Fixed::ZERO,
        shot_period: fixed(period),
        speed: Fixed::ZERO,
        body_radius: Fixed::ZERO,
    }
}

/// Squad deploying toward the nearest tower for the Short band.
#[must_use]
pub fn squad(soldiers: Vec<StatBlock>, home: Vec2Fixed) -> SquadSetup {
    SquadSetup {
        soldiers,
        preferred: RangeTier::Short,
        policy: PositionPolicy::NearestTower,
        home,
    }
}

/// Active, built tower.
#[must_use]
pub fn tower(position: Vec2Fixed, stats: StatBlock, spawn_interval: i32) -> TowerSetup {
    TowerSetup {
        position,
        stats,
        spawn_interval: fixed(spawn_interval),
        level: 0,
        active: true,
        building: false,
    }
}

/// Rules with a given travel time and day length, no healing, still enemies.
#[must_use]
pub fn rules(day_length: i32, travel_time: i32) -> BattleConfig {
    BattleConfig {
        bands: RangeBands::default(),
        phases: PhaseConfig::new(fixed(day_length), fixed(travel_time)),
        spawn: SpawnSettings {
            enemy_speed: Fixed::ZERO,
            ..SpawnSettings::default()
        },
        ..BattleConfig::default()
    }
}

/// One soldier (Short attack 20) against one tower (Short defense 5,
/// 50 hp, shot period `period`), travel time 10.
#[must_use]
pub fn duel(period: i32) -> (BattleConfig, BattleSetup) {
    let setup = BattleSetup {
        squads: vec![squad(
            vec![stats(
                1000,
                TierValues::new(20, 0, 0),
                TierValues::default(),
                period,
            )],
            pos(-40, 0),
        )],
        towers: vec![tower(
            pos(0, 0),
            stats(50, TierValues::default(), TierValues::new(5, 0, 0), period),
            10_000,
        )],
        turrets: Vec::new(),
    };
    (rules(1000, 10), setup)
}

/// A busier battle: two full squads, a turret, two towers (one explosive)
/// that spawn mobile enemies. Exercises every subsystem.
#[must_use]
pub fn skirmish(seed: u64) -> (BattleConfig, BattleSetup) {
    let rifle = stats(
        120,
        TierValues::new(14, 9, 0),
        TierValues::new(3, 2, 1),
        2,
    );
    let heavy = stats(
        200,
        TierValues::new(22, 0, 0),
        TierValues::new(6, 4, 2),
        3,
    );
    let sniper = stats(80, TierValues::new(0, 8, 18), TierValues::new(1, 1, 1), 4);

    let mut bomb_tower = stats(
        400,
        TierValues::new(12, 16, 10),
        TierValues::new(4, 4, 4),
        5,
    );
    bomb_tower.explosive_attack = 9;
    bomb_tower.blast_radius = fixed(3);
    bomb_tower.body_radius = fixed_f(1.5);

    let keep = stats(
        300,
        TierValues::new(10, 10, 6),
        TierValues::new(5, 3, 2),
        3,
    );

    let mut config = rules(120, 10);
    config.seed = seed;
    config.heal_amount = 40;
    config.firing_order.by_defense = true;
    config.spawn.enemy_speed = fixed(2);

    let setup = BattleSetup {
        squads: vec![
            squad(vec![rifle, heavy, rifle, sniper], pos(-30, -5)),
            SquadSetup {
                soldiers: vec![sniper, rifle, heavy, rifle],
                preferred: RangeTier::Mid,
                policy: PositionPolicy::WeakestTower,
                home: pos(-30, 5),
            },
        ],
        towers: vec![
            tower(pos(0, 0), bomb_tower, 20),
            tower(pos(12, 8), keep, 25),
        ],
        turrets: vec![TurretSetup {
            position: pos(-12, 0),
            stats: stats(150, TierValues::new(0, 6, 12), TierValues::splat(3), 3),
        }],
    };
    (config, setup)
}
