//! Property tests for target selection and damage resolution.

use proptest::prelude::*;
use siege_core::damage::{resolve_tier_damage, HitReport};
use siege_core::entity::{
    CombatEntity, CombatProfile, EntityId, EntityKind, Faction, RangeBands, RangeTier, TierValues,
};
use siege_core::math::Vec2Fixed;
use siege_core::spatial::{find_within_radius, line_of_sight, FactionFilter, Obstacle, ObstacleField};
use siege_core::targeting::{select_target, tier_order};
use siege_core::world::World;
use siege_test_utils::determinism::strategies::{
    arb_bands, arb_coefficients, arb_health, arb_position, arb_tier_values,
};
use siege_test_utils::fixtures::{fixed, pos};

fn soldier(profile: &CombatProfile, at: Vec2Fixed) -> CombatEntity {
    CombatEntity::new(EntityKind::Soldier { squad: 0, slot: 0 }, profile, at)
}

fn enemy(profile: &CombatProfile, at: Vec2Fixed) -> CombatEntity {
    CombatEntity::new(EntityKind::SpawnedEnemy { owner: 0 }, profile, at)
}

fn killer() -> CombatProfile {
    CombatProfile {
        attack: TierValues::splat(u32::MAX),
        ..Default::default()
    }
}

proptest! {
    #[test]
    fn damage_stays_within_target_hp(
        attack in arb_tier_values(500),
        defense in arb_tier_values(500),
        hp in arb_health(),
        tier_index in 0usize..3,
    ) {
        let tier = RangeTier::ALL[tier_index];
        let mut world = World::new();
        let a = world.spawn(soldier(&CombatProfile { attack, ..Default::default() }, pos(0, 0)));
        let t = world.spawn(enemy(&CombatProfile { max_hp: hp, defense, ..Default::default() }, pos(1, 0)));

        let hit = resolve_tier_damage(&mut world, a, t, tier);
        let after = world.get(t).unwrap().hp;
        prop_assert!(hit.damage <= hp);
        prop_assert_eq!(after, hp - hit.damage);
        prop_assert_eq!(hit.damage, attack.get(tier).saturating_sub(defense.get(tier)).min(hp));
        prop_assert_eq!(hit.killed, after == 0);
    }

    #[test]
    fn selection_respects_life_sight_and_bands(
        bands in arb_bands(),
        coeff in arb_coefficients(),
        targets in proptest::collection::vec((arb_position(), any::<bool>()), 1..24),
        wall in proptest::option::of(arb_position()),
    ) {
        let collision = ObstacleField::new(
            wall.into_iter()
                .map(|center| Obstacle { center, radius: fixed(2) })
                .collect(),
        );
        let mut world = World::with_collision(Box::new(collision));
        let source = world.spawn(soldier(&killer(), pos(0, 0)));
        let mut ids: Vec<EntityId> = Vec::new();
        for (at, _) in &targets {
            ids.push(world.spawn(enemy(&CombatProfile::default(), *at)));
        }
        for (id, (_, dead)) in ids.iter().zip(&targets) {
            if *dead {
                resolve_tier_damage(&mut world, source, *id, RangeTier::Short);
                resolve_tier_damage(&mut world, source, *id, RangeTier::Mid);
                resolve_tier_damage(&mut world, source, *id, RangeTier::Long);
            }
        }

        let order = tier_order(&coeff);
        match select_target(&world, &bands, source, &coeff) {
            Some(selection) => {
                let target = world.get(selection.target).unwrap();
                prop_assert!(target.alive);
                prop_assert_eq!(target.faction, Faction::Hostile);
                prop_assert!(coeff.get(selection.tier) > 0);
                prop_assert!(bands.contains_sq(selection.tier, selection.distance_sq));
                prop_assert!(line_of_sight(&world, source, selection.target));
                // Every tier searched before the chosen one was empty.
                for tier in order.iter().take_while(|&&t| t != selection.tier) {
                    let (min, max) = bands.band(*tier);
                    let visible = find_within_radius(&world, Vec2Fixed::ZERO, max, min, FactionFilter::HostileTo(Faction::Player))
                        .into_iter()
                        .any(|id| line_of_sight(&world, source, id));
                    prop_assert!(!visible);
                }
            }
            None => {
                for tier in order {
                    let (min, max) = bands.band(tier);
                    let visible = find_within_radius(&world, Vec2Fixed::ZERO, max, min, FactionFilter::HostileTo(Faction::Player))
                        .into_iter()
                        .any(|id| line_of_sight(&world, source, id));
                    prop_assert!(!visible);
                }
            }
        }
    }

    #[test]
    fn dead_targets_absorb_nothing(hp in arb_health(), tier_index in 0usize..3) {
        let tier = RangeTier::ALL[tier_index];
        let mut world = World::new();
        let a = world.spawn(soldier(&killer(), pos(0, 0)));
        let t = world.spawn(enemy(&CombatProfile { max_hp: hp, ..Default::default() }, pos(1, 0)));

        let first = resolve_tier_damage(&mut world, a, t, tier);
        prop_assert_eq!(first, HitReport { damage: hp, killed: true });
        for _ in 0..3 {
            prop_assert_eq!(resolve_tier_damage(&mut world, a, t, tier), HitReport::default());
            prop_assert_eq!(world.get(t).unwrap().hp, 0);
        }
    }
}

#[test]
fn equal_coefficients_fall_back_but_never_to_disabled_tier() {
    let bands = RangeBands::default();
    let coeff = TierValues::new(10, 10, 0);
    let mut world = World::new();
    let source = world.spawn(soldier(&CombatProfile::default(), pos(0, 0)));
    let far = world.spawn(enemy(&CombatProfile::default(), pos(15, 0)));

    assert_eq!(select_target(&world, &bands, source, &coeff), None);

    let mid = world.spawn(enemy(&CombatProfile::default(), pos(7, 0)));
    let picked = select_target(&world, &bands, source, &coeff).unwrap();
    assert_eq!((picked.target, picked.tier), (mid, RangeTier::Mid));

    let near = world.spawn(enemy(&CombatProfile::default(), pos(3, 0)));
    let picked = select_target(&world, &bands, source, &coeff).unwrap();
    assert_eq!((picked.target, picked.tier), (near, RangeTier::Short));
    assert_ne!(picked.target, far);
}
