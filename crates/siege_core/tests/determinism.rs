//! Replayability: identical inputs must give byte-identical event logs.

use siege_core::battle::Battle;
use siege_core::events::{BattleEvent, Outcome};
use siege_test_utils::determinism::{
    event_log_bytes, find_first_divergence, run_battle, run_parallel_battles,
    verify_battle_determinism, verify_determinism, verify_snapshot_replay, verify_snapshot_resume,
};
use siege_test_utils::fixtures::{duel, fixed, fixed_f, skirmish};

#[test]
fn test_skirmish_logs_are_byte_identical() {
    for seed in [0, 1, 42, 1234] {
        let (config, setup) = skirmish(seed);
        assert!(
            verify_battle_determinism(|| Battle::new(config, &setup).unwrap(), fixed(1), 3000),
            "seed {seed}"
        );
    }
}

#[test]
fn test_fractional_tick_delta_is_deterministic() {
    let (config, setup) = skirmish(8);
    assert_eq!(
        find_first_divergence(|| Battle::new(config, &setup).unwrap(), fixed_f(0.25), 2000),
        None
    );
}

#[test]
fn test_state_hash_determinism_over_many_runs() {
    let (config, setup) = skirmish(21);
    let result = verify_determinism(
        4,
        500,
        || Battle::new(config, &setup).unwrap(),
        |battle| {
            let _ = battle.advance_phase(fixed(1));
        },
        Battle::state_hash,
    );
    result.assert_deterministic();
}

#[test]
fn test_skirmish_exercises_every_event_kind() {
    let (config, setup) = skirmish(2);
    let mut battle = Battle::new(config, &setup).unwrap();
    battle.run_to_completion(fixed(1), 5000).unwrap();

    let has = |pred: fn(&BattleEvent) -> bool| battle.events().iter().any(|e| pred(&e.event));
    assert!(has(|e| matches!(e, BattleEvent::Shot { .. })));
    assert!(has(|e| matches!(e, BattleEvent::Spawn { .. })));
    assert!(has(|e| matches!(e, BattleEvent::Death { .. })));
    assert!(has(|e| matches!(e, BattleEvent::PhaseChanged { .. })));
    assert!(has(|e| matches!(e, BattleEvent::Terminal { .. })));
}

#[test]
fn test_event_ticks_never_go_backwards() {
    let (config, setup) = skirmish(77);
    let mut battle = Battle::new(config, &setup).unwrap();
    battle.run_to_completion(fixed(1), 3000).unwrap();
    assert!(battle.events().windows(2).all(|w| w[0].tick <= w[1].tick && w[0].time <= w[1].time));
}

#[test]
fn test_snapshot_restore_replays_identically() {
    for split in [5, 40, 130] {
        let (config, setup) = skirmish(13);
        assert!(
            verify_snapshot_replay(|| Battle::new(config, &setup).unwrap(), fixed(1), split, 3000),
            "split at {split}"
        );
    }
}

#[test]
fn test_snapshot_resumes_in_a_fresh_battle() {
    for split in [5, 40, 130] {
        let (config, setup) = skirmish(13);
        assert!(
            verify_snapshot_resume(|| Battle::new(config, &setup).unwrap(), fixed(1), split, 3000),
            "split at {split}"
        );
    }
}

#[test]
fn test_fresh_battle_rebuilds_spawned_enemies() {
    let (config, setup) = skirmish(13);
    let mut original = Battle::new(config, &setup).unwrap();
    let spawned = |battle: &Battle| {
        battle
            .events()
            .iter()
            .any(|e| matches!(e.event, BattleEvent::Spawn { .. }))
    };
    for _ in 0..100 {
        if spawned(&original) {
            break;
        }
        original.advance_phase(fixed(1)).unwrap();
    }
    assert!(spawned(&original));
    let snapshot = original.snapshot();

    let mut resumed = Battle::new(config, &setup).unwrap();
    assert!(resumed.world().len() < original.world().len());
    resumed.restore(&snapshot).unwrap();
    assert_eq!(resumed.world().len(), original.world().len());
    assert_eq!(resumed.state_hash(), original.state_hash());
    assert_eq!(resumed.event_count(), original.event_count());
    assert!(resumed.events().is_empty());

    // A snapshot with fewer squads is rejected.
    let mut foreign = snapshot;
    foreign.squads.pop();
    assert!(resumed.restore(&foreign).is_err());
}

#[test]
fn test_threaded_battles_agree() {
    let (config, setup) = skirmish(31);
    let hashes = run_parallel_battles(|| Battle::new(config, &setup).unwrap(), 4, fixed(1), 2000);
    assert_eq!(hashes.len(), 4);
    assert!(hashes.windows(2).all(|w| w[0] == w[1]));

    let mut single = Battle::new(config, &setup).unwrap();
    let _ = single.run_to_completion(fixed(1), 2000);
    assert_eq!(hashes[0], single.state_hash());
}

#[test]
fn test_duel_outcome_and_log_are_stable() {
    let (config, setup) = duel(3);
    let build = || Battle::new(config, &setup).unwrap();
    let (outcome, log) = run_battle(&build, fixed(1), 1000);
    assert_eq!(outcome, Outcome::Victory);

    let mut again = build();
    again.run_to_completion(fixed(1), 1000).unwrap();
    assert_eq!(event_log_bytes(again.events()), log);
}
