//! Determinism testing utilities.
//!
//! Provides a harness for verifying that battles produce identical results
//! given identical inputs.
//!
//! # Testing Strategy
//!
//! The live game and the balance harness must agree on every battle.
//! Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`siege_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   The core iterates arenas and `BTreeMap`s in id order.
//!
//! - **System randomness**: Spawn jitter comes from seeded streams only.
//!
//! Two levels of comparison are offered: the cheap [`Battle::state_hash`]
//! and a byte-exact comparison of the serialized event logs.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use siege_core::battle::Battle;
use siege_core::events::{Outcome, TimedEvent};
use siege_core::math::Fixed;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic battle).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the runs were deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Battle is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of steps per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance state by one step
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```ignore
/// use siege_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(
///     5,
///     100,
///     || build_battle(),
///     |battle| { let _ = battle.advance_phase(dt); },
///     |battle| battle.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Serialize an event log to bytes for exact comparison.
///
/// # Panics
///
/// Panics if the log cannot be encoded, which would be a bug in the event
/// types.
#[must_use]
pub fn event_log_bytes(events: &[TimedEvent]) -> Vec<u8> {
    bincode::serialize(events).expect("event log must serialize")
}

/// Run a battle to completion and return its outcome and encoded log.
///
/// # Panics
///
/// Panics if the battle reports an error while running.
pub fn run_battle<F>(setup_fn: &F, dt: Fixed, max_ticks: u64) -> (Outcome, Vec<u8>)
where
    F: Fn() -> Battle,
{
    let mut battle = setup_fn();
    let outcome = battle
        .run_to_completion(dt, max_ticks)
        .expect("battle must run");
    (outcome, event_log_bytes(battle.events()))
}

/// Run the same battle twice and compare the encoded event logs byte for
/// byte.
pub fn verify_battle_determinism<F>(setup_fn: F, dt: Fixed, max_ticks: u64) -> bool
where
    F: Fn() -> Battle,
{
    let first = run_battle(&setup_fn, dt, max_ticks);
    let second = run_battle(&setup_fn, dt, max_ticks);
    first == second
}

/// First tick at which two identically built battles disagree, if any.
pub fn find_first_divergence<F>(setup_fn: F, dt: Fixed, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Battle,
{
    let mut a = setup_fn();
    let mut b = setup_fn();

    if a.state_hash() != b.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        let ra = a.advance_phase(dt).map(|e| event_log_bytes(&e));
        let rb = b.advance_phase(dt).map(|e| event_log_bytes(&e));
        match (ra, rb) {
            (Ok(ea), Ok(eb)) if ea == eb && a.state_hash() == b.state_hash() => {}
            (Err(_), Err(_)) => return None,
            _ => return Some(tick),
        }
    }

    None
}

/// Run `num_battles` copies on separate threads and collect final hashes.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn run_parallel_battles<F>(setup_fn: F, num_battles: usize, dt: Fixed, max_ticks: u64) -> Vec<u64>
where
    F: Fn() -> Battle + Sync,
{
    thread::scope(|s| {
        let handles: Vec<_> = (0..num_battles)
            .map(|_| {
                s.spawn(|| {
                    let mut battle = setup_fn();
                    let _ = battle.run_to_completion(dt, max_ticks);
                    battle.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("battle thread panicked"))
            .collect()
    })
}

/// Snapshot midway, keep running, restore, run again: both continuations
/// must produce the same log suffix.
///
/// # Panics
///
/// Panics if the battle or the restore reports an error.
pub fn verify_snapshot_replay<F>(setup_fn: F, dt: Fixed, split_at: u64, max_ticks: u64) -> bool
where
    F: Fn() -> Battle,
{
    let mut battle = setup_fn();
    for _ in 0..split_at {
        if battle.outcome().is_some() {
            break;
        }
        battle.advance_phase(dt).expect("battle must run");
    }
    let snapshot = battle.snapshot();
    let encoded = bincode::serialize(&snapshot).expect("snapshot must serialize");
    let hash_at_split = battle.state_hash();

    let _ = battle.run_to_completion(dt, max_ticks);
    let first = event_log_bytes(battle.events());

    let decoded = bincode::deserialize(&encoded).expect("snapshot must deserialize");
    battle.restore(&decoded).expect("restore must succeed");
    if battle.state_hash() != hash_at_split {
        return false;
    }
    let _ = battle.run_to_completion(dt, max_ticks);
    first == event_log_bytes(battle.events())
}

/// Snapshot midway, serialize it, restore it into a freshly built battle and
/// run both to the end: the fresh battle must reproduce the original log
/// from the snapshot point on.
///
/// # Panics
///
/// Panics if the battle or the restore reports an error.
pub fn verify_snapshot_resume<F>(setup_fn: F, dt: Fixed, split_at: u64, max_ticks: u64) -> bool
where
    F: Fn() -> Battle,
{
    let mut original = setup_fn();
    for _ in 0..split_at {
        if original.outcome().is_some() {
            break;
        }
        original.advance_phase(dt).expect("battle must run");
    }
    let encoded = bincode::serialize(&original.snapshot()).expect("snapshot must serialize");
    let hash_at_split = original.state_hash();
    let split_point = original.event_count();
    let _ = original.run_to_completion(dt, max_ticks);

    let mut resumed = setup_fn();
    let decoded = bincode::deserialize(&encoded).expect("snapshot must deserialize");
    resumed.restore(&decoded).expect("restore must succeed");
    if resumed.state_hash() != hash_at_split || resumed.event_count() != split_point {
        return false;
    }
    let _ = resumed.run_to_completion(dt, max_ticks);
    resumed.event_count() == original.event_count()
        && event_log_bytes(resumed.events()) == event_log_bytes(&original.events()[split_point..])
}

/// Compute a hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for combat inputs.
pub mod strategies {
    use proptest::prelude::*;
    use siege_core::data::StatBlock;
    use siege_core::entity::{RangeBands, TierValues};
    use siege_core::math::{Fixed, Vec2Fixed};
    use siege_core::targeting::Coefficients;

    /// Generate a coordinate in a modest battlefield.
    pub fn arb_coordinate() -> impl Strategy<Value = Fixed> {
        (-40i32..40i32).prop_map(Fixed::from_num)
    }

    /// Generate a position on the battlefield.
    pub fn arb_position() -> impl Strategy<Value = Vec2Fixed> {
        (arb_coordinate(), arb_coordinate()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Generate per-tier values up to `max`.
    pub fn arb_tier_values(max: u32) -> impl Strategy<Value = TierValues<u32>> {
        (0..=max, 0..=max, 0..=max).prop_map(|(s, m, l)| TierValues::new(s, m, l))
    }

    /// Generate selection coefficients, including disabled tiers.
    pub fn arb_coefficients() -> impl Strategy<Value = Coefficients> {
        (-3i64..6, -3i64..6, -3i64..6).prop_map(|(s, m, l)| TierValues::new(s, m, l))
    }

    /// Generate valid, strictly increasing tier radii.
    pub fn arb_bands() -> impl Strategy<Value = RangeBands> {
        (1i32..6, 1i32..8, 1i32..10).prop_map(|(a, b, c)| {
            RangeBands::new(
                Fixed::from_num(a),
                Fixed::from_num(a + b),
                Fixed::from_num(a + b + c),
            )
        })
    }

    /// Generate health values (1-1000).
    pub fn arb_health() -> impl Strategy<Value = u32> {
        1u32..1000u32
    }

    /// Generate a valid stat line.
    pub fn arb_stat_block() -> impl Strategy<Value = StatBlock> {
        (arb_health(), arb_tier_values(60), arb_tier_values(30), 1i32..5).prop_map(
            |(max_hp, attack, defense, period)| StatBlock {
                max_hp,
                attack,
                defense,
                explosive_attack: 0,
                explosive_defense: 0,
                blast_radius: Fixed::ZERO,
                shot_period: Fixed::from_num(period),
                speed: Fixed::ZERO,
                body_radius: Fixed::ZERO,
            },
        )
    }
}
