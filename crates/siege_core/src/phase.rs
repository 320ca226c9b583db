//! Day cycle state machine.
//!
//! A day runs `Travel -> Active -> Retreat -> DayEnd` and then rolls over
//! into the next day's `Travel`. Travel and Retreat both last
//! `travel_time`; Active fills the rest of `day_length`. DayEnd takes no
//! time. Phases are never skipped: a large `dt`, or a forced signal, emits
//! every crossed transition in order.

use serde::{Deserialize, Serialize};

use crate::entity::Role;
use crate::error::{CoreError, Result};
use crate::math::{decimal_serde, fixed_serde, Fixed};

/// Phase of the day cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayPhase {
    /// Squads moving from home to the battlefield.
    Travel,
    /// Full combat.
    Active,
    /// Squads falling back; only skirmishes with enemies.
    Retreat,
    /// Instantaneous recovery point between days.
    DayEnd,
}

impl DayPhase {
    /// Phase that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            DayPhase::Travel => DayPhase::Active,
            DayPhase::Active => DayPhase::Retreat,
            DayPhase::Retreat => DayPhase::DayEnd,
            DayPhase::DayEnd => DayPhase::Travel,
        }
    }
}

/// Whether `attacker` may attack `defender` during `phase`.
#[must_use]
pub const fn engagement_allowed(phase: DayPhase, attacker: Role, defender: Role) -> bool {
    match phase {
        DayPhase::Travel | DayPhase::DayEnd => false,
        DayPhase::Active => matches!(
            (attacker, defender),
            (Role::Soldier | Role::Turret, Role::Tower | Role::Enemy)
                | (Role::Tower | Role::Enemy, Role::Soldier | Role::Turret)
        ),
        DayPhase::Retreat => matches!(
            (attacker, defender),
            (Role::Soldier | Role::Turret, Role::Enemy) | (Role::Enemy, Role::Soldier | Role::Turret)
        ),
    }
}

/// Timing of one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Nominal length of a whole day.
    #[serde(with = "decimal_serde")]
    pub day_length: Fixed,
    /// Length of Travel, and of Retreat.
    #[serde(with = "decimal_serde")]
    pub travel_time: Fixed,
}

impl PhaseConfig {
    /// Build a config.
    #[must_use]
    pub const fn new(day_length: Fixed, travel_time: Fixed) -> Self {
        Self {
            day_length,
            travel_time,
        }
    }

    /// Length of the Active phase.
    #[must_use]
    pub fn active_duration(&self) -> Fixed {
        self.day_length
            .saturating_sub(self.travel_time.saturating_mul(Fixed::from_num(2)))
    }

    /// Time a phase lasts when not cut short.
    #[must_use]
    pub fn duration(&self, phase: DayPhase) -> Fixed {
        match phase {
            DayPhase::Travel | DayPhase::Retreat => self.travel_time,
            DayPhase::Active => self.active_duration(),
            DayPhase::DayEnd => Fixed::ZERO,
        }
    }

    /// Reject timings that cannot form a day.
    pub fn validate(&self) -> Result<()> {
        if self.day_length <= Fixed::ZERO {
            return Err(CoreError::config("day length must be positive"));
        }
        if self.travel_time < Fixed::ZERO {
            return Err(CoreError::config("travel time must not be negative"));
        }
        if self.active_duration() <= Fixed::ZERO {
            return Err(CoreError::config(format!(
                "active duration must be positive (day {}, travel {})",
                self.day_length, self.travel_time
            )));
        }
        Ok(())
    }
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self::new(Fixed::from_num(120), Fixed::from_num(10))
    }
}

/// One crossed phase boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    /// Phase left.
    pub from: DayPhase,
    /// Phase entered.
    pub to: DayPhase,
    /// Day the transition belongs to. DayEnd -> Travel carries the new day.
    pub day: u32,
    /// Time into the day when the boundary was crossed.
    #[serde(with = "fixed_serde")]
    pub elapsed_in_day: Fixed,
}

/// Clock state of the day cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCycle {
    config: PhaseConfig,
    phase: DayPhase,
    #[serde(with = "fixed_serde")]
    elapsed_in_phase: Fixed,
    #[serde(with = "fixed_serde")]
    elapsed_in_day: Fixed,
    day: u32,
}

impl DayCycle {
    /// Start at the beginning of day 0's Travel.
    pub fn new(config: PhaseConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            phase: DayPhase::Travel,
            elapsed_in_phase: Fixed::ZERO,
            elapsed_in_day: Fixed::ZERO,
            day: 0,
        })
    }

    /// Timing in use.
    #[must_use]
    pub const fn config(&self) -> &PhaseConfig {
        &self.config
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> DayPhase {
        self.phase
    }

    /// Current day index, starting at 0.
    #[must_use]
    pub const fn day(&self) -> u32 {
        self.day
    }

    /// Time spent in the current phase.
    #[must_use]
    pub const fn elapsed_in_phase(&self) -> Fixed {
        self.elapsed_in_phase
    }

    /// Time spent in the current day.
    #[must_use]
    pub const fn elapsed_in_day(&self) -> Fixed {
        self.elapsed_in_day
    }

    fn step(&mut self) -> PhaseTransition {
        let from = self.phase;
        let to = from.next();
        let elapsed_in_day = self.elapsed_in_day;
        if to == DayPhase::Travel {
            self.day += 1;
            self.elapsed_in_day = Fixed::ZERO;
        }
        self.phase = to;
        self.elapsed_in_phase = Fixed::ZERO;
        PhaseTransition {
            from,
            to,
            day: self.day,
            elapsed_in_day,
        }
    }

    /// Advance the clock by `dt`, returning every boundary crossed in order.
    ///
    /// Reaching DayEnd always rolls straight into the next Travel.
    pub fn advance(&mut self, dt: Fixed) -> Vec<PhaseTransition> {
        let mut transitions = Vec::new();
        let mut remaining = dt.max(Fixed::ZERO);
        loop {
            if self.phase == DayPhase::DayEnd {
                transitions.push(self.step());
                continue;
            }
            let left = self.config.duration(self.phase) - self.elapsed_in_phase;
            if remaining < left {
                self.elapsed_in_phase += remaining;
                self.elapsed_in_day += remaining;
                break;
            }
            remaining -= left;
            self.elapsed_in_day += left;
            transitions.push(self.step());
        }
        transitions
    }

    /// Cut the day's combat short. Issued during Travel it passes through
    /// Active first; during Retreat or DayEnd it does nothing.
    pub fn order_retreat(&mut self) -> Vec<PhaseTransition> {
        let mut transitions = Vec::new();
        while matches!(self.phase, DayPhase::Travel | DayPhase::Active) {
            transitions.push(self.step());
        }
        transitions
    }

    /// Jump to the end of the day through every remaining phase, then start
    /// the next day's Travel.
    pub fn end_day(&mut self) -> Vec<PhaseTransition> {
        let mut transitions = Vec::new();
        loop {
            let t = self.step();
            transitions.push(t);
            if t.to == DayPhase::Travel {
                break;
            }
        }
        transitions
    }

    /// Overwrite the clock (snapshot restore).
    pub(crate) fn set_clock(
        &mut self,
        phase: DayPhase,
        day: u32,
        elapsed_in_phase: Fixed,
        elapsed_in_day: Fixed,
    ) {
        self.phase = phase;
        self.day = day;
        self.elapsed_in_phase = elapsed_in_phase;
        self.elapsed_in_day = elapsed_in_day;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle() -> DayCycle {
        // Travel 10, Active 30, Retreat 10.
        DayCycle::new(PhaseConfig::new(Fixed::from_num(50), Fixed::from_num(10))).unwrap()
    }

    fn path(transitions: &[PhaseTransition]) -> Vec<(DayPhase, DayPhase)> {
        transitions.iter().map(|t| (t.from, t.to)).collect()
    }

    #[test]
    fn test_small_steps_cross_one_boundary() {
        let mut c = cycle();
        assert!(c.advance(Fixed::from_num(9)).is_empty());
        let t = c.advance(Fixed::from_num(1));
        assert_eq!(path(&t), vec![(DayPhase::Travel, DayPhase::Active)]);
        assert_eq!(t[0].elapsed_in_day, Fixed::from_num(10));
        assert_eq!(c.elapsed_in_phase(), Fixed::ZERO);
    }

    #[test]
    fn test_large_step_emits_every_transition_in_order() {
        let mut c = cycle();
        let t = c.advance(Fixed::from_num(55));
        assert_eq!(
            path(&t),
            vec![
                (DayPhase::Travel, DayPhase::Active),
                (DayPhase::Active, DayPhase::Retreat),
                (DayPhase::Retreat, DayPhase::DayEnd),
                (DayPhase::DayEnd, DayPhase::Travel),
            ]
        );
        assert_eq!(c.day(), 1);
        assert_eq!(c.elapsed_in_day(), Fixed::from_num(5));
        assert_eq!(c.phase(), DayPhase::Travel);
    }

    #[test]
    fn test_order_retreat_from_travel_passes_active() {
        let mut c = cycle();
        c.advance(Fixed::from_num(3));
        let t = c.order_retreat();
        assert_eq!(
            path(&t),
            vec![
                (DayPhase::Travel, DayPhase::Active),
                (DayPhase::Active, DayPhase::Retreat),
            ]
        );
        assert!(c.order_retreat().is_empty());
        // Retreat still lasts the full travel time.
        assert!(c.advance(Fixed::from_num(9)).is_empty());
        assert_eq!(c.advance(Fixed::ONE).len(), 2);
    }

    #[test]
    fn test_end_day_records_short_day() {
        let mut c = cycle();
        c.advance(Fixed::from_num(20));
        let t = c.end_day();
        assert_eq!(t.len(), 3);
        let day_end = t.iter().find(|t| t.to == DayPhase::DayEnd).unwrap();
        assert_eq!(day_end.elapsed_in_day, Fixed::from_num(20));
        assert_eq!(day_end.day, 0);
        assert_eq!(t.last().unwrap().day, 1);
    }

    #[test]
    fn test_legality_matrix() {
        use Role::{Enemy, Soldier, Tower, Turret};
        for (a, b) in [(Soldier, Tower), (Tower, Soldier), (Soldier, Enemy), (Enemy, Turret)] {
            assert!(engagement_allowed(DayPhase::Active, a, b));
            assert!(!engagement_allowed(DayPhase::Travel, a, b));
            assert!(!engagement_allowed(DayPhase::DayEnd, a, b));
        }
        assert!(!engagement_allowed(DayPhase::Retreat, Soldier, Tower));
        assert!(!engagement_allowed(DayPhase::Retreat, Tower, Soldier));
        assert!(engagement_allowed(DayPhase::Retreat, Enemy, Soldier));
        assert!(!engagement_allowed(DayPhase::Active, Tower, Enemy));
        assert!(!engagement_allowed(DayPhase::Active, Soldier, Turret));
    }

    #[test]
    fn test_rejects_day_without_active_phase() {
        let bad = PhaseConfig::new(Fixed::from_num(20), Fixed::from_num(10));
        assert!(matches!(bad.validate(), Err(CoreError::InvalidConfiguration(_))));
    }
}
