//! Battle driver.
//!
//! [`Battle`] owns everything one fight needs: the entity arena, squads,
//! the day clock, target locks, spawn timers, the event log and observers.
//! Nothing is global, so independent battles can run side by side.
//!
//! # Tick order
//!
//! Each [`Battle::advance_phase`] call runs, in this order:
//! 1. **Cooldowns** - every living entity's cooldown drops by `dt`.
//! 2. **Clock** - the day cycle advances; crossed transitions are applied
//!    (Travel deploys squads, Active arms soldiers, Retreat and DayEnd drop
//!    locks, DayEnd heals and resets the day's counters).
//! 3. **Exposure** - each engaged squad exposes only its front soldier.
//! 4. **Combat** - every ready attacker validates or picks its target
//!    against the world as it stood before any shot; then attacks commit in
//!    fixed order (squads and their lines, turrets, towers, enemies). A
//!    target that died earlier in the same tick is skipped silently and the
//!    attacker keeps its cooldown. Terminal conditions are checked after
//!    every committed attack.
//! 5. **Chase** - enemies close in on their targets up to the Short band.
//! 6. **Spawning** - tower timers run (Active only) and expired ones spawn.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::damage::{resolve_explosive, resolve_tier_damage};
use crate::data::StatBlock;
use crate::entity::{CombatEntity, EntityId, EntityKind, RangeBands, RangeTier, Role, SquadId};
use crate::error::{CoreError, Result};
use crate::events::{
    BattleEvent, BattleObserver, DayCounters, DaySummary, ObserverId, ObserverRegistry, Outcome,
    TimedEvent,
};
use crate::math::{decimal_serde, decimal_vec_serde, Fixed, Vec2Fixed};
use crate::phase::{engagement_allowed, DayCycle, DayPhase, PhaseConfig, PhaseTransition};
use crate::snapshot::{BattleSnapshot, EntitySnapshot, SquadSnapshot};
use crate::spatial::{CollisionProvider, OpenField};
use crate::spawn::{reserve_cell, spawn_enemy, spawned_profile, SpawnController, SpawnSettings};
use crate::squad::{deployment_point, pick_tower, FiringOrder, PositionPolicy, Squad, MAX_SQUAD_SIZE};
use crate::targeting::{
    coefficients_from, lock_holds, select_target_where, Coefficients, TargetLock, TargetLocks,
};
use crate::world::World;

// ============================================================================
// Configuration
// ============================================================================

/// Rules of a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleConfig {
    /// Tier radii.
    #[serde(default)]
    pub bands: RangeBands,
    /// Day timing.
    #[serde(default)]
    pub phases: PhaseConfig,
    /// Hp restored to each resting soldier at day end.
    #[serde(default)]
    pub heal_amount: u32,
    /// Day-start firing line order.
    #[serde(default)]
    pub firing_order: FiringOrder,
    /// Spawn settings.
    #[serde(default)]
    pub spawn: SpawnSettings,
    /// Seed for every random stream of the battle.
    #[serde(default)]
    pub seed: u64,
}

impl BattleConfig {
    /// Reject rules a battle cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.bands.validate()?;
        self.phases.validate()?;
        self.spawn.validate()
    }
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            bands: RangeBands::default(),
            phases: PhaseConfig::default(),
            heal_amount: 0,
            firing_order: FiringOrder::default(),
            spawn: SpawnSettings::default(),
            seed: 0,
        }
    }
}

/// One squad to field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadSetup {
    /// Soldier stats in registration order.
    pub soldiers: Vec<StatBlock>,
    /// Tier the squad positions itself for.
    #[serde(default = "default_preferred")]
    pub preferred: RangeTier,
    /// Deployment policy.
    #[serde(default)]
    pub policy: PositionPolicy,
    /// Home position.
    #[serde(with = "decimal_vec_serde")]
    pub home: Vec2Fixed,
}

const fn default_preferred() -> RangeTier {
    RangeTier::Short
}

/// One tower to place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TowerSetup {
    /// Position.
    #[serde(with = "decimal_vec_serde")]
    pub position: Vec2Fixed,
    /// Stats of the tower's level.
    pub stats: StatBlock,
    /// Mean time between spawn attempts.
    #[serde(with = "decimal_serde")]
    pub spawn_interval: Fixed,
    /// Level the stats were taken from.
    #[serde(default)]
    pub level: u8,
    /// Active towers shoot and spawn.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Towers under construction do neither.
    #[serde(default)]
    pub building: bool,
}

const fn default_true() -> bool {
    true
}

/// One turret to place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurretSetup {
    /// Position.
    #[serde(with = "decimal_vec_serde")]
    pub position: Vec2Fixed,
    /// Stats.
    pub stats: StatBlock,
}

/// Participants of a battle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleSetup {
    /// Squads in registration order.
    pub squads: Vec<SquadSetup>,
    /// Towers.
    pub towers: Vec<TowerSetup>,
    /// Player turrets.
    #[serde(default)]
    pub turrets: Vec<TurretSetup>,
}

// ============================================================================
// Battle
// ============================================================================

/// One self-contained battle.
#[derive(Debug)]
pub struct Battle {
    config: BattleConfig,
    world: World,
    squads: Vec<Squad>,
    cycle: DayCycle,
    locks: TargetLocks,
    spawners: Vec<SpawnController>,
    counters: DayCounters,
    events: Vec<TimedEvent>,
    /// Events emitted before `events[0]`; non-zero after resuming.
    log_base: usize,
    observers: ObserverRegistry,
    tick: u64,
    time: Fixed,
    outcome: Option<Outcome>,
}

impl Battle {
    /// Build a battle over open terrain.
    pub fn new(config: BattleConfig, setup: &BattleSetup) -> Result<Self> {
        Self::with_collision(config, setup, Box::new(OpenField))
    }

    /// Build a battle over host-supplied terrain.
    ///
    /// Everything is validated up front; a battle that builds will run.
    pub fn with_collision(
        config: BattleConfig,
        setup: &BattleSetup,
        collision: Box<dyn CollisionProvider>,
    ) -> Result<Self> {
        config.validate()?;
        if setup.squads.is_empty() {
            return Err(CoreError::config("a battle needs at least one squad"));
        }
        if setup.towers.is_empty() {
            return Err(CoreError::config("a battle needs at least one tower"));
        }

        let mut world = World::with_collision(collision);
        let mut squads = Vec::with_capacity(setup.squads.len());

        for (index, squad) in setup.squads.iter().enumerate() {
            let squad_id = SquadId::try_from(index)
                .map_err(|_| CoreError::config("too many squads"))?;
            if squad.soldiers.is_empty() || squad.soldiers.len() > MAX_SQUAD_SIZE {
                return Err(CoreError::config(format!(
                    "squad {squad_id} has {} soldiers, expected 1..={MAX_SQUAD_SIZE}",
                    squad.soldiers.len()
                )));
            }
            let mut line = Vec::with_capacity(squad.soldiers.len());
            for (slot, stats) in squad.soldiers.iter().enumerate() {
                stats.validate(&format!("squad {squad_id} soldier {slot}"))?;
                let kind = EntityKind::Soldier {
                    squad: squad_id,
                    slot: slot as u8,
                };
                line.push(world.spawn(CombatEntity::new(kind, &stats.to_profile(), squad.home)));
            }
            squads.push(Squad::new(
                squad_id,
                line,
                squad.preferred,
                squad.policy,
                squad.home,
            ));
        }

        for (index, turret) in setup.turrets.iter().enumerate() {
            turret.stats.validate(&format!("turret {index}"))?;
            world.spawn(CombatEntity::new(
                EntityKind::Turret,
                &turret.stats.to_profile(),
                turret.position,
            ));
        }

        let mut spawners = Vec::with_capacity(setup.towers.len());
        for (index, tower) in setup.towers.iter().enumerate() {
            tower.stats.validate(&format!("tower {index}"))?;
            let kind = EntityKind::Tower {
                level: tower.level,
                active: tower.active,
                building: tower.building,
            };
            let id = world.spawn(CombatEntity::new(kind, &tower.stats.to_profile(), tower.position));
            spawners.push(SpawnController::new(
                id,
                tower.spawn_interval,
                config.spawn.jitter,
                config.seed,
            )?);
        }

        let mut battle = Self {
            config,
            world,
            squads,
            cycle: DayCycle::new(config.phases)?,
            locks: TargetLocks::new(),
            spawners,
            counters: DayCounters::default(),
            events: Vec::new(),
            log_base: 0,
            observers: ObserverRegistry::default(),
            tick: 0,
            time: Fixed::ZERO,
            outcome: None,
        };
        battle.begin_day();
        battle.update_exposure();
        tracing::debug!(
            squads = battle.squads.len(),
            entities = battle.world.len(),
            seed = config.seed,
            "battle created"
        );
        Ok(battle)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Rules in use.
    #[must_use]
    pub const fn config(&self) -> &BattleConfig {
        &self.config
    }

    /// Entity arena.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Squads in registration order.
    #[must_use]
    pub fn squads(&self) -> &[Squad] {
        &self.squads
    }

    /// Day clock.
    #[must_use]
    pub const fn cycle(&self) -> &DayCycle {
        &self.cycle
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> DayPhase {
        self.cycle.phase()
    }

    /// Current day.
    #[must_use]
    pub const fn day(&self) -> u32 {
        self.cycle.day()
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Battle time.
    #[must_use]
    pub const fn time(&self) -> Fixed {
        self.time
    }

    /// Outcome once the battle has ended.
    #[must_use]
    pub const fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Event log. A battle resumed from a snapshot holds only the events
    /// emitted since.
    #[must_use]
    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    /// Events emitted over the whole battle, including any before a resume.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.log_base + self.events.len()
    }

    /// Target locks.
    #[must_use]
    pub const fn locks(&self) -> &TargetLocks {
        &self.locks
    }

    /// Counters of the running day.
    #[must_use]
    pub const fn counters(&self) -> DayCounters {
        self.counters
    }

    /// Spawn timers in tower id order.
    #[must_use]
    pub fn spawners(&self) -> &[SpawnController] {
        &self.spawners
    }

    /// Register an observer.
    pub fn subscribe(&mut self, observer: Box<dyn BattleObserver>) -> ObserverId {
        self.observers.subscribe(observer)
    }

    /// Remove an observer.
    pub fn unsubscribe(&mut self, id: ObserverId) -> Option<Box<dyn BattleObserver>> {
        self.observers.unsubscribe(id)
    }

    // ------------------------------------------------------------------
    // Driving
    // ------------------------------------------------------------------

    fn ensure_running(&self) -> Result<()> {
        match self.outcome {
            Some(outcome) => Err(CoreError::InvalidState(format!(
                "battle already ended ({outcome:?})"
            ))),
            None => Ok(()),
        }
    }

    fn push(&mut self, event: BattleEvent) {
        self.events.push(TimedEvent {
            tick: self.tick,
            time: self.time,
            event,
        });
    }

    /// Advance the battle by `dt`. Returns the events produced.
    pub fn advance_phase(&mut self, dt: Fixed) -> Result<Vec<TimedEvent>> {
        self.ensure_running()?;
        if dt <= Fixed::ZERO {
            return Err(CoreError::config("tick delta must be positive"));
        }
        let start = self.events.len();
        self.tick += 1;
        self.time = self.time.saturating_add(dt);

        // 1. Cooldowns
        self.world.tick_cooldowns(dt);

        // 2. Clock
        let transitions = self.cycle.advance(dt);
        self.apply_transitions(&transitions, false);

        // 3. Exposure
        self.update_exposure();

        // 4. Combat
        if !self.resolve_combat() {
            // 5. Chase
            self.chase(dt);
            // 6. Spawning
            self.run_spawners(dt);
        }

        Ok(self.events[start..].to_vec())
    }

    /// Run until the battle ends or `max_ticks` ticks have run.
    pub fn run_to_completion(&mut self, dt: Fixed, max_ticks: u64) -> Result<Outcome> {
        if max_ticks == 0 {
            return Err(CoreError::config("max ticks must be positive"));
        }
        if let Some(outcome) = self.outcome {
            return Ok(outcome);
        }
        for _ in 0..max_ticks {
            self.advance_phase(dt)?;
            if let Some(outcome) = self.outcome {
                return Ok(outcome);
            }
        }
        tracing::info!(ticks = self.tick, "battle hit the tick limit");
        self.finish(Outcome::NoTermination);
        Ok(Outcome::NoTermination)
    }

    /// Cut the day's combat short and fall back.
    pub fn order_retreat(&mut self) -> Result<Vec<TimedEvent>> {
        self.ensure_running()?;
        let start = self.events.len();
        let transitions = self.cycle.order_retreat();
        self.apply_transitions(&transitions, true);
        self.update_exposure();
        Ok(self.events[start..].to_vec())
    }

    /// End the day now and start the next one.
    pub fn end_day(&mut self) -> Result<Vec<TimedEvent>> {
        self.ensure_running()?;
        let start = self.events.len();
        let transitions = self.cycle.end_day();
        self.apply_transitions(&transitions, true);
        self.update_exposure();
        Ok(self.events[start..].to_vec())
    }

    /// Make `tower` try to spawn one enemy now, outside its timer.
    ///
    /// `Ok(None)` when the tower cannot act or has no free cell.
    pub fn attempt_spawn(&mut self, tower: EntityId) -> Result<Option<EntityId>> {
        self.ensure_running()?;
        match self.world.get(tower) {
            Some(entity) if matches!(entity.kind, EntityKind::Tower { .. }) => {}
            _ => return Err(CoreError::EntityNotFound(tower)),
        }
        Ok(self.spawn_from(tower))
    }

    /// Switch a tower on or off, or mark it under construction.
    pub fn set_tower_state(&mut self, tower: EntityId, active: bool, building: bool) -> Result<()> {
        let entity = self
            .world
            .get_mut(tower)
            .ok_or(CoreError::EntityNotFound(tower))?;
        match &mut entity.kind {
            EntityKind::Tower {
                active: a,
                building: b,
                ..
            } => {
                *a = active;
                *b = building;
                Ok(())
            }
            _ => Err(CoreError::InvalidState(format!("entity {tower} is not a tower"))),
        }
    }

    // ------------------------------------------------------------------
    // Phase effects
    // ------------------------------------------------------------------

    fn apply_transitions(&mut self, transitions: &[PhaseTransition], forced: bool) {
        for transition in transitions {
            tracing::debug!(
                from = ?transition.from,
                to = ?transition.to,
                day = transition.day,
                forced,
                "phase transition"
            );
            self.push(BattleEvent::PhaseChanged {
                from: transition.from,
                to: transition.to,
                day: transition.day,
            });
            self.observers.phase_changed(transition);

            match transition.to {
                DayPhase::Travel => self.begin_day(),
                DayPhase::Active => self.arm_soldiers(),
                DayPhase::Retreat => self.locks.clear(),
                DayPhase::DayEnd => {
                    self.locks.clear();
                    self.finish_day(transition, forced);
                }
            }
        }
    }

    /// Sort firing lines and send squads out.
    ///
    /// Squads are placed at their deployment point at once; Travel is only
    /// a timer and no soldier stands at an intermediate position.
    fn begin_day(&mut self) {
        let order = self.config.firing_order;
        for squad in &mut self.squads {
            squad.sort_line(&self.world, order);
            let destination = if squad.has_survivors(&self.world) {
                pick_tower(&self.world, squad.home, squad.policy)
                    .and_then(|t| self.world.get(t))
                    .map(|t| deployment_point(&self.config.bands, t.position, squad.home, squad.preferred))
            } else {
                None
            };
            squad.engaged = destination.is_some();
            squad.deployed_at = destination;
            let position = destination.unwrap_or(squad.home);
            for &soldier in &squad.line {
                self.world.move_entity(soldier, position);
            }
        }
    }

    /// Soldiers open fire one full shot period after arriving.
    fn arm_soldiers(&mut self) {
        for squad in self.squads.iter().filter(|s| s.engaged) {
            for &soldier in &squad.line {
                if let Some(entity) = self.world.get_mut(soldier).filter(|e| e.alive) {
                    entity.reset_cooldown();
                }
            }
        }
    }

    fn return_home(&mut self) {
        for squad in &mut self.squads {
            squad.engaged = false;
            squad.deployed_at = None;
            for &soldier in &squad.line {
                self.world.move_entity(soldier, squad.home);
            }
        }
    }

    /// Heal resting soldiers, report the day and reset its counters.
    ///
    /// A retreat that ran its course brings squads home before the heal; a
    /// forced day end heals only those already home.
    fn finish_day(&mut self, transition: &PhaseTransition, forced: bool) {
        if !forced {
            self.return_home();
        }

        let amount = prorated_heal(
            self.config.heal_amount,
            transition.elapsed_in_day,
            self.config.phases.day_length,
        );
        let mut healed = 0u32;
        for squad in self.squads.iter().filter(|s| !s.engaged) {
            for &soldier in &squad.line {
                if let Some(entity) = self.world.get_mut(soldier) {
                    healed = healed.saturating_add(entity.heal(amount));
                }
            }
        }

        if forced {
            self.return_home();
        }

        let summary = DaySummary {
            day: transition.day,
            healed,
            counters: self.counters,
        };
        tracing::debug!(day = summary.day, healed, kills = summary.counters.kills, "day ended");
        self.push(BattleEvent::DayEnded {
            day: summary.day,
            healed,
            counters: summary.counters,
        });
        self.observers.day_ended(&summary);

        self.counters = DayCounters::default();
        for spawner in &mut self.spawners {
            spawner.redraw();
        }
    }

    /// Only the front soldier of an engaged squad can be targeted.
    fn update_exposure(&mut self) {
        for squad in &self.squads {
            let front = if squad.engaged {
                squad.front(&self.world)
            } else {
                None
            };
            for &soldier in &squad.line {
                if let Some(entity) = self.world.get_mut(soldier) {
                    entity.screened = Some(soldier) != front;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Combat
    // ------------------------------------------------------------------

    /// Attackers in commit order.
    fn attack_order(&self) -> Vec<EntityId> {
        let mut order: Vec<EntityId> = self
            .squads
            .iter()
            .filter(|s| s.engaged)
            .flat_map(|s| s.line.iter().copied())
            .collect();
        for role in [Role::Turret, Role::Tower, Role::Enemy] {
            order.extend(self.world.alive_with_role(role).map(|e| e.id));
        }
        order
    }

    /// Select against the pre-combat world, then commit. Returns true if the
    /// battle ended.
    fn resolve_combat(&mut self) -> bool {
        let phase = self.cycle.phase();
        if matches!(phase, DayPhase::Travel | DayPhase::DayEnd) {
            return false;
        }
        let bands = self.config.bands;

        let mut planned: Vec<(EntityId, TargetLock)> = Vec::new();
        for id in self.attack_order() {
            let Some(attacker) = self.world.get(id) else {
                continue;
            };
            if !attacker.alive || !attacker.is_operational() || !attacker.is_ready() {
                continue;
            }
            let role = attacker.role();
            let accept = move |t: &CombatEntity| engagement_allowed(phase, role, t.role());
            let lock = match self.locks.get(id) {
                Some(lock) if lock_holds(&self.world, &bands, id, lock, accept) => Some(lock),
                _ => select_target_where(
                    &self.world,
                    &bands,
                    id,
                    &coefficients_from(attacker.attack),
                    accept,
                )
                .map(TargetLock::from),
            };
            match lock {
                Some(lock) => {
                    self.locks.set(id, lock);
                    planned.push((id, lock));
                }
                None => self.locks.release(id),
            }
        }

        for (attacker, lock) in planned {
            if !self.world.is_alive(attacker) {
                continue;
            }
            if !self.world.is_alive(lock.target) {
                self.locks.release(attacker);
                continue;
            }
            self.commit_attack(attacker, lock);
            if self.check_terminal() {
                return true;
            }
        }
        false
    }

    fn commit_attack(&mut self, attacker: EntityId, lock: TargetLock) {
        let hit = resolve_tier_damage(&mut self.world, attacker, lock.target, lock.tier);
        let blast = self.world.get_mut(attacker).map(|a| {
            a.reset_cooldown();
            (a.explosive_attack, a.blast_radius)
        });

        self.counters.shots += 1;
        self.counters.damage_dealt += u64::from(hit.damage);
        tracing::trace!(
            attacker,
            target = lock.target,
            tier = ?lock.tier,
            damage = hit.damage,
            "shot"
        );
        self.push(BattleEvent::Shot {
            attacker,
            target: lock.target,
            tier: lock.tier,
            damage: hit.damage,
        });
        if hit.killed {
            self.record_death(lock.target, Some(attacker));
        }

        if let Some((explosive, radius)) = blast {
            if explosive > 0 && radius > Fixed::ZERO {
                let Some(center) = self.world.get(lock.target).map(|t| t.position) else {
                    return;
                };
                let report = resolve_explosive(&mut self.world, attacker, center, radius);
                self.counters.damage_dealt += u64::from(report.total_damage());
                self.push(BattleEvent::Explosion {
                    attacker,
                    center,
                    hits: report.hits.clone(),
                });
                for victim in report.killed {
                    self.record_death(victim, Some(attacker));
                }
            }
        }
    }

    fn record_death(&mut self, entity: EntityId, killer: Option<EntityId>) {
        self.counters.kills += 1;
        self.locks.invalidate_target(entity);
        tracing::debug!(entity, killer = ?killer, "entity destroyed");
        self.push(BattleEvent::Death { entity, killer });
        let Some(dead) = self.world.get(entity) else {
            return;
        };
        self.observers.entity_destroyed(dead, killer);
        if dead.role() == Role::Soldier {
            // Next soldier in line steps up.
            self.update_exposure();
        }
    }

    /// Towers first: a blast that clears both sides is a victory.
    fn check_terminal(&mut self) -> bool {
        let outcome = if self.world.alive_with_role(Role::Tower).next().is_none() {
            Outcome::Victory
        } else if self.world.alive_with_role(Role::Soldier).next().is_none() {
            Outcome::Defeat
        } else {
            return false;
        };
        self.finish(outcome);
        true
    }

    fn finish(&mut self, outcome: Outcome) {
        tracing::info!(?outcome, tick = self.tick, day = self.cycle.day(), "battle ended");
        self.outcome = Some(outcome);
        self.push(BattleEvent::Terminal { outcome });
    }

    // ------------------------------------------------------------------
    // Movement and spawning
    // ------------------------------------------------------------------

    fn chase(&mut self, dt: Fixed) {
        let phase = self.cycle.phase();
        if !matches!(phase, DayPhase::Active | DayPhase::Retreat) {
            return;
        }
        let bands = self.config.bands;
        let enemies: Vec<EntityId> = self.world.alive_with_role(Role::Enemy).map(|e| e.id).collect();

        for id in enemies {
            let Some(enemy) = self.world.get(id) else {
                continue;
            };
            if enemy.speed <= Fixed::ZERO {
                continue;
            }
            let accept = move |t: &CombatEntity| engagement_allowed(phase, Role::Enemy, t.role());
            let target = self
                .locks
                .get(id)
                .and_then(|lock| self.world.get(lock.target))
                .filter(|t| t.alive && accept(*t))
                .map(|t| t.id)
                .or_else(|| {
                    select_target_where(&self.world, &bands, id, &Coefficients::splat(1), accept)
                        .map(|s| s.target)
                });
            let Some(goal) = target.and_then(|t| self.world.get(t)).map(|t| t.position) else {
                continue;
            };

            let gap = enemy.position.distance(goal) - bands.short;
            if gap <= Fixed::ZERO {
                continue;
            }
            let step = enemy.speed.saturating_mul(dt).min(gap);
            let next = enemy.position.step_towards(goal, step);
            self.world.move_entity(id, next);
        }
    }

    /// Timers are charged only for the part of `dt` spent in Active, so the
    /// tick that enters Active does not eat into the first interval.
    fn run_spawners(&mut self, dt: Fixed) {
        if self.cycle.phase() != DayPhase::Active {
            return;
        }
        let active = dt.min(self.cycle.elapsed_in_phase());
        if active <= Fixed::ZERO {
            return;
        }
        for index in 0..self.spawners.len() {
            let tower = self.spawners[index].tower;
            let can_act = self
                .world
                .get(tower)
                .is_some_and(|t| t.alive && t.is_operational());
            if !can_act {
                continue;
            }
            for _ in 0..self.spawners[index].tick(active) {
                self.spawn_from(tower);
            }
        }
    }

    /// Deployment cells of squads out on the field.
    fn reserved_cells(&self) -> BTreeSet<(i32, i32)> {
        self.squads
            .iter()
            .filter(|s| s.engaged)
            .filter_map(|s| s.deployed_at)
            .map(|p| reserve_cell(p, self.config.spawn.cell_size))
            .collect()
    }

    fn spawn_from(&mut self, tower: EntityId) -> Option<EntityId> {
        let reserved = self.reserved_cells();
        let enemy = spawn_enemy(
            &mut self.world,
            &self.config.bands,
            tower,
            &self.config.spawn,
            &reserved,
        )?;
        self.counters.spawns += 1;
        let position = self.world.get(enemy).map_or(Vec2Fixed::ZERO, |e| e.position);
        self.push(BattleEvent::Spawn {
            tower,
            enemy,
            position,
        });
        Some(enemy)
    }

    // ------------------------------------------------------------------
    // Persistence and verification
    // ------------------------------------------------------------------

    /// Capture the mutable state of the battle.
    #[must_use]
    pub fn snapshot(&self) -> BattleSnapshot {
        let entities = self
            .world
            .iter()
            .map(|e| {
                let (active, building) = match e.kind {
                    EntityKind::Tower {
                        active, building, ..
                    } => (active, building),
                    _ => (true, false),
                };
                EntitySnapshot {
                    id: e.id,
                    position: e.position,
                    hp: e.hp,
                    cooldown_remaining: e.cooldown_remaining,
                    alive: e.alive,
                    active,
                    building,
                    owner: e.kind.owner(),
                }
            })
            .collect();
        let squads = self
            .squads
            .iter()
            .map(|s| SquadSnapshot {
                id: s.id,
                line: s.line.clone(),
                engaged: s.engaged,
                deployed_at: s.deployed_at,
            })
            .collect();

        BattleSnapshot {
            tick: self.tick,
            time: self.time,
            phase: self.cycle.phase(),
            day: self.cycle.day(),
            elapsed_in_phase: self.cycle.elapsed_in_phase(),
            elapsed_in_day: self.cycle.elapsed_in_day(),
            entities,
            squads,
            locks: self.locks.clone(),
            spawners: self.spawners.clone(),
            counters: self.counters,
            event_count: self.event_count(),
            outcome: self.outcome,
        }
    }

    /// Put the battle back to a snapshot taken from it, or from any battle
    /// built from the same config and setup.
    ///
    /// Entities spawned after the snapshot are discarded and enemies spawned
    /// before it are rebuilt. The event log is cut back to the snapshot
    /// point when it still covers it, and otherwise restarts empty there.
    pub fn restore(&mut self, snapshot: &BattleSnapshot) -> Result<()> {
        let mismatch =
            || CoreError::InvalidState("snapshot does not belong to this battle".to_string());
        if snapshot.squads.len() != self.squads.len()
            || snapshot.spawners.len() != self.spawners.len()
        {
            return Err(mismatch());
        }
        for (index, saved) in snapshot.entities.iter().enumerate() {
            if saved.id != index as EntityId + 1 {
                return Err(CoreError::InvalidState(format!(
                    "snapshot entity {} out of order",
                    saved.id
                )));
            }
            // Entries past the current arena must be rebuildable enemies.
            let fits = match self.world.get(saved.id) {
                Some(current) => current.kind.owner() == saved.owner,
                None => saved.owner.is_some(),
            };
            if !fits {
                return Err(mismatch());
            }
        }
        // Only spawned enemies may be dropped.
        if self
            .world
            .iter()
            .skip(snapshot.entities.len())
            .any(|e| e.kind.owner().is_none())
        {
            return Err(mismatch());
        }

        self.world.truncate(snapshot.entities.len());
        for saved in snapshot.entities.iter().skip(self.world.len()) {
            self.rebuild_enemy(saved)?;
        }
        for saved in &snapshot.entities {
            self.world.move_entity(saved.id, saved.position);
            if saved.alive {
                self.world.revive(saved.id);
            } else {
                self.world.mark_dead(saved.id);
            }
            let entity = self
                .world
                .get_mut(saved.id)
                .ok_or(CoreError::EntityNotFound(saved.id))?;
            entity.hp = saved.hp.min(entity.max_hp);
            entity.cooldown_remaining = saved.cooldown_remaining;
            if let EntityKind::Tower {
                active, building, ..
            } = &mut entity.kind
            {
                *active = saved.active;
                *building = saved.building;
            }
        }

        for (squad, saved) in self.squads.iter_mut().zip(&snapshot.squads) {
            squad.line.clone_from(&saved.line);
            squad.engaged = saved.engaged;
            squad.deployed_at = saved.deployed_at;
        }
        self.cycle.set_clock(
            snapshot.phase,
            snapshot.day,
            snapshot.elapsed_in_phase,
            snapshot.elapsed_in_day,
        );
        self.locks = snapshot.locks.clone();
        self.spawners.clone_from(&snapshot.spawners);
        self.counters = snapshot.counters;
        let point = snapshot.event_count;
        if point >= self.log_base && point <= self.event_count() {
            self.events.truncate(point - self.log_base);
        } else {
            self.events.clear();
            self.log_base = point;
        }
        self.tick = snapshot.tick;
        self.time = snapshot.time;
        self.outcome = snapshot.outcome;
        self.update_exposure();
        Ok(())
    }

    /// Re-create a spawned enemy recorded in a snapshot.
    fn rebuild_enemy(&mut self, saved: &EntitySnapshot) -> Result<()> {
        let owner = saved.owner.ok_or_else(|| {
            CoreError::InvalidState(format!("snapshot entity {} has no spawning tower", saved.id))
        })?;
        let profile = self
            .world
            .get(owner)
            .filter(|t| matches!(t.kind, EntityKind::Tower { .. }))
            .map(|t| spawned_profile(t, self.config.spawn.enemy_speed))
            .ok_or(CoreError::EntityNotFound(owner))?;
        self.world.spawn(CombatEntity::new(
            EntityKind::SpawnedEnemy { owner },
            &profile,
            saved.position,
        ));
        Ok(())
    }

    /// Hash of the full mutable state, for desync and determinism checks.
    ///
    /// Two battles in identical states produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.time.to_bits().hash(&mut hasher);
        self.cycle.phase().hash(&mut hasher);
        self.cycle.day().hash(&mut hasher);
        self.cycle.elapsed_in_day().to_bits().hash(&mut hasher);

        self.world.len().hash(&mut hasher);
        for entity in self.world.iter() {
            entity.id.hash(&mut hasher);
            entity.position.x.to_bits().hash(&mut hasher);
            entity.position.y.to_bits().hash(&mut hasher);
            entity.hp.hash(&mut hasher);
            entity.cooldown_remaining.to_bits().hash(&mut hasher);
            entity.alive.hash(&mut hasher);
            entity.screened.hash(&mut hasher);
        }

        for (attacker, lock) in self.locks.iter() {
            attacker.hash(&mut hasher);
            lock.target.hash(&mut hasher);
            lock.tier.hash(&mut hasher);
        }
        for spawner in &self.spawners {
            spawner.timer().to_bits().hash(&mut hasher);
        }
        self.outcome.hash(&mut hasher);

        hasher.finish()
    }
}

/// `amount` scaled by how much of the nominal day actually ran.
fn prorated_heal(amount: u32, elapsed: Fixed, nominal: Fixed) -> u32 {
    if elapsed >= nominal {
        return amount;
    }
    let elapsed = u128::try_from(elapsed.to_bits()).unwrap_or(0);
    let nominal = u128::try_from(nominal.to_bits()).unwrap_or(1).max(1);
    u32::try_from(u128::from(amount) * elapsed / nominal).unwrap_or(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TierValues;
    use std::sync::{Arc, Mutex};

    fn uniform(value: u32) -> TierValues<u32> {
        TierValues::splat(value)
    }

    fn stats(hp: u32, attack: TierValues<u32>, period: i32) -> StatBlock {
        StatBlock {
            max_hp: hp,
            attack,
            defense: TierValues::default(),
            explosive_attack: 0,
            explosive_defense: 0,
            blast_radius: Fixed::ZERO,
            shot_period: Fixed::from_num(period),
            speed: Fixed::ZERO,
            body_radius: Fixed::ZERO,
        }
    }

    fn config() -> BattleConfig {
        BattleConfig {
            phases: PhaseConfig::new(Fixed::from_num(60), Fixed::from_num(10)),
            spawn: SpawnSettings {
                enemy_speed: Fixed::ZERO,
                ..SpawnSettings::default()
            },
            ..BattleConfig::default()
        }
    }

    fn duel(soldier_attack: u32, tower_hp: u32) -> BattleSetup {
        BattleSetup {
            squads: vec![SquadSetup {
                soldiers: vec![stats(100, TierValues::new(soldier_attack, 0, 0), 2)],
                preferred: RangeTier::Short,
                policy: PositionPolicy::NearestTower,
                home: Vec2Fixed::from_ints(-50, 0),
            }],
            towers: vec![TowerSetup {
                position: Vec2Fixed::ZERO,
                stats: stats(tower_hp, TierValues::default(), 2),
                spawn_interval: Fixed::from_num(1000),
                level: 0,
                active: true,
                building: false,
            }],
            turrets: Vec::new(),
        }
    }

    #[test]
    fn test_rejects_oversized_squad() {
        let mut setup = duel(10, 10);
        setup.squads[0].soldiers = vec![stats(10, uniform(1), 1); 5];
        assert!(matches!(
            Battle::new(config(), &setup),
            Err(CoreError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_squad_deploys_on_creation() {
        let battle = Battle::new(config(), &duel(10, 10)).unwrap();
        let squad = &battle.squads()[0];
        assert!(squad.engaged);
        assert_eq!(squad.deployed_at, Some(Vec2Fixed::from_ints(-2, 0)));
        assert_eq!(battle.phase(), DayPhase::Travel);
        // Already standing at the deployment point while Travel runs.
        let soldier = battle.world().get(squad.line[0]).unwrap();
        assert_eq!(soldier.position, Vec2Fixed::from_ints(-2, 0));
    }

    #[test]
    fn test_no_shots_during_travel() {
        let mut battle = Battle::new(config(), &duel(10, 1000)).unwrap();
        for _ in 0..9 {
            let events = battle.advance_phase(Fixed::ONE).unwrap();
            assert!(events.is_empty());
        }
    }

    #[test]
    fn test_advancing_after_end_is_rejected() {
        let mut battle = Battle::new(config(), &duel(100, 10)).unwrap();
        let outcome = battle.run_to_completion(Fixed::ONE, 100).unwrap();
        assert_eq!(outcome, Outcome::Victory);
        assert!(matches!(
            battle.advance_phase(Fixed::ONE),
            Err(CoreError::InvalidState(_))
        ));
    }

    #[test]
    fn test_tick_limit_reports_no_termination() {
        let mut battle = Battle::new(config(), &duel(0, 10)).unwrap();
        let outcome = battle.run_to_completion(Fixed::ONE, 20).unwrap();
        assert_eq!(outcome, Outcome::NoTermination);
        assert_eq!(battle.tick(), 20);
        assert!(matches!(
            battle.events().last().map(|e| &e.event),
            Some(BattleEvent::Terminal {
                outcome: Outcome::NoTermination
            })
        ));
    }

    #[test]
    fn test_forced_retreat_clears_locks_and_stops_tower_fire() {
        let mut battle = Battle::new(config(), &duel(1, 1000)).unwrap();
        for _ in 0..14 {
            battle.advance_phase(Fixed::ONE).unwrap();
        }
        assert!(!battle.locks().is_empty());
        let events = battle.order_retreat().unwrap();
        assert_eq!(events.len(), 1);
        assert!(battle.locks().is_empty());
        assert_eq!(battle.phase(), DayPhase::Retreat);
        for _ in 0..5 {
            let events = battle.advance_phase(Fixed::ONE).unwrap();
            assert!(!events.iter().any(|e| matches!(e.event, BattleEvent::Shot { .. })));
        }
    }

    #[test]
    fn test_forced_day_end_prorates_heal_for_resting_squad() {
        let mut cfg = config();
        cfg.heal_amount = 60;
        let mut setup = duel(0, 1000);
        setup.squads.push(SquadSetup {
            soldiers: vec![stats(100, uniform(0), 1)],
            preferred: RangeTier::Short,
            policy: PositionPolicy::HoldAtBase,
            home: Vec2Fixed::from_ints(-60, 0),
        });
        let mut battle = Battle::new(cfg, &setup).unwrap();
        let resting = battle.squads()[1].line[0];
        battle.world.get_mut(resting).unwrap().hp = 10;
        let fighter = battle.squads()[0].line[0];
        battle.world.get_mut(fighter).unwrap().hp = 10;

        for _ in 0..30 {
            battle.advance_phase(Fixed::ONE).unwrap();
        }
        battle.end_day().unwrap();

        // Half the nominal day ran.
        assert_eq!(battle.world().get(resting).unwrap().hp, 40);
        assert_eq!(battle.world().get(fighter).unwrap().hp, 10);
        assert_eq!(battle.day(), 1);
        assert_eq!(battle.counters(), DayCounters::default());
    }

    #[test]
    fn test_observers_see_phase_changes_until_unsubscribed() {
        #[derive(Clone)]
        struct Phases(Arc<Mutex<Vec<DayPhase>>>);
        impl BattleObserver for Phases {
            fn on_phase_changed(&mut self, transition: &PhaseTransition) {
                self.0.lock().unwrap().push(transition.to);
            }
        }

        let seen = Phases(Arc::new(Mutex::new(Vec::new())));
        let mut battle = Battle::new(config(), &duel(0, 1000)).unwrap();
        let id = battle.subscribe(Box::new(seen.clone()));
        battle.advance_phase(Fixed::from_num(10)).unwrap();
        assert_eq!(*seen.0.lock().unwrap(), vec![DayPhase::Active]);

        battle.unsubscribe(id);
        battle.order_retreat().unwrap();
        assert_eq!(seen.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_state_hash_tracks_state() {
        let mut a = Battle::new(config(), &duel(3, 1000)).unwrap();
        let mut b = Battle::new(config(), &duel(3, 1000)).unwrap();
        assert_eq!(a.state_hash(), b.state_hash());
        a.advance_phase(Fixed::ONE).unwrap();
        assert_ne!(a.state_hash(), b.state_hash());
        b.advance_phase(Fixed::ONE).unwrap();
        assert_eq!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_prorated_heal() {
        assert_eq!(prorated_heal(60, Fixed::from_num(30), Fixed::from_num(60)), 30);
        assert_eq!(prorated_heal(60, Fixed::from_num(90), Fixed::from_num(60)), 60);
        assert_eq!(prorated_heal(60, Fixed::ZERO, Fixed::from_num(60)), 0);
    }
}
