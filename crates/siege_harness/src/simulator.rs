//! Runs one scenario to completion.

use siege_core::battle::Battle;
use siege_core::events::{BattleObserver, DaySummary};
use siege_core::spatial::ObstacleField;
use tracing::{debug, info};

use crate::error::HarnessError;
use crate::report::BattleReport;
use crate::scenario::Scenario;

/// Logs a progress line at every day end.
struct DayProgress {
    scenario: String,
}

impl BattleObserver for DayProgress {
    fn on_day_ended(&mut self, summary: &DaySummary) {
        debug!(
            scenario = %self.scenario,
            day = summary.day,
            shots = summary.counters.shots,
            damage = summary.counters.damage_dealt,
            kills = summary.counters.kills,
            spawns = summary.counters.spawns,
            healed = summary.healed,
            "day ended"
        );
    }
}

/// Run `scenario` until it ends or hits its tick limit.
///
/// The scenario is validated first; any problem is returned as
/// [`HarnessError::Validation`] and no battle is created. The function
/// holds no state between calls, so identical scenarios always produce
/// identical reports.
pub fn simulate(scenario: &Scenario) -> Result<BattleReport, HarnessError> {
    let issues = scenario.validate();
    if !issues.is_empty() {
        return Err(HarnessError::Validation(issues));
    }

    let setup = scenario.to_setup()?;
    let terrain = ObstacleField::new(scenario.obstacles.clone());
    let mut battle = Battle::with_collision(scenario.config, &setup, Box::new(terrain))?;
    battle.subscribe(Box::new(DayProgress {
        scenario: scenario.name.clone(),
    }));

    let outcome = battle.run_to_completion(scenario.dt, scenario.max_ticks)?;
    info!(
        scenario = %scenario.name,
        seed = scenario.config.seed,
        ?outcome,
        ticks = battle.tick(),
        day = battle.day(),
        "simulation finished"
    );
    Ok(BattleReport::from_battle(&scenario.name, &battle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use siege_core::events::Outcome;
    use siege_test_utils::fixtures::duel;

    #[test]
    fn test_invalid_scenario_not_run() {
        let (config, setup) = duel(2);
        let scenario = Scenario::from_setup("duel", config, &setup);
        match simulate(&scenario) {
            Err(HarnessError::Validation(issues)) => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].field, "squads[0].soldiers");
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_tick_limit_reports_no_termination() {
        let (config, mut setup) = duel(2);
        let soldier = setup.squads[0].soldiers[0];
        setup.squads[0].soldiers = vec![soldier; 4];
        let mut scenario = Scenario::from_setup("duel", config, &setup);
        scenario.max_ticks = 5;

        let report = simulate(&scenario).expect("run");
        assert_eq!(report.outcome, Outcome::NoTermination);
        assert_eq!(report.ticks, 5);
    }
}
