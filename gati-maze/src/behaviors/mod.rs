//! Maze exploration behaviors.
//!
//! | Behavior | Eligible when | Action |
//! |----------|---------------|--------|
//! | [`Advance`] | mapping | drive forward, sample corridor width |
//! | [`AvoidAndTurn`] | bumper has closed since the last turn | turn right |
//! | [`ExploreOpenSide`] | left side open and not locked | turn left, lock |
//!
//! Together they make a left-hand wall follower.

mod advance;
mod avoid;
mod explore;

pub use advance::Advance;
pub use avoid::AvoidAndTurn;
pub use explore::ExploreOpenSide;

use crate::arbiter::{Arbiter, Behavior, Priority};
use crate::config::{BehaviorConfig, RobotConfig};
use crate::driver::Pilot;
use crate::error::{GatiError, Result};
use crate::hardware::Hardware;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Names used in `[behaviors] priority`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    Advance,
    AvoidAndTurn,
    ExploreOpenSide,
}

impl BehaviorKind {
    fn build(
        self,
        pilot: &Arc<Pilot>,
        hardware: &Hardware,
        behaviors: &BehaviorConfig,
        robot: &RobotConfig,
    ) -> Box<dyn Behavior> {
        match self {
            BehaviorKind::Advance => Box::new(Advance::new(
                Arc::clone(pilot),
                Arc::clone(&hardware.left_range),
                Arc::clone(&hardware.right_range),
                robot.sensor_gap_mm,
                Duration::from_millis(behaviors.width_sample_interval_ms),
            )),
            BehaviorKind::AvoidAndTurn => Box::new(AvoidAndTurn::new(
                Arc::clone(pilot),
                Arc::clone(&hardware.contact),
                behaviors.avoid_turn_degrees,
            )),
            BehaviorKind::ExploreOpenSide => Box::new(ExploreOpenSide::new(
                Arc::clone(pilot),
                Arc::clone(&hardware.left_range),
                behaviors.clearance_threshold_m,
                behaviors.explore_turn_degrees,
            )),
        }
    }
}

/// Build an arbiter holding the configured behaviors, lowest priority first.
pub fn build_arbiter(
    pilot: &Arc<Pilot>,
    hardware: &Hardware,
    behaviors: &BehaviorConfig,
    robot: &RobotConfig,
) -> Result<Arbiter> {
    if behaviors.priority.len() > u8::MAX as usize {
        return Err(GatiError::InvalidPriority(format!(
            "{} behaviors configured",
            behaviors.priority.len()
        )));
    }
    for (i, kind) in behaviors.priority.iter().enumerate() {
        if behaviors.priority[..i].contains(kind) {
            return Err(GatiError::InvalidPriority(format!(
                "{:?} listed more than once",
                kind
            )));
        }
    }

    let mut arbiter = Arbiter::new(
        Duration::from_millis(behaviors.cycle_interval_ms),
        behaviors.return_when_inactive,
    );
    for (rank, kind) in behaviors.priority.iter().enumerate() {
        arbiter.add(
            Priority(rank as u8),
            kind.build(pilot, hardware, behaviors, robot),
        )?;
    }
    Ok(arbiter)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatiConfig;
    use crate::sim::{SimClock, Simulation};

    #[test]
    fn test_build_arbiter_order() {
        let config = GatiConfig::default();
        let sim = Simulation::new(
            &config.simulation,
            &config.robot,
            SimClock::Stepped {
                dt: Duration::from_millis(2),
            },
        )
        .unwrap();
        let hw = sim.hardware();
        let pilot = Arc::new(Pilot::new(&hw, &config).unwrap());

        let arbiter = build_arbiter(&pilot, &hw, &config.behaviors, &config.robot).unwrap();
        assert_eq!(
            arbiter.behavior_names(),
            vec!["ExploreOpenSide", "AvoidAndTurn", "Advance"]
        );

        let mut behaviors = config.behaviors.clone();
        behaviors.priority = vec![BehaviorKind::Advance, BehaviorKind::Advance];
        assert!(matches!(
            build_arbiter(&pilot, &hw, &behaviors, &config.robot),
            Err(GatiError::InvalidPriority(_))
        ));
    }

    #[test]
    fn test_kind_names_in_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            priority: Vec<BehaviorKind>,
        }
        let w: Wrapper =
            toml::from_str(r#"priority = ["advance", "avoid_and_turn", "explore_open_side"]"#)
                .unwrap();
        assert_eq!(w.priority[1], BehaviorKind::AvoidAndTurn);
    }
}
