//! Turn into an opening on the left.
//!
//! After turning the behavior locks itself so the same opening, still seen
//! by the left sensor while the robot pulls into it, does not trigger a
//! second turn. The lock releases once a wall is close on the left again.

use crate::arbiter::{Activation, Behavior};
use crate::driver::Pilot;
use crate::error::Result;
use crate::hardware::{FaultCounter, SharedRangeSensor};
use std::sync::Arc;

pub struct ExploreOpenSide {
    pilot: Arc<Pilot>,
    left: SharedRangeSensor,
    clearance_threshold_m: f32,
    turn_degrees: f64,
    locked: bool,
    faults: FaultCounter,
}

impl ExploreOpenSide {
    pub fn new(
        pilot: Arc<Pilot>,
        left: SharedRangeSensor,
        clearance_threshold_m: f32,
        turn_degrees: f64,
    ) -> Self {
        Self {
            pilot,
            left,
            clearance_threshold_m,
            turn_degrees,
            locked: false,
            faults: FaultCounter::new("ExploreOpenSide", 25),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl Behavior for ExploreOpenSide {
    fn name(&self) -> &str {
        "ExploreOpenSide"
    }

    fn evaluate(&mut self) -> bool {
        if !self.pilot.is_mapping() {
            return false;
        }
        let Some(distance) = self.faults.record(self.left.lock().fetch_distance()) else {
            return false;
        };
        if distance <= self.clearance_threshold_m {
            if self.locked {
                log::debug!("ExploreOpenSide: wall at {:.3} m, unlocked", distance);
            }
            self.locked = false;
            return false;
        }
        !self.locked
    }

    fn activate(&mut self) -> Result<Activation> {
        log::debug!("ExploreOpenSide: opening on the left, turning {}°", self.turn_degrees);
        self.pilot.rotate(self.turn_degrees)?;
        self.locked = true;
        Ok(Activation::Completed)
    }

    fn deactivate(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviors::testing::ScriptedRange;
    use crate::config::GatiConfig;
    use crate::driver::DriverMode;
    use crate::sim::{SimClock, Simulation};
    use crate::store::MotionEvent;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn pilot() -> Arc<Pilot> {
        let mut config = GatiConfig::default();
        config.motion.poll_interval_ms = 0;
        config.motion.retry_backoff_ms = 0;
        let sim = Simulation::new(
            &config.simulation,
            &config.robot,
            SimClock::Stepped {
                dt: Duration::from_millis(2),
            },
        )
        .unwrap();
        Arc::new(Pilot::new(&sim.hardware(), &config).unwrap())
    }

    fn explore(pilot: &Arc<Pilot>, readings: &[Option<f32>]) -> ExploreOpenSide {
        let left: SharedRangeSensor = Arc::new(Mutex::new(ScriptedRange::new(readings)));
        ExploreOpenSide::new(Arc::clone(pilot), left, 0.3, -90.0)
    }

    #[test]
    fn test_opening_turns_and_locks() {
        let pilot = pilot();
        pilot.set_mode(DriverMode::Mapping);
        let mut b = explore(
            &pilot,
            &[Some(0.12), Some(0.6), Some(0.6), Some(f32::INFINITY), Some(0.3), Some(0.8)],
        );

        assert!(!b.evaluate());
        assert!(b.evaluate());
        assert_eq!(b.activate().unwrap(), Activation::Completed);
        assert!(b.is_locked());

        // Still looking into the same opening
        assert!(!b.evaluate());
        assert!(!b.evaluate());
        // Exactly the threshold counts as a wall
        assert!(!b.evaluate());
        assert!(!b.is_locked());
        // A new opening
        assert!(b.evaluate());

        assert_eq!(pilot.events(), vec![MotionEvent::Rotate { angle_degrees: -90 }]);
        assert_eq!(pilot.controller().desired_heading(), -90);
    }

    #[test]
    fn test_fault_is_no_reading() {
        let pilot = pilot();
        pilot.set_mode(DriverMode::Mapping);
        let mut b = explore(&pilot, &[None, Some(1.0)]);
        assert!(!b.evaluate());
        assert!(b.evaluate());
    }

    #[test]
    fn test_ignored_outside_mapping() {
        let pilot = pilot();
        let mut b = explore(&pilot, &[Some(2.0)]);
        assert!(!b.evaluate());
    }
}
