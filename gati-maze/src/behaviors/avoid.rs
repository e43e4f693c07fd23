//! Turn away from a wall the bumper ran into.

use crate::arbiter::{Activation, Behavior};
use crate::driver::Pilot;
use crate::error::Result;
use crate::hardware::{FaultCounter, SharedContactSensor};
use std::sync::Arc;

pub struct AvoidAndTurn {
    pilot: Arc<Pilot>,
    contact: SharedContactSensor,
    turn_degrees: f64,
    /// Set by a contact, cleared by a completed turn
    latched: bool,
    faults: FaultCounter,
}

impl AvoidAndTurn {
    pub fn new(pilot: Arc<Pilot>, contact: SharedContactSensor, turn_degrees: f64) -> Self {
        Self {
            pilot,
            contact,
            turn_degrees,
            latched: false,
            faults: FaultCounter::new("AvoidAndTurn", 25),
        }
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }
}

impl Behavior for AvoidAndTurn {
    fn name(&self) -> &str {
        "AvoidAndTurn"
    }

    fn evaluate(&mut self) -> bool {
        if !self.pilot.is_mapping() {
            return false;
        }
        if self.faults.record(self.contact.lock().fetch_contact()) == Some(true) {
            self.latched = true;
        }
        self.latched
    }

    fn activate(&mut self) -> Result<Activation> {
        log::debug!("AvoidAndTurn: contact, turning {}°", self.turn_degrees);
        self.pilot.rotate(self.turn_degrees)?;
        self.latched = false;
        Ok(Activation::Completed)
    }

    fn deactivate(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviors::testing::ScriptedContact;
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

    #[test]
    fn test_contact_latches_until_turn() {
        let pilot = pilot();
        pilot.set_mode(DriverMode::Mapping);
        let contact: SharedContactSensor =
            Arc::new(Mutex::new(ScriptedContact::new(&[false, true, false, false])));
        let mut avoid = AvoidAndTurn::new(Arc::clone(&pilot), contact, 90.0);

        assert!(!avoid.evaluate());
        assert!(avoid.evaluate());
        // Bumper released but the latch holds
        assert!(avoid.evaluate());
        assert!(avoid.is_latched());

        assert_eq!(avoid.activate().unwrap(), Activation::Completed);
        assert!(!avoid.is_latched());
        assert!(!avoid.evaluate());

        assert_eq!(pilot.events(), vec![MotionEvent::Rotate { angle_degrees: 90 }]);
        assert_eq!(pilot.controller().desired_heading(), 90);
    }

    #[test]
    fn test_ignored_outside_mapping() {
        let pilot = pilot();
        let contact: SharedContactSensor = Arc::new(Mutex::new(ScriptedContact::new(&[true])));
        let mut avoid = AvoidAndTurn::new(pilot, contact, 90.0);
        assert!(!avoid.evaluate());
        assert!(!avoid.is_latched());
    }
}
