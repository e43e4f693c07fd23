//! Mapping run orchestration.
//!
//! [`Pilot`] is the motion front-end the behaviors drive through. While the
//! driver is mapping it logs each rotation when it starts and each travel
//! when it ends, measured on the odometer. [`Driver`] wires the pilot,
//! behaviors and arbiter together and turns the log into a map.

use crate::arbiter::{Arbiter, ArbiterHandle};
use crate::behaviors::build_arbiter;
use crate::config::{GatiConfig, MappingConfig};
use crate::error::{GatiError, Result};
use crate::hardware::{Hardware, Operator, OperatorPrompt, confirm};
use crate::heading::HeadingController;
use crate::map::{CorridorMap, build_map};
use crate::store::{CorridorStore, MotionEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverMode {
    Standby,
    Mapping,
}

pub struct Pilot {
    controller: HeadingController,
    store: Mutex<CorridorStore>,
    mode: Mutex<DriverMode>,
    /// Odometer reading where the current travel began
    travel_start: Mutex<Option<f64>>,
}

impl Pilot {
    pub fn new(hardware: &Hardware, config: &GatiConfig) -> Result<Self> {
        let controller = HeadingController::new(
            Arc::clone(&hardware.drive),
            Arc::clone(&hardware.gyro),
            config.robot.gyro_orientation,
            &config.motion,
        )?;
        Ok(Self {
            controller,
            store: Mutex::new(CorridorStore::new()),
            mode: Mutex::new(DriverMode::Standby),
            travel_start: Mutex::new(None),
        })
    }

    pub fn controller(&self) -> &HeadingController {
        &self.controller
    }

    pub fn mode(&self) -> DriverMode {
        *self.mode.lock()
    }

    pub fn set_mode(&self, mode: DriverMode) {
        *self.mode.lock() = mode;
    }

    pub fn is_mapping(&self) -> bool {
        self.mode() == DriverMode::Mapping
    }

    /// Start continuous forward travel.
    pub fn forward(&self) -> Result<()> {
        let start = self.controller.odometer_mm()?;
        self.travel_start.lock().get_or_insert(start);
        self.controller.forward()
    }

    /// Stop, logging the travel that just ended.
    pub fn stop(&self) -> Result<()> {
        self.controller.stop()?;
        let start = self.travel_start.lock().take();
        if let Some(start) = start {
            let distance = self.controller.odometer_mm()? - start;
            self.record(MotionEvent::Travel {
                distance_mm: distance.round() as i32,
            });
        }
        Ok(())
    }

    /// Rotate in place, ending any travel first.
    pub fn rotate(&self, angle: f64) -> Result<()> {
        if self.travel_start.lock().is_some() {
            self.stop()?;
        }
        if angle.is_finite() {
            self.record(MotionEvent::Rotate {
                angle_degrees: angle.round() as i32,
            });
        }
        self.controller.rotate(angle)
    }

    fn record(&self, event: MotionEvent) {
        if !self.is_mapping() {
            return;
        }
        let mut store = self.store.lock();
        store.push(event);
        log::debug!("Pilot: #{} {:?}", store.len(), event);
    }

    /// Offer a corridor width sample (mm).
    pub fn record_width(&self, width_mm: f64) {
        if self.is_mapping() {
            self.store.lock().record_width(width_mm);
        }
    }

    pub fn reset_store(&self) {
        self.store.lock().reset();
    }

    pub fn events(&self) -> Vec<MotionEvent> {
        self.store.lock().snapshot()
    }

    pub fn min_corridor_width(&self) -> Option<f64> {
        self.store.lock().min_corridor_width()
    }

    pub fn corridor_half_width(&self, mapping: &MappingConfig) -> i32 {
        self.store
            .lock()
            .corridor_half_width(mapping.default_half_width_mm, mapping.wall_offset_fraction)
    }
}

/// Ends a mapping run from another thread.
#[derive(Clone)]
pub struct DriverHandle {
    arbiter: ArbiterHandle,
}

impl DriverHandle {
    /// Stop the arbiter and wait for it to go idle.
    ///
    /// Called before a run has started, it cancels that run instead.
    pub fn stop_mapping(&self) {
        if !self.arbiter.stop() {
            log::info!("Driver: stop requested before mapping started");
        }
    }
}

pub struct Driver {
    pilot: Arc<Pilot>,
    arbiter: Arbiter,
    mapping: MappingConfig,
}

impl Driver {
    pub fn new(hardware: Hardware, config: &GatiConfig) -> Result<Self> {
        let pilot = Arc::new(Pilot::new(&hardware, config)?);
        let arbiter = build_arbiter(&pilot, &hardware, &config.behaviors, &config.robot)?;
        Ok(Self {
            pilot,
            arbiter,
            mapping: config.mapping.clone(),
        })
    }

    pub fn pilot(&self) -> &Arc<Pilot> {
        &self.pilot
    }

    pub fn handle(&self) -> DriverHandle {
        DriverHandle {
            arbiter: self.arbiter.handle(),
        }
    }

    /// Calibrate the gyro, asking the operator to retry on a bad result.
    pub fn calibrate(&self, operator: &mut dyn Operator) -> Result<f64> {
        loop {
            match self.pilot.controller().calibrate(operator) {
                Ok(scale) => return Ok(scale),
                Err(GatiError::CalibrationFailed(reason)) => {
                    log::warn!("Driver: calibration failed: {}", reason);
                    confirm(operator, OperatorPrompt::RetryCalibration { reason })?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Explore until stopped, then build the corridor map.
    pub fn start_mapping(&mut self) -> Result<CorridorMap> {
        self.pilot.reset_store();
        self.pilot.set_mode(DriverMode::Mapping);
        log::info!("Driver: mapping started");

        let run = self.arbiter.go();
        let stopped = self.pilot.stop();
        let settled = self.wait_until_stopped();
        self.pilot.set_mode(DriverMode::Standby);

        run?;
        stopped?;
        settled?;

        let events = self.pilot.events();
        let half_width = self.pilot.corridor_half_width(&self.mapping);
        log::info!(
            "Driver: mapping stopped, {} events, narrowest corridor {:?} mm, wall offset {} mm",
            events.len(),
            self.pilot.min_corridor_width(),
            half_width
        );
        build_map(&events, half_width)
    }

    fn wait_until_stopped(&self) -> Result<()> {
        while self.pilot.controller().is_moving()? {
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MotionConfig;
    use crate::heading::MotionKind;
    use crate::sim::{SimClock, Simulation};

    fn setup(maze: &[&str]) -> (Simulation, GatiConfig) {
        let mut config = GatiConfig::default();
        config.simulation.maze = maze.iter().map(|r| r.to_string()).collect();
        config.motion = MotionConfig {
            poll_interval_ms: 0,
            retry_backoff_ms: 0,
            ..MotionConfig::default()
        };
        let sim = Simulation::new(
            &config.simulation,
            &config.robot,
            SimClock::Stepped {
                dt: Duration::from_millis(2),
            },
        )
        .unwrap();
        (sim, config)
    }

    #[test]
    fn test_pilot_recording_asymmetry() {
        let (sim, config) = setup(&["#####", "#...#", "#.S.#", "#...#", "#####"]);
        let pilot = Pilot::new(&sim.hardware(), &config).unwrap();
        pilot.set_mode(DriverMode::Mapping);

        pilot.forward().unwrap();
        // Nothing logged until the travel ends
        assert!(pilot.events().is_empty());
        while pilot.controller().odometer_mm().unwrap() < 100.0 {}
        pilot.stop().unwrap();

        pilot.rotate(90.0).unwrap();
        let events = pilot.events();
        assert_eq!(events.len(), 2);
        match events[0] {
            MotionEvent::Travel { distance_mm } => assert!((100..=102).contains(&distance_mm)),
            other => panic!("expected travel, got {:?}", other),
        }
        assert_eq!(events[1], MotionEvent::Rotate { angle_degrees: 90 });
    }

    #[test]
    fn test_rotate_ends_travel() {
        let (sim, config) = setup(&["#####", "#...#", "#.S.#", "#...#", "#####"]);
        let pilot = Pilot::new(&sim.hardware(), &config).unwrap();
        pilot.set_mode(DriverMode::Mapping);

        pilot.forward().unwrap();
        pilot.rotate(-90.0).unwrap();
        let events = pilot.events();
        assert!(matches!(events[0], MotionEvent::Travel { .. }));
        assert_eq!(events[1], MotionEvent::Rotate { angle_degrees: -90 });
    }

    #[test]
    fn test_pilot_standby_records_nothing() {
        let (sim, config) = setup(&["#####", "#...#", "#.S.#", "#...#", "#####"]);
        let pilot = Pilot::new(&sim.hardware(), &config).unwrap();

        pilot.rotate(90.0).unwrap();
        pilot.record_width(400.0);
        assert!(pilot.events().is_empty());
        assert_eq!(pilot.min_corridor_width(), None);
    }

    #[test]
    fn test_infinite_rotation_not_recorded() {
        let (sim, config) = setup(&["#####", "#...#", "#.S.#", "#...#", "#####"]);
        let pilot = Pilot::new(&sim.hardware(), &config).unwrap();
        pilot.set_mode(DriverMode::Mapping);

        pilot.rotate(f64::INFINITY).unwrap();
        pilot.stop().unwrap();
        assert!(pilot.events().is_empty());
    }

    #[test]
    fn test_calibrate_retries_until_cancelled() {
        use crate::hardware::OperatorSignal;

        /// Confirms everything except the second retry.
        struct Impatient {
            retries: usize,
        }
        impl Operator for Impatient {
            fn request(&mut self, prompt: &OperatorPrompt) -> Result<OperatorSignal> {
                if let OperatorPrompt::RetryCalibration { .. } = prompt {
                    self.retries += 1;
                    if self.retries == 2 {
                        return Ok(OperatorSignal::Cancel);
                    }
                }
                Ok(OperatorSignal::Confirm)
            }
        }

        let (sim, mut config) = setup(&["#####", "#...#", "#.S.#", "#...#", "#####"]);
        config.motion.max_calibration_scale = 0.99;
        let driver = Driver::new(sim.hardware(), &config).unwrap();

        // No re-alignment: the gyro always reads 720, scale 1.0 is rejected
        let mut operator = Impatient { retries: 0 };
        let result = driver.calibrate(&mut operator);
        assert!(matches!(result, Err(GatiError::Cancelled)));
        assert_eq!(operator.retries, 2);
    }

    #[test]
    fn test_stop_before_start_cancels() {
        let (sim, mut config) = setup(&["#####", "#...#", "#.S.#", "#...#", "#####"]);
        // Without this the arbiter would spin forever once nothing is eligible
        config.behaviors.return_when_inactive = false;
        let mut driver = Driver::new(sim.hardware(), &config).unwrap();
        driver.handle().stop_mapping();
        assert!(matches!(driver.start_mapping(), Err(GatiError::Cancelled)));
        assert_eq!(driver.pilot().mode(), DriverMode::Standby);
        assert!(driver.pilot().events().is_empty());

        // The early stop is spent; the next run maps until stopped
        let handle = driver.handle();
        let pilot = Arc::clone(driver.pilot());
        let stopper = thread::spawn(move || {
            while pilot.controller().motion_kind() != MotionKind::Traveling {
                thread::sleep(Duration::from_millis(1));
            }
            handle.stop_mapping();
        });
        let map = driver.start_mapping().unwrap();
        stopper.join().unwrap();
        assert!(driver.pilot().events().iter().any(|e| !e.is_rotate()));
        assert!(!map.is_empty());
    }
}
