//! Hardware-free robot for development and tests
//!
//! Simulates the EV3 maze robot in a character-grid maze:
//!
//! | Device | Simulation Method |
//! |--------|-------------------|
//! | Drive base | Per-wheel differential kinematics, stop on wall contact |
//! | Gyro | True heading × drift, mount sign, resettable zero |
//! | Side ultrasonics | Ray march from the sensor position, ∞ beyond range |
//! | Bumper | Wall test a fixed reach ahead of the chassis |
//! | Operator | Confirms prompts, re-aligns the robot after calibration |
//!
//! Stopping a rotation carries the robot on by `coast_secs` of angular
//! velocity, so rotation convergence retries are exercised.

mod devices;
mod maze;
mod world;

pub use devices::{SharedWorld, SimBumper, SimDrive, SimGyro, SimRange};
pub use maze::Maze;
pub use world::{Pose, SimClock, SimWorld};

use crate::config::{RobotConfig, SimulationConfig};
use crate::error::Result;
use crate::hardware::{Hardware, Operator, OperatorPrompt, OperatorSignal};
use parking_lot::Mutex;
use std::sync::Arc;

/// A simulated robot in its maze.
#[derive(Clone)]
pub struct Simulation {
    world: SharedWorld,
}

impl Simulation {
    pub fn new(sim: &SimulationConfig, robot: &RobotConfig, clock: SimClock) -> Result<Self> {
        let maze = Maze::parse(&sim.maze, sim.cell_size_mm)?;
        log::info!(
            "Simulation: {}x{} maze, {} mm cells, clock {:?}",
            maze.cols(),
            maze.rows(),
            maze.cell_size(),
            clock
        );
        let world = SimWorld::new(maze, sim, robot, clock);
        Ok(Self {
            world: Arc::new(Mutex::new(world)),
        })
    }

    /// Real-time simulation at the configured speed factor.
    pub fn realtime(sim: &SimulationConfig, robot: &RobotConfig) -> Result<Self> {
        Self::new(
            sim,
            robot,
            SimClock::Realtime {
                speed_factor: sim.speed_factor,
            },
        )
    }

    pub fn hardware(&self) -> Hardware {
        Hardware {
            drive: Arc::new(Mutex::new(SimDrive::new(Arc::clone(&self.world)))),
            gyro: Arc::new(Mutex::new(SimGyro::new(Arc::clone(&self.world)))),
            left_range: Arc::new(Mutex::new(SimRange::left(Arc::clone(&self.world)))),
            right_range: Arc::new(Mutex::new(SimRange::right(Arc::clone(&self.world)))),
            contact: Arc::new(Mutex::new(SimBumper::new(Arc::clone(&self.world)))),
        }
    }

    pub fn operator(&self) -> SimOperator {
        SimOperator {
            world: Arc::clone(&self.world),
        }
    }

    pub fn pose(&self) -> Pose {
        self.world.lock().pose()
    }

    pub fn true_heading(&self) -> f64 {
        self.pose().heading
    }

    pub fn set_true_heading(&self, heading: f64) {
        self.world.lock().set_heading(heading);
    }

    pub fn wheel_speeds(&self) -> Vec<f32> {
        self.world.lock().wheel_speeds().to_vec()
    }
}

/// Stand-in operator that squares the robot up when asked to.
pub struct SimOperator {
    world: SharedWorld,
}

impl Operator for SimOperator {
    fn request(&mut self, prompt: &OperatorPrompt) -> Result<OperatorSignal> {
        if *prompt == OperatorPrompt::CompleteCalibration {
            let mut world = self.world.lock();
            let heading = world.pose().heading;
            let aligned = (heading / 360.0).round() * 360.0;
            log::debug!("SimOperator: re-aligning {:.2}° to {}°", heading, aligned);
            world.set_heading(aligned);
        }
        Ok(OperatorSignal::Confirm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sim() -> Simulation {
        let config = SimulationConfig {
            maze: vec!["###".into(), "#.#".into(), "#S#".into(), "###".into()],
            ..SimulationConfig::default()
        };
        Simulation::new(
            &config,
            &RobotConfig::default(),
            SimClock::Stepped {
                dt: Duration::from_millis(5),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_hardware_devices_share_world() {
        let sim = sim();
        let hw = sim.hardware();

        assert_eq!(hw.drive.lock().wheel_offsets(), vec![-80.0, 80.0]);
        assert!(!hw.contact.lock().fetch_contact().unwrap());

        // Left wall of the start cell
        let left = hw.left_range.lock().fetch_distance().unwrap();
        assert!((left - 0.13).abs() < 0.006, "left {}", left);

        hw.drive.lock().set_velocity(0.0, 30.0).unwrap();
        let before = hw.gyro.lock().fetch_heading().unwrap();
        let after = hw.gyro.lock().fetch_heading().unwrap();
        assert!(after > before);
        hw.drive.lock().stop().unwrap();
        assert!(!hw.drive.lock().is_moving().unwrap());
    }

    #[test]
    fn test_sim_operator_realigns() {
        let sim = sim();
        sim.set_true_heading(705.3);
        let mut op = sim.operator();
        assert_eq!(
            op.request(&OperatorPrompt::BeginCalibration).unwrap(),
            OperatorSignal::Confirm
        );
        assert_eq!(sim.true_heading(), 705.3);

        op.request(&OperatorPrompt::CompleteCalibration).unwrap();
        assert_eq!(sim.true_heading(), 720.0);
    }

    #[test]
    fn test_bumper_closes_at_wall() {
        let sim = sim();
        let hw = sim.hardware();
        hw.drive.lock().set_velocity(100.0, 0.0).unwrap();

        let mut contact = false;
        for _ in 0..2000 {
            if hw.contact.lock().fetch_contact().unwrap() {
                contact = true;
                break;
            }
        }
        assert!(contact);
        // S row centre is y = 600; the wall starts at y = 1200
        assert!(sim.pose().y > 1000.0);
    }
}
