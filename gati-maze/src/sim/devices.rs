//! Device trait implementations backed by a shared [`SimWorld`].
//!
//! Reads bring the world up to date before sampling. Commands apply at the
//! current simulated instant.

use super::world::SimWorld;
use crate::error::{GatiError, Result};
use crate::hardware::{ContactSensor, DriveBase, HeadingSensor, RangeSensor};
use parking_lot::Mutex;
use std::sync::Arc;

pub type SharedWorld = Arc<Mutex<SimWorld>>;

pub struct SimDrive {
    world: SharedWorld,
}

impl SimDrive {
    pub fn new(world: SharedWorld) -> Self {
        Self { world }
    }
}

impl DriveBase for SimDrive {
    fn wheel_offsets(&self) -> Vec<f32> {
        self.world.lock().wheel_offsets().to_vec()
    }

    fn set_wheel_speed(&mut self, wheel: usize, speed_mm_s: f32) -> Result<()> {
        if self.world.lock().set_wheel_speed(wheel, speed_mm_s) {
            Ok(())
        } else {
            Err(GatiError::NotSupported(format!("no wheel {}", wheel)))
        }
    }

    fn set_velocity(&mut self, linear_mm_s: f32, angular_deg_s: f32) -> Result<()> {
        self.world.lock().set_velocity(linear_mm_s, angular_deg_s);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut world = self.world.lock();
        world.advance();
        world.stop();
        Ok(())
    }

    fn is_moving(&mut self) -> Result<bool> {
        let mut world = self.world.lock();
        world.advance();
        Ok(world.is_moving())
    }

    fn odometer_mm(&mut self) -> Result<f64> {
        let mut world = self.world.lock();
        world.advance();
        Ok(world.odometer_mm())
    }
}

pub struct SimGyro {
    world: SharedWorld,
}

impl SimGyro {
    pub fn new(world: SharedWorld) -> Self {
        Self { world }
    }
}

impl HeadingSensor for SimGyro {
    fn fetch_heading(&mut self) -> Result<f64> {
        let mut world = self.world.lock();
        world.advance();
        Ok(world.gyro_reading())
    }

    fn reset(&mut self) -> Result<()> {
        let mut world = self.world.lock();
        world.advance();
        world.reset_gyro();
        Ok(())
    }
}

/// Side-facing ultrasonic sensor.
pub struct SimRange {
    world: SharedWorld,
    left: bool,
}

impl SimRange {
    pub fn left(world: SharedWorld) -> Self {
        Self { world, left: true }
    }

    pub fn right(world: SharedWorld) -> Self {
        Self { world, left: false }
    }
}

impl RangeSensor for SimRange {
    fn fetch_distance(&mut self) -> Result<f32> {
        let mut world = self.world.lock();
        world.advance();
        Ok(world.side_distance(self.left))
    }
}

pub struct SimBumper {
    world: SharedWorld,
}

impl SimBumper {
    pub fn new(world: SharedWorld) -> Self {
        Self { world }
    }
}

impl ContactSensor for SimBumper {
    fn fetch_contact(&mut self) -> Result<bool> {
        let mut world = self.world.lock();
        world.advance();
        Ok(world.front_contact())
    }
}
