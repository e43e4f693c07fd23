//! Simulated robot state and kinematics.
//!
//! Heading is in degrees, clockwise positive, 0 along +Y. A wheel at lateral
//! offset `o` (negative = left) runs at `v - ω·o` for chassis velocity
//! `(v, ω)`; the inverse is used to integrate arbitrary per-wheel speeds.

use super::maze::Maze;
use crate::config::{RobotConfig, SimulationConfig};
use std::time::{Duration, Instant};

/// Longest integration step (s)
const MAX_SUBSTEP: f64 = 0.005;

/// How simulated time advances.
#[derive(Clone, Copy, Debug)]
pub enum SimClock {
    /// Follow the wall clock, scaled by `speed_factor`.
    Realtime { speed_factor: f64 },
    /// Advance a fixed `dt` on every sensor or odometer read.
    Stepped { dt: Duration },
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub heading: f64,
}

impl Pose {
    /// Unit vector along the heading.
    pub fn forward(&self) -> (f32, f32) {
        let h = self.heading.to_radians();
        (h.sin() as f32, h.cos() as f32)
    }

    /// Unit vector to the robot's right.
    pub fn right(&self) -> (f32, f32) {
        let (fx, fy) = self.forward();
        (fy, -fx)
    }
}

pub struct SimWorld {
    maze: Maze,
    pose: Pose,
    wheel_offsets: Vec<f32>,
    wheel_speeds: Vec<f32>,
    odometer_mm: f64,
    gyro_zero: f64,
    clock: SimClock,
    last_update: Instant,
    params: SimulationConfig,
    sensor_gap_mm: f32,
    gyro_sign: f64,
}

impl SimWorld {
    pub fn new(maze: Maze, sim: &SimulationConfig, robot: &RobotConfig, clock: SimClock) -> Self {
        let (x, y) = maze.start_position();
        let offset = robot.wheel_offset_mm.abs();
        Self {
            maze,
            pose: Pose { x, y, heading: 0.0 },
            wheel_offsets: vec![-offset, offset],
            wheel_speeds: vec![0.0, 0.0],
            odometer_mm: 0.0,
            gyro_zero: 0.0,
            clock,
            last_update: Instant::now(),
            params: sim.clone(),
            sensor_gap_mm: robot.sensor_gap_mm,
            gyro_sign: robot.gyro_orientation.sign(),
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn set_heading(&mut self, heading: f64) {
        self.pose.heading = heading;
    }

    pub fn wheel_offsets(&self) -> &[f32] {
        &self.wheel_offsets
    }

    pub fn wheel_speeds(&self) -> &[f32] {
        &self.wheel_speeds
    }

    pub fn odometer_mm(&self) -> f64 {
        self.odometer_mm
    }

    pub fn is_moving(&self) -> bool {
        self.wheel_speeds.iter().any(|&v| v != 0.0)
    }

    /// Bring the simulation up to the current time.
    pub fn advance(&mut self) {
        let dt = match self.clock {
            SimClock::Realtime { speed_factor } => {
                let now = Instant::now();
                let elapsed = now.duration_since(self.last_update);
                self.last_update = now;
                elapsed.as_secs_f64() * speed_factor
            }
            SimClock::Stepped { dt } => dt.as_secs_f64(),
        };

        let steps = (dt / MAX_SUBSTEP).ceil().max(1.0) as usize;
        let sub_dt = dt / steps as f64;
        for _ in 0..steps {
            self.integrate(sub_dt);
        }
    }

    /// Chassis (linear mm/s, angular deg/s) from per-wheel speeds.
    fn chassis_velocity(&self) -> (f32, f64) {
        let n = self.wheel_speeds.len() as f32;
        let linear = self.wheel_speeds.iter().sum::<f32>() / n;
        let sum_sq: f32 = self.wheel_offsets.iter().map(|o| o * o).sum();
        if sum_sq == 0.0 {
            return (linear, 0.0);
        }
        let moment: f32 = self
            .wheel_offsets
            .iter()
            .zip(&self.wheel_speeds)
            .map(|(o, v)| o * (v - linear))
            .sum();
        let omega_rad = -(moment / sum_sq) as f64;
        (linear, omega_rad.to_degrees())
    }

    fn integrate(&mut self, dt: f64) {
        if !self.is_moving() {
            return;
        }
        let (linear, angular) = self.chassis_velocity();
        self.pose.heading += angular * dt;

        let step = linear * dt as f32;
        if step == 0.0 {
            return;
        }
        let (fx, fy) = self.pose.forward();
        let nx = self.pose.x + fx * step;
        let ny = self.pose.y + fy * step;

        // The leading edge of the body may not enter a wall
        let reach = self.params.body_reach_mm * step.signum();
        if self.maze.is_wall(nx + fx * reach, ny + fy * reach) {
            return;
        }
        self.pose.x = nx;
        self.pose.y = ny;
        self.odometer_mm += step.abs() as f64;
    }

    pub fn set_velocity(&mut self, linear: f32, angular_deg_s: f32) {
        let omega = (angular_deg_s as f64).to_radians() as f32;
        self.wheel_speeds = self
            .wheel_offsets
            .iter()
            .map(|o| linear - omega * o)
            .collect();
    }

    pub fn set_wheel_speed(&mut self, wheel: usize, speed: f32) -> bool {
        match self.wheel_speeds.get_mut(wheel) {
            Some(v) => {
                *v = speed;
                true
            }
            None => false,
        }
    }

    /// Halt. Rotation carries on for `coast_secs` worth of angular velocity.
    pub fn stop(&mut self) {
        if self.is_moving() {
            let (_, angular) = self.chassis_velocity();
            self.pose.heading += angular * self.params.coast_secs;
        }
        self.wheel_speeds.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Raw gyro reading in the mounting's convention.
    pub fn gyro_reading(&self) -> f64 {
        self.gyro_sign * self.params.gyro_drift * (self.pose.heading - self.gyro_zero)
    }

    pub fn reset_gyro(&mut self) {
        self.gyro_zero = self.pose.heading;
    }

    /// Side distance in metres; `left` selects the sensor.
    pub fn side_distance(&self, left: bool) -> f32 {
        let (fx, fy) = self.pose.forward();
        let (rx, ry) = self.pose.right();
        let side = if left { -1.0 } else { 1.0 };
        let lateral = side * self.sensor_gap_mm / 2.0;
        let setback = self.params.side_sensor_setback_mm;

        let ox = self.pose.x - fx * setback + rx * lateral;
        let oy = self.pose.y - fy * setback + ry * lateral;
        let max_range_mm = self.params.max_range_m * 1000.0;

        match self
            .maze
            .ray_cast(ox, oy, rx * side, ry * side, max_range_mm)
        {
            Some(mm) => mm / 1000.0,
            None => f32::INFINITY,
        }
    }

    /// Bumper closed: a wall within `contact_reach_mm` ahead.
    pub fn front_contact(&self) -> bool {
        let (fx, fy) = self.pose.forward();
        let reach = self.params.contact_reach_mm;
        self.maze
            .is_wall(self.pose.x + fx * reach, self.pose.y + fy * reach)
    }
}
