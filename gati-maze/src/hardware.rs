//! Hardware boundary: sensors, drive base and operator.
//!
//! Every device sits behind a trait so the controller and behaviors run
//! unchanged against the EV3 drivers or the simulator in [`crate::sim`].
//! Devices are shared between threads as `Arc<Mutex<dyn Trait>>`.

use crate::error::{GatiError, Result};
use parking_lot::Mutex;
use std::io::BufRead;
use std::sync::Arc;

/// Gyro heading source.
pub trait HeadingSensor: Send {
    /// Heading in degrees relative to the last reset, in the sensor's own
    /// mounting convention.
    fn fetch_heading(&mut self) -> Result<f64>;

    /// Make the current orientation the zero reference.
    fn reset(&mut self) -> Result<()>;
}

/// Ultrasonic distance sensor.
pub trait RangeSensor: Send {
    /// Distance in metres. `f32::INFINITY` means nothing in range.
    fn fetch_distance(&mut self) -> Result<f32>;
}

/// Front bumper.
pub trait ContactSensor: Send {
    fn fetch_contact(&mut self) -> Result<bool>;
}

/// Differential drive chassis.
///
/// Angular velocity is positive clockwise, matching the heading convention.
pub trait DriveBase: Send {
    /// Lateral offset of each wheel from the chassis centre (mm).
    /// Negative offsets are left wheels, positive are right wheels.
    fn wheel_offsets(&self) -> Vec<f32>;

    /// Set the linear speed of one wheel (mm/s).
    fn set_wheel_speed(&mut self, wheel: usize, speed_mm_s: f32) -> Result<()>;

    /// Set chassis velocity (mm/s, deg/s).
    fn set_velocity(&mut self, linear_mm_s: f32, angular_deg_s: f32) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn is_moving(&mut self) -> Result<bool>;

    /// Total distance travelled by the chassis centre (mm).
    fn odometer_mm(&mut self) -> Result<f64>;
}

pub type SharedHeadingSensor = Arc<Mutex<dyn HeadingSensor>>;
pub type SharedRangeSensor = Arc<Mutex<dyn RangeSensor>>;
pub type SharedContactSensor = Arc<Mutex<dyn ContactSensor>>;
pub type SharedDriveBase = Arc<Mutex<dyn DriveBase>>;

/// The full device set of one robot.
#[derive(Clone)]
pub struct Hardware {
    pub drive: SharedDriveBase,
    pub gyro: SharedHeadingSensor,
    pub left_range: SharedRangeSensor,
    pub right_range: SharedRangeSensor,
    pub contact: SharedContactSensor,
}

/// What the robot asks the operator to do.
#[derive(Clone, Debug, PartialEq)]
pub enum OperatorPrompt {
    /// Place the robot square to a reference edge and confirm.
    BeginCalibration,
    /// The 720° spin finished; re-align the robot to the reference and confirm.
    CompleteCalibration,
    /// Calibration produced an unusable result; confirm to try again.
    RetryCalibration { reason: String },
}

impl std::fmt::Display for OperatorPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatorPrompt::BeginCalibration => {
                write!(f, "Align the robot with a reference edge, then confirm")
            }
            OperatorPrompt::CompleteCalibration => {
                write!(f, "Re-align the robot exactly as before, then confirm")
            }
            OperatorPrompt::RetryCalibration { reason } => {
                write!(f, "Calibration failed ({}); confirm to retry", reason)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatorSignal {
    Confirm,
    Cancel,
}

/// The human (or stand-in) answering prompts.
pub trait Operator: Send {
    fn request(&mut self, prompt: &OperatorPrompt) -> Result<OperatorSignal>;
}

/// Ask `operator` and turn a cancel into [`GatiError::Cancelled`].
pub fn confirm(operator: &mut dyn Operator, prompt: OperatorPrompt) -> Result<()> {
    log::info!("Operator: {}", prompt);
    match operator.request(&prompt)? {
        OperatorSignal::Confirm => Ok(()),
        OperatorSignal::Cancel => Err(GatiError::Cancelled),
    }
}

/// Operator on the terminal: Enter confirms, `q` cancels.
pub struct ConsoleOperator<R> {
    input: R,
}

impl ConsoleOperator<std::io::BufReader<std::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(std::io::BufReader::new(std::io::stdin()))
    }
}

impl<R: BufRead> ConsoleOperator<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }
}

impl<R: BufRead + Send> Operator for ConsoleOperator<R> {
    fn request(&mut self, prompt: &OperatorPrompt) -> Result<OperatorSignal> {
        println!("{} [Enter = confirm, q = cancel]", prompt);
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(OperatorSignal::Cancel);
        }
        match line.trim() {
            "q" | "Q" => Ok(OperatorSignal::Cancel),
            _ => Ok(OperatorSignal::Confirm),
        }
    }
}

/// Operator that confirms everything.
#[derive(Debug, Default)]
pub struct AutoOperator;

impl Operator for AutoOperator {
    fn request(&mut self, _prompt: &OperatorPrompt) -> Result<OperatorSignal> {
        Ok(OperatorSignal::Confirm)
    }
}

/// Tracks consecutive sensor faults so a flaky device is reported once
/// instead of on every sample.
#[derive(Debug)]
pub struct FaultCounter {
    source: &'static str,
    consecutive: usize,
    warn_threshold: usize,
}

impl FaultCounter {
    pub fn new(source: &'static str, warn_threshold: usize) -> Self {
        Self {
            source,
            consecutive: 0,
            warn_threshold,
        }
    }

    /// Pass a reading through; a fault becomes `None`.
    pub fn record<T>(&mut self, reading: Result<T>) -> Option<T> {
        match reading {
            Ok(value) => {
                if self.consecutive >= self.warn_threshold {
                    log::info!(
                        "{}: recovered after {} faulty samples",
                        self.source,
                        self.consecutive
                    );
                }
                self.consecutive = 0;
                Some(value)
            }
            Err(e) => {
                self.consecutive += 1;
                if self.consecutive == self.warn_threshold {
                    log::warn!(
                        "{}: {} consecutive faults, last: {}",
                        self.source,
                        self.consecutive,
                        e
                    );
                } else {
                    log::debug!("{}: skipped sample: {}", self.source, e);
                }
                None
            }
        }
    }

    pub fn consecutive(&self) -> usize {
        self.consecutive
    }
}
