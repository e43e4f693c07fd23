//! Gyro-corrected differential drive.
//!
//! [`HeadingController`] keeps a running desired heading. Straight travel is
//! held to it by a background correction thread; rotations are closed-loop
//! on the gyro and retried at reduced speed until the heading settles on
//! the target.
//!
//! Heading convention: degrees, positive clockwise, zero at the last reset.

mod correction;
mod suspension;

pub use suspension::{SuspendGuard, Suspension};

use crate::config::MotionConfig;
use crate::error::{GatiError, Result};
use crate::hardware::{
    FaultCounter, Operator, OperatorPrompt, SharedDriveBase, SharedHeadingSensor, confirm,
};
use crate::shared::{AtomicF32, AtomicF64};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Degrees spun during calibration.
const CALIBRATION_SPIN: f64 = 720.0;

/// Which way up the gyro is mounted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GyroOrientation {
    #[default]
    GlyphTop,
    GlyphBottom,
}

impl GyroOrientation {
    pub fn sign(self) -> f64 {
        match self {
            GyroOrientation::GlyphTop => 1.0,
            GyroOrientation::GlyphBottom => -1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionKind {
    Stopped,
    Rotating,
    Traveling,
    Arcing,
}

#[inline]
pub(crate) fn sign(v: i64) -> i64 {
    v.signum()
}

/// Like `f64::signum` but zero for zero.
#[inline]
fn sign_f64(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// State seen by both the controller and the correction thread.
pub(crate) struct ControllerShared {
    pub(crate) drive: SharedDriveBase,
    pub(crate) gyro: SharedHeadingSensor,
    pub(crate) orientation: GyroOrientation,
    pub(crate) calibration_scale: AtomicF64,
    pub(crate) desired_heading: AtomicI64,
    pub(crate) motion_kind: Mutex<MotionKind>,
    /// Signed nominal wheel speed of the current travel (mm/s)
    pub(crate) travel_speed: AtomicF32,
    pub(crate) correction_factor: f32,
    pub(crate) left_wheels: Vec<usize>,
    pub(crate) right_wheels: Vec<usize>,
    pub(crate) suspension: Suspension,
    pub(crate) fault_warn_threshold: usize,
}

impl ControllerShared {
    /// Calibrated heading, truncated to whole degrees.
    pub(crate) fn read_heading(&self) -> Result<i64> {
        let raw = self.gyro.lock().fetch_heading()?;
        if !raw.is_finite() {
            return Err(GatiError::SensorFault(format!("gyro returned {}", raw)));
        }
        let scale = self.calibration_scale.load(Ordering::SeqCst);
        Ok((self.orientation.sign() * scale * raw).trunc() as i64)
    }

    fn set_motion_kind(&self, kind: MotionKind) {
        *self.motion_kind.lock() = kind;
    }
}

/// Gyro-corrected motion controller for a differential chassis.
pub struct HeadingController {
    shared: Arc<ControllerShared>,
    config: MotionConfig,
    linear_speed: AtomicF32,
    angular_speed: AtomicF32,
    correction_thread: Option<JoinHandle<()>>,
}

impl HeadingController {
    /// Classify wheels, seed the desired heading from the gyro and start
    /// the correction thread.
    pub fn new(
        drive: SharedDriveBase,
        gyro: SharedHeadingSensor,
        orientation: GyroOrientation,
        config: &MotionConfig,
    ) -> Result<Self> {
        let offsets = drive.lock().wheel_offsets();
        let left_wheels: Vec<usize> = (0..offsets.len()).filter(|&i| offsets[i] < 0.0).collect();
        let right_wheels: Vec<usize> = (0..offsets.len()).filter(|&i| offsets[i] > 0.0).collect();
        if left_wheels.is_empty() || right_wheels.is_empty() {
            log::warn!(
                "HeadingController: wheel offsets {:?} leave a side without wheels, correction is one-sided",
                offsets
            );
        }

        let shared = Arc::new(ControllerShared {
            drive,
            gyro,
            orientation,
            calibration_scale: AtomicF64::new(1.0),
            desired_heading: AtomicI64::new(0),
            motion_kind: Mutex::new(MotionKind::Stopped),
            travel_speed: AtomicF32::new(config.linear_speed),
            correction_factor: config.correction_factor,
            left_wheels,
            right_wheels,
            suspension: Suspension::new(),
            fault_warn_threshold: config.fault_warn_threshold,
        });

        match shared.read_heading() {
            Ok(heading) => shared.desired_heading.store(heading, Ordering::SeqCst),
            Err(e) => log::warn!("HeadingController: initial heading unavailable ({}), using 0", e),
        }

        let interval = Duration::from_millis(config.correction_interval_ms);
        let correction_thread = correction::spawn(Arc::clone(&shared), interval)?;

        log::info!(
            "HeadingController: {} left / {} right wheels, correction every {:?}",
            shared.left_wheels.len(),
            shared.right_wheels.len(),
            interval
        );

        Ok(Self {
            shared,
            config: config.clone(),
            linear_speed: AtomicF32::new(config.linear_speed),
            angular_speed: AtomicF32::new(config.angular_speed),
            correction_thread: Some(correction_thread),
        })
    }

    pub fn desired_heading(&self) -> i64 {
        self.shared.desired_heading.load(Ordering::SeqCst)
    }

    /// Shift the desired heading by `delta` degrees without moving.
    pub fn set_desired_heading(&self, delta: i64) {
        self.shared.desired_heading.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn motion_kind(&self) -> MotionKind {
        *self.shared.motion_kind.lock()
    }

    /// Calibrated heading in whole degrees.
    pub fn heading(&self) -> Result<i64> {
        self.shared.read_heading()
    }

    pub fn calibration_scale(&self) -> f64 {
        self.shared.calibration_scale.load(Ordering::SeqCst)
    }

    pub fn linear_speed(&self) -> f32 {
        self.linear_speed.load(Ordering::SeqCst)
    }

    pub fn set_linear_speed(&self, mm_s: f32) {
        self.linear_speed.store(mm_s.abs(), Ordering::SeqCst);
    }

    pub fn angular_speed(&self) -> f32 {
        self.angular_speed.load(Ordering::SeqCst)
    }

    pub fn set_angular_speed(&self, deg_s: f32) {
        self.angular_speed.store(deg_s.abs(), Ordering::SeqCst);
    }

    /// Pause heading correction until the guard drops.
    pub fn suspend_correction(&self) -> SuspendGuard<'_> {
        self.shared.suspension.pause()
    }

    pub fn is_moving(&self) -> Result<bool> {
        self.shared.drive.lock().is_moving()
    }

    pub fn odometer_mm(&self) -> Result<f64> {
        self.shared.drive.lock().odometer_mm()
    }

    /// Start continuous straight travel.
    pub fn forward(&self) -> Result<()> {
        self.begin_travel(1.0)
    }

    /// Start continuous reverse travel.
    pub fn backward(&self) -> Result<()> {
        self.begin_travel(-1.0)
    }

    fn begin_travel(&self, direction: f32) -> Result<()> {
        let _guard = self.shared.suspension.pause();
        let speed = direction * self.linear_speed();
        self.shared.travel_speed.store(speed, Ordering::SeqCst);
        self.shared.set_motion_kind(MotionKind::Traveling);
        self.shared.drive.lock().set_velocity(speed, 0.0)
    }

    /// Travel `distance_mm` (negative = reverse) and stop.
    ///
    /// Returns early if something else stops the chassis. An infinite
    /// distance starts continuous travel and returns immediately.
    pub fn travel(&self, distance_mm: f64) -> Result<()> {
        if distance_mm == 0.0 || distance_mm.is_nan() {
            return Ok(());
        }
        let direction = sign_f64(distance_mm) as f32;
        if distance_mm.is_infinite() {
            return self.begin_travel(direction);
        }

        let start = self.odometer_mm()?;
        self.begin_travel(direction)?;
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            let covered = (self.odometer_mm()? - start).abs();
            if covered >= distance_mm.abs() || !self.is_moving()? {
                break;
            }
            thread::sleep(poll);
        }
        self.stop()
    }

    pub fn stop(&self) -> Result<()> {
        let _guard = self.shared.suspension.pause();
        self.shared.set_motion_kind(MotionKind::Stopped);
        self.shared.drive.lock().stop()
    }

    /// Rotate by `angle` degrees (positive = right) at the nominal angular speed.
    pub fn rotate(&self, angle: f64) -> Result<()> {
        self.rotate_at(angle, self.angular_speed())
    }

    /// Rotate by `angle` degrees at `speed` deg/s and hold until the heading
    /// matches the new desired heading.
    ///
    /// An infinite angle spins continuously and returns immediately without
    /// touching the desired heading.
    pub fn rotate_at(&self, angle: f64, speed: f32) -> Result<()> {
        if angle.is_nan() {
            return Err(GatiError::NotSupported("rotation by NaN degrees".to_string()));
        }

        let _guard = self.shared.suspension.pause();
        self.shared.set_motion_kind(MotionKind::Rotating);

        if angle.is_infinite() {
            let angular = sign_f64(angle) as f32 * speed;
            return self.shared.drive.lock().set_velocity(0.0, angular);
        }

        let step = angle.round() as i64;
        let desired = self.shared.desired_heading.fetch_add(step, Ordering::SeqCst) + step;
        log::debug!("HeadingController: rotate {}° to {}°", step, desired);

        let result = self.converge(desired, step, speed);
        self.shared.set_motion_kind(MotionKind::Stopped);
        result
    }

    /// Closed-loop rotation towards `desired`, retrying on overshoot.
    fn converge(&self, desired: i64, mut angle: i64, speed: f32) -> Result<()> {
        let max_retries = self.config.max_convergence_retries;
        let backoff = Duration::from_millis(self.config.retry_backoff_ms);
        let mut attempt = 0usize;

        loop {
            let direction = sign(angle);
            let commanded = if attempt == 0 {
                speed
            } else {
                (angle.abs() as f32).min(self.config.retry_speed_cap)
            };

            self.shared
                .drive
                .lock()
                .set_velocity(0.0, direction as f32 * commanded)?;
            let polled = self.await_heading(desired, direction);
            self.shared.drive.lock().stop()?;
            polled?;

            thread::sleep(backoff * attempt as u32);

            let heading = self.sample_heading()?;
            let deviation = heading - desired;
            if deviation.abs() <= self.config.heading_tolerance {
                if attempt > 0 {
                    log::debug!(
                        "HeadingController: settled at {}° after {} retries",
                        heading,
                        attempt
                    );
                }
                return Ok(());
            }

            if attempt >= max_retries {
                log::error!(
                    "HeadingController: rotation to {}° stuck at {}° after {} attempts",
                    desired,
                    heading,
                    attempt + 1
                );
                return Err(GatiError::ConvergenceFailure {
                    desired,
                    heading,
                    attempts: attempt + 1,
                });
            }

            log::debug!(
                "HeadingController: attempt {} ended {}° off, correcting",
                attempt,
                deviation
            );
            angle = -deviation;
            attempt += 1;
        }
    }

    /// Poll until the heading reaches `desired` or passes it in `direction`.
    fn await_heading(&self, desired: i64, direction: i64) -> Result<i64> {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let mut faults = FaultCounter::new("HeadingController", self.config.fault_warn_threshold);

        loop {
            if let Some(heading) = faults.record(self.shared.read_heading()) {
                if heading == desired || sign(desired - heading) != direction {
                    return Ok(heading);
                }
            } else if faults.consecutive() > self.config.max_consecutive_faults {
                return Err(GatiError::SensorFault(format!(
                    "no heading for {} consecutive samples while rotating",
                    faults.consecutive()
                )));
            }
            thread::sleep(poll);
        }
    }

    /// First readable heading, tolerating transient faults.
    fn sample_heading(&self) -> Result<i64> {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let mut faults = FaultCounter::new("HeadingController", self.config.fault_warn_threshold);

        loop {
            if let Some(heading) = faults.record(self.shared.read_heading()) {
                return Ok(heading);
            }
            if faults.consecutive() > self.config.max_consecutive_faults {
                return Err(GatiError::SensorFault(format!(
                    "no heading for {} consecutive samples",
                    faults.consecutive()
                )));
            }
            thread::sleep(poll);
        }
    }

    /// Drive along an arc of `radius` mm through `angle` degrees.
    ///
    /// Supported forms: zero angle (no-op), zero radius (in-place rotation)
    /// and an infinite angle (continuous arc at the nominal angular speed,
    /// capped by the nominal linear speed).
    pub fn arc(&self, radius: f64, angle: f64) -> Result<()> {
        if angle == 0.0 {
            return Ok(());
        }
        if radius == 0.0 {
            return self.rotate(angle);
        }
        if !angle.is_infinite() || !radius.is_finite() {
            return Err(GatiError::NotSupported(format!(
                "arc of {}° at radius {} mm",
                angle, radius
            )));
        }

        let ratio = (std::f64::consts::PI * radius / 180.0).abs() as f32;
        let mut angular = self.angular_speed();
        let mut linear = angular * ratio;
        let max_linear = self.linear_speed();
        if linear > max_linear {
            angular *= max_linear / linear;
            linear = max_linear;
        }

        let _guard = self.shared.suspension.pause();
        self.shared.set_motion_kind(MotionKind::Arcing);
        self.shared
            .drive
            .lock()
            .set_velocity(linear, sign_f64(angle) as f32 * angular)
    }

    /// Zero the gyro here and make it the desired heading.
    pub fn reset_sensor(&self) -> Result<()> {
        let _guard = self.shared.suspension.pause();
        self.shared.gyro.lock().reset()?;
        self.shared.desired_heading.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Measure the gyro scale with a 720° spin.
    ///
    /// The operator aligns the robot before the spin and re-aligns it
    /// afterwards; the heading then read is compared with the true 720°.
    pub fn calibrate(&self, operator: &mut dyn Operator) -> Result<f64> {
        let _guard = self.shared.suspension.pause();

        confirm(operator, OperatorPrompt::BeginCalibration)?;
        self.shared.calibration_scale.store(1.0, Ordering::SeqCst);
        self.reset_sensor()?;

        self.rotate_at(CALIBRATION_SPIN, self.config.calibration_speed)?;
        confirm(operator, OperatorPrompt::CompleteCalibration)?;

        let measured = self.sample_heading()?;
        let scale = CALIBRATION_SPIN / measured as f64;
        let (min, max) = (
            self.config.min_calibration_scale,
            self.config.max_calibration_scale,
        );
        if !scale.is_finite() || scale <= 0.0 || scale < min || scale > max {
            return Err(GatiError::CalibrationFailed(format!(
                "gyro read {}° for a {}° spin, scale {:.4} outside [{}, {}]",
                measured, CALIBRATION_SPIN, scale, min, max
            )));
        }

        self.shared.calibration_scale.store(scale, Ordering::SeqCst);
        self.reset_sensor()?;
        log::info!(
            "HeadingController: calibrated, gyro read {}° for {}°, scale {:.4}",
            measured,
            CALIBRATION_SPIN,
            scale
        );
        Ok(scale)
    }
}

impl Drop for HeadingController {
    fn drop(&mut self) {
        self.shared.suspension.close();
        if let Some(handle) = self.correction_thread.take()
            && handle.join().is_err()
        {
            log::error!("HeadingController: correction thread panicked");
        }
    }
}
