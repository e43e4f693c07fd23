//! Background heading correction while travelling straight.
//!
//! Every tick the gyro heading is compared with the desired heading. The
//! wheels on the side that drifted ahead are slowed to `correction_factor`
//! of nominal speed until the heading is back on target.

use super::{ControllerShared, MotionKind, sign};
use crate::error::Result;
use crate::hardware::FaultCounter;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Side of the chassis being slowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Correction {
    None,
    SlowLeft,
    SlowRight,
}

impl Correction {
    pub(crate) fn from_deviation(deviation: i64) -> Self {
        match sign(deviation) {
            1 => Correction::SlowLeft,
            -1 => Correction::SlowRight,
            _ => Correction::None,
        }
    }
}

pub(crate) fn spawn(shared: Arc<ControllerShared>, interval: Duration) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("heading-correction".into())
        .spawn(move || run_correction_loop(shared, interval))?;
    Ok(handle)
}

fn run_correction_loop(shared: Arc<ControllerShared>, interval: Duration) {
    log::debug!("HeadingController: correction thread started");
    let mut faults = FaultCounter::new("heading-correction", shared.fault_warn_threshold);

    while shared.suspension.begin_tick() {
        correct_once(&shared, &mut faults);
        shared.suspension.end_tick();
        if !shared.suspension.idle(interval) {
            break;
        }
    }

    log::debug!("HeadingController: correction thread stopped");
}

/// One correction tick. Does nothing unless travelling.
pub(crate) fn correct_once(shared: &ControllerShared, faults: &mut FaultCounter) {
    if *shared.motion_kind.lock() != MotionKind::Traveling {
        return;
    }
    let moving = faults.record(shared.drive.lock().is_moving());
    if moving != Some(true) {
        return;
    }
    let Some(heading) = faults.record(shared.read_heading()) else {
        return;
    };

    let desired = shared.desired_heading.load(Ordering::SeqCst);
    let correction = Correction::from_deviation(heading - desired);
    if let Err(e) = apply(shared, correction) {
        log::warn!("HeadingController: failed to apply correction: {}", e);
    }
}

fn apply(shared: &ControllerShared, correction: Correction) -> Result<()> {
    let nominal = shared.travel_speed.load(Ordering::SeqCst);
    let slowed = nominal * shared.correction_factor;

    let (left, right) = match correction {
        Correction::None => (nominal, nominal),
        Correction::SlowLeft => (slowed, nominal),
        Correction::SlowRight => (nominal, slowed),
    };

    let mut drive = shared.drive.lock();
    for &wheel in &shared.left_wheels {
        drive.set_wheel_speed(wheel, left)?;
    }
    for &wheel in &shared.right_wheels {
        drive.set_wheel_speed(wheel, right)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correction_from_deviation() {
        assert_eq!(Correction::from_deviation(5), Correction::SlowLeft);
        assert_eq!(Correction::from_deviation(-1), Correction::SlowRight);
        assert_eq!(Correction::from_deviation(0), Correction::None);
    }
}
