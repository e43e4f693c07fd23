//! Drive forward while sampling the corridor width.

use crate::arbiter::{Activation, Behavior};
use crate::driver::Pilot;
use crate::error::Result;
use crate::hardware::{FaultCounter, SharedRangeSensor};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Consecutive failed samples before the sampler logs a warning
const SAMPLER_WARN_THRESHOLD: usize = 25;

struct Sampler {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Lowest priority: always wants control while mapping.
pub struct Advance {
    pilot: Arc<Pilot>,
    left: SharedRangeSensor,
    right: SharedRangeSensor,
    sensor_gap_mm: f32,
    sample_interval: Duration,
    sampler: Option<Sampler>,
}

impl Advance {
    pub fn new(
        pilot: Arc<Pilot>,
        left: SharedRangeSensor,
        right: SharedRangeSensor,
        sensor_gap_mm: f32,
        sample_interval: Duration,
    ) -> Self {
        Self {
            pilot,
            left,
            right,
            sensor_gap_mm,
            sample_interval,
            sampler: None,
        }
    }

    fn spawn_sampler(&self) -> Result<Sampler> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let pilot = Arc::clone(&self.pilot);
        let left = Arc::clone(&self.left);
        let right = Arc::clone(&self.right);
        let gap = self.sensor_gap_mm as f64;
        let interval = self.sample_interval;

        let handle = thread::Builder::new()
            .name("width-sampler".into())
            .spawn(move || {
                let mut faults = FaultCounter::new("width-sampler", SAMPLER_WARN_THRESHOLD);
                loop {
                    let l = faults.record(left.lock().fetch_distance());
                    let r = faults.record(right.lock().fetch_distance());
                    if let (Some(l), Some(r)) = (l, r) {
                        pilot.record_width(corridor_width(l, r, gap));
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        Ok(Sampler { stop_tx, handle })
    }
}

/// Wall-to-wall width (mm) from the two side readings (m).
fn corridor_width(left_m: f32, right_m: f32, sensor_gap_mm: f64) -> f64 {
    left_m as f64 * 1000.0 + right_m as f64 * 1000.0 + sensor_gap_mm
}

impl Behavior for Advance {
    fn name(&self) -> &str {
        "Advance"
    }

    fn evaluate(&mut self) -> bool {
        self.pilot.is_mapping()
    }

    fn activate(&mut self) -> Result<Activation> {
        self.pilot.forward()?;
        if self.sampler.is_none() {
            self.sampler = Some(self.spawn_sampler()?);
        }
        Ok(Activation::Continuing)
    }

    fn deactivate(&mut self) -> Result<()> {
        if let Some(sampler) = self.sampler.take() {
            let _ = sampler.stop_tx.send(());
            if sampler.handle.join().is_err() {
                log::error!("Advance: width sampler panicked");
            }
        }
        self.pilot.stop()
    }
}
