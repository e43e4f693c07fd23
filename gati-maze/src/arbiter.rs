//! Subsumption arbiter.
//!
//! Behaviors are scanned from highest to lowest priority every cycle; the
//! first that wants control runs. Switching behaviors always deactivates
//! the previous one before the next is activated.
//!
//! ```text
//!   go()            stop()
//! Idle ──► Running ──────► Stopping ──► Idle
//!              │  no eligible behavior     ▲
//!              └───(return_when_inactive)──┘
//! ```

use crate::error::{GatiError, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Outcome of [`Behavior::activate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    /// A discrete maneuver ran to completion.
    Completed,
    /// A continuous maneuver is running until `deactivate`.
    Continuing,
}

/// A reactive behavior competing for the robot.
pub trait Behavior: Send {
    fn name(&self) -> &str;

    /// Whether the behavior wants control now.
    fn evaluate(&mut self) -> bool;

    fn activate(&mut self) -> Result<Activation>;

    /// Stop whatever `activate` started. Must return promptly.
    fn deactivate(&mut self) -> Result<()>;
}

/// Higher values win.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArbiterState {
    Idle,
    Running,
    Stopping,
}

struct Control {
    state: Mutex<ArbiterState>,
    /// A stop that arrived while idle. Only touched with `state` locked.
    stop_pending: AtomicBool,
    cond: Condvar,
}

/// Stops a running arbiter from any thread.
#[derive(Clone)]
pub struct ArbiterHandle {
    control: Arc<Control>,
}

impl ArbiterHandle {
    /// Request a stop and block until the arbiter is idle.
    ///
    /// Returns `false` if it was not running; the next `go()` then returns
    /// [`GatiError::Cancelled`] without activating anything. Waits for a discrete maneuver
    /// in progress to finish; calling this from inside a behavior deadlocks.
    pub fn stop(&self) -> bool {
        let mut state = self.control.state.lock();
        match *state {
            ArbiterState::Idle => {
                self.control.stop_pending.store(true, Ordering::SeqCst);
                return false;
            }
            ArbiterState::Running => {
                log::info!("Arbiter: stop requested");
                *state = ArbiterState::Stopping;
                self.control.cond.notify_all();
            }
            ArbiterState::Stopping => {}
        }
        while *state != ArbiterState::Idle {
            self.control.cond.wait(&mut state);
        }
        true
    }

    pub fn state(&self) -> ArbiterState {
        *self.control.state.lock()
    }
}

struct Entry {
    priority: Priority,
    behavior: Box<dyn Behavior>,
}

/// Currently active behavior: index into `entries` and how it ran.
type Active = Option<(usize, Activation)>;

pub struct Arbiter {
    /// Sorted by descending priority
    entries: Vec<Entry>,
    control: Arc<Control>,
    cycle_interval: Duration,
    return_when_inactive: bool,
}

impl Arbiter {
    pub fn new(cycle_interval: Duration, return_when_inactive: bool) -> Self {
        Self {
            entries: Vec::new(),
            control: Arc::new(Control {
                state: Mutex::new(ArbiterState::Idle),
                stop_pending: AtomicBool::new(false),
                cond: Condvar::new(),
            }),
            cycle_interval,
            return_when_inactive,
        }
    }

    /// Register a behavior. Priorities must be unique.
    pub fn add(&mut self, priority: Priority, behavior: Box<dyn Behavior>) -> Result<()> {
        if let Some(existing) = self.entries.iter().find(|e| e.priority == priority) {
            return Err(GatiError::InvalidPriority(format!(
                "{} and {} both have priority {}",
                existing.behavior.name(),
                behavior.name(),
                priority.0
            )));
        }
        let pos = self
            .entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, Entry { priority, behavior });
        Ok(())
    }

    pub fn handle(&self) -> ArbiterHandle {
        ArbiterHandle {
            control: Arc::clone(&self.control),
        }
    }

    pub fn state(&self) -> ArbiterState {
        *self.control.state.lock()
    }

    /// Behavior names, highest priority first.
    pub fn behavior_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.behavior.name().to_string())
            .collect()
    }

    /// Run arbitration on the calling thread until stopped, an activation
    /// fails, or (with `return_when_inactive`) nothing wants control.
    pub fn go(&mut self) -> Result<()> {
        {
            let mut state = self.control.state.lock();
            if *state != ArbiterState::Idle {
                return Err(GatiError::NotSupported("arbiter is already running".to_string()));
            }
            if self.control.stop_pending.swap(false, Ordering::SeqCst) {
                log::info!("Arbiter: stopped before it started");
                return Err(GatiError::Cancelled);
            }
            *state = ArbiterState::Running;
        }
        log::info!("Arbiter: running {:?}", self.behavior_names());

        let mut active: Active = None;
        let result = self.run_cycles(&mut active);

        let teardown = match active.take() {
            Some((index, _)) => self.deactivate(index),
            None => Ok(()),
        };

        {
            let mut state = self.control.state.lock();
            *state = ArbiterState::Idle;
            self.control.cond.notify_all();
        }
        log::info!("Arbiter: idle");

        result.and(teardown)
    }

    fn run_cycles(&mut self, active: &mut Active) -> Result<()> {
        loop {
            if self.stop_requested() {
                return Ok(());
            }

            let selected = self.entries.iter_mut().position(|e| e.behavior.evaluate());

            match selected {
                None => {
                    if let Some((index, _)) = active.take() {
                        self.deactivate(index)?;
                    }
                    if self.return_when_inactive {
                        log::debug!("Arbiter: no behavior eligible, returning");
                        return Ok(());
                    }
                }
                Some(index) => {
                    let rerun = !matches!(*active, Some((i, Activation::Continuing)) if i == index);

                    if let Some((previous, _)) = *active
                        && previous != index
                    {
                        *active = None;
                        self.deactivate(previous)?;
                    }

                    if rerun {
                        log::debug!("Arbiter: activating {}", self.entries[index].behavior.name());
                        // Counts as active even if it fails, so teardown deactivates it
                        *active = Some((index, Activation::Completed));
                        let activation = self.entries[index].behavior.activate()?;
                        *active = Some((index, activation));
                    }
                }
            }

            self.wait_cycle();
        }
    }

    fn deactivate(&mut self, index: usize) -> Result<()> {
        let entry = &mut self.entries[index];
        log::debug!("Arbiter: deactivating {}", entry.behavior.name());
        entry.behavior.deactivate()
    }

    fn stop_requested(&self) -> bool {
        *self.control.state.lock() == ArbiterState::Stopping
    }

    fn wait_cycle(&self) {
        let mut state = self.control.state.lock();
        if *state == ArbiterState::Running {
            self.control.cond.wait_for(&mut state, self.cycle_interval);
        }
    }
}
