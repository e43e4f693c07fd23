//! Nestable pause for the heading correction loop.
//!
//! Each [`Suspension::suspend`] must be matched by one [`Suspension::resume`];
//! correction runs only while the count is zero. `suspend` also waits for a
//! correction tick already in progress, so the caller owns the wheel speeds
//! once it returns.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct TickState {
    in_tick: bool,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct Suspension {
    count: AtomicUsize,
    state: Mutex<TickState>,
    cond: Condvar,
}

impl Suspension {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suspend(&self) {
        let mut state = self.state.lock();
        self.count.fetch_add(1, Ordering::SeqCst);
        while state.in_tick {
            self.cond.wait(&mut state);
        }
    }

    /// Undo one `suspend`. Resuming an already running loop does nothing.
    pub fn resume(&self) {
        let previous = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| c.checked_sub(1));
        match previous {
            Ok(1) => {
                let _state = self.state.lock();
                self.cond.notify_all();
            }
            Ok(_) => {}
            Err(_) => log::debug!("Suspension: resume without matching suspend ignored"),
        }
    }

    /// Suspend until the returned guard is dropped.
    pub fn pause(&self) -> SuspendGuard<'_> {
        self.suspend();
        SuspendGuard { suspension: self }
    }

    pub fn depth(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn is_suspended(&self) -> bool {
        self.depth() > 0
    }

    /// Block until correction may run, then mark a tick in progress.
    ///
    /// Returns `false` once the loop has been closed.
    pub fn begin_tick(&self) -> bool {
        let mut state = self.state.lock();
        while !state.closed && self.count.load(Ordering::SeqCst) > 0 {
            self.cond.wait(&mut state);
        }
        if state.closed {
            return false;
        }
        state.in_tick = true;
        true
    }

    pub fn end_tick(&self) {
        let mut state = self.state.lock();
        state.in_tick = false;
        self.cond.notify_all();
    }

    /// Sleep between ticks. Returns `false` if closed meanwhile.
    pub fn idle(&self, interval: Duration) -> bool {
        let mut state = self.state.lock();
        if !state.closed {
            self.cond.wait_for(&mut state, interval);
        }
        !state.closed
    }

    /// Stop the loop for good and wake every waiter.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.cond.notify_all();
    }
}

/// Resumes correction on drop.
pub struct SuspendGuard<'a> {
    suspension: &'a Suspension,
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        self.suspension.resume();
    }
}
