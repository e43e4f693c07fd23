//! Motion event log and corridor width tracking.
//!
//! The pilot appends every completed rotation and travel here while the
//! driver is mapping. The map builder later replays the log.

use serde::{Deserialize, Serialize};

/// A single recorded motion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MotionEvent {
    /// In-place rotation; positive is clockwise (right).
    Rotate { angle_degrees: i32 },
    /// Straight travel along the current heading.
    Travel { distance_mm: i32 },
}

impl MotionEvent {
    pub fn is_rotate(&self) -> bool {
        matches!(self, MotionEvent::Rotate { .. })
    }
}

/// Append-only motion log plus the narrowest corridor width observed.
#[derive(Clone, Debug, Default)]
pub struct CorridorStore {
    events: Vec<MotionEvent>,
    min_corridor_width: Option<f64>,
}

impl CorridorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the log and the width sentinel.
    pub fn reset(&mut self) {
        self.events.clear();
        self.min_corridor_width = None;
    }

    pub fn push(&mut self, event: MotionEvent) {
        self.events.push(event);
    }

    /// Lower the recorded width to `width_mm` if narrower.
    ///
    /// Non-finite and negative samples carry no information and are dropped.
    pub fn record_width(&mut self, width_mm: f64) {
        if !width_mm.is_finite() || width_mm < 0.0 {
            return;
        }
        self.min_corridor_width = Some(match self.min_corridor_width {
            Some(current) => current.min(width_mm),
            None => width_mm,
        });
    }

    pub fn min_corridor_width(&self) -> Option<f64> {
        self.min_corridor_width
    }

    pub fn events(&self) -> &[MotionEvent] {
        &self.events
    }

    /// Owned copy of the log, for building a map outside the lock.
    pub fn snapshot(&self) -> Vec<MotionEvent> {
        self.events.clone()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Wall offset for the map builder, in whole millimetres.
    ///
    /// Falls back to `default_mm` until a width has been recorded.
    pub fn corridor_half_width(&self, default_mm: i32, fraction: f64) -> i32 {
        match self.min_corridor_width {
            Some(width) => (width * fraction) as i32,
            None => default_mm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_width_keeps_minimum() {
        let mut store = CorridorStore::new();
        assert_eq!(store.min_corridor_width(), None);

        store.record_width(412.0);
        store.record_width(398.5);
        store.record_width(440.0);
        assert_eq!(store.min_corridor_width(), Some(398.5));
    }

    #[test]
    fn test_record_width_order_independent() {
        let samples = [512.0, 401.0, 450.0, 399.0, 600.0];

        let mut forward = CorridorStore::new();
        samples.iter().for_each(|&w| forward.record_width(w));

        let mut backward = CorridorStore::new();
        samples.iter().rev().for_each(|&w| backward.record_width(w));

        assert_eq!(forward.min_corridor_width(), backward.min_corridor_width());
        assert_eq!(forward.min_corridor_width(), Some(399.0));
    }

    #[test]
    fn test_record_width_ignores_invalid() {
        let mut store = CorridorStore::new();
        store.record_width(f64::INFINITY);
        store.record_width(f64::NAN);
        store.record_width(-5.0);
        assert_eq!(store.min_corridor_width(), None);

        store.record_width(400.0);
        store.record_width(f64::NAN);
        assert_eq!(store.min_corridor_width(), Some(400.0));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut store = CorridorStore::new();
        store.push(MotionEvent::Rotate { angle_degrees: 90 });
        store.push(MotionEvent::Travel { distance_mm: 800 });
        store.record_width(380.0);
        assert_eq!(store.len(), 2);

        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.min_corridor_width(), None);
    }

    #[test]
    fn test_half_width() {
        let mut store = CorridorStore::new();
        assert_eq!(store.corridor_half_width(200, 1.0), 200);

        store.record_width(401.7);
        assert_eq!(store.corridor_half_width(200, 1.0), 401);
        assert_eq!(store.corridor_half_width(200, 0.5), 200);
    }

    #[test]
    fn test_events_keep_order() {
        let mut store = CorridorStore::new();
        store.push(MotionEvent::Travel { distance_mm: 100 });
        store.push(MotionEvent::Rotate { angle_degrees: -90 });
        store.push(MotionEvent::Travel { distance_mm: 250 });

        assert_eq!(
            store.snapshot(),
            vec![
                MotionEvent::Travel { distance_mm: 100 },
                MotionEvent::Rotate { angle_degrees: -90 },
                MotionEvent::Travel { distance_mm: 250 },
            ]
        );
        assert!(store.events()[1].is_rotate());
    }
}
