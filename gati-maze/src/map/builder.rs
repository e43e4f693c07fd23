//! Corridor line-map construction from a motion log.
//!
//! Each travel is drawn as a pair of parallel walls offset by the corridor
//! half-width `r` on either side of the path. Where a travel meets a turn the
//! walls are stretched (outer side) or shortened (inner side) by `r` so that
//! consecutive corridors join at their corners:
//!
//! ```text
//!        line2 +-----------------
//!              |
//!              |   +-------------  line1
//!              |   |
//!        line1 |   | line2
//! ```
//!
//! The builder is pure: the same events and half-width always produce the
//! same map.

use super::types::{Bounds, CorridorMap, Point, Segment};
use crate::error::{GatiError, Result};
use crate::store::MotionEvent;

/// Wall pair emitted for one travel.
#[derive(Clone, Copy, Debug)]
struct WallPair {
    line1: Segment,
    line2: Segment,
}

/// Direction of a cardinal heading, or `None` for anything off-axis.
fn direction(heading: i32) -> Option<(i32, i32)> {
    match heading {
        0 => Some((0, 1)),
        90 => Some((1, 0)),
        180 => Some((0, -1)),
        270 => Some((-1, 0)),
        _ => None,
    }
}

/// Signed stretch contributed by a neighbouring rotation.
fn stretch(neighbor: Option<&MotionEvent>, r: i32) -> Option<i32> {
    match neighbor {
        Some(MotionEvent::Rotate { angle_degrees }) => angle_degrees.signum().checked_mul(r),
        _ => Some(0),
    }
}

/// Walls for a travel between two points, or `None` on overflow.
fn wall_pair(horizontal: bool, from: (i32, i32), to: (i32, i32), r: i32, s: i32, e: i32) -> Option<WallPair> {
    let ((x, y), (x2, y2)) = (from, to);
    let seg = |x1: Option<i32>, y1: Option<i32>, x2: Option<i32>, y2: Option<i32>| {
        Some(Segment::from_coords(x1?, y1?, x2?, y2?))
    };
    let pair = if horizontal {
        WallPair {
            line1: seg(x.checked_add(s), y.checked_sub(r), x2.checked_sub(e), y2.checked_sub(r))?,
            line2: seg(x.checked_sub(s), y.checked_add(r), x2.checked_add(e), y2.checked_add(r))?,
        }
    } else {
        WallPair {
            line1: seg(x.checked_sub(r), y.checked_sub(s), x2.checked_sub(r), y2.checked_add(e))?,
            line2: seg(x.checked_add(r), y.checked_add(s), x2.checked_add(r), y2.checked_sub(e))?,
        }
    };
    Some(pair)
}

/// Build a corridor map from `events` with walls `half_width` mm from the path.
pub fn build_map(events: &[MotionEvent], half_width: i32) -> Result<CorridorMap> {
    let r = half_width;
    let mut heading = 0i32;
    let mut cursor = Point::origin();
    let mut bounds = Bounds::from_point(cursor);
    let mut pairs: Vec<WallPair> = Vec::new();

    for (index, event) in events.iter().enumerate() {
        match *event {
            MotionEvent::Rotate { angle_degrees } => {
                if angle_degrees % 90 != 0 {
                    return Err(GatiError::InvalidGeometry {
                        index,
                        event: *event,
                        reason: format!("rotation of {}° is not a multiple of 90", angle_degrees),
                    });
                }
                heading = (heading + angle_degrees.rem_euclid(360)).rem_euclid(360);
            }
            MotionEvent::Travel { distance_mm } => {
                let (dx, dy) = direction(heading).ok_or_else(|| GatiError::InvalidGeometry {
                    index,
                    event: *event,
                    reason: format!("heading {}° is not cardinal", heading),
                })?;

                let overflow = || GatiError::InvalidGeometry {
                    index,
                    event: *event,
                    reason: "coordinates exceed the i32 millimetre range".to_string(),
                };

                let (x, y) = (cursor.x, cursor.y);
                let x2 = dx.checked_mul(distance_mm).and_then(|d| x.checked_add(d));
                let y2 = dy.checked_mul(distance_mm).and_then(|d| y.checked_add(d));
                let (Some(x2), Some(y2)) = (x2, y2) else {
                    return Err(overflow());
                };

                let s = stretch(index.checked_sub(1).and_then(|i| events.get(i)), r);
                let e = stretch(events.get(index + 1), r);
                let pair = match (s, e) {
                    (Some(s), Some(e)) => wall_pair(dx != 0, (x, y), (x2, y2), r, s, e),
                    _ => None,
                }
                .ok_or_else(overflow)?;

                for seg in [pair.line1, pair.line2] {
                    bounds.expand_to_include(seg.start);
                    bounds.expand_to_include(seg.end);
                }

                log::trace!(
                    "MapBuilder: travel {} at {}° -> ({}, {})",
                    distance_mm,
                    heading,
                    x2,
                    y2
                );
                cursor = Point::new(x2, y2);
                pairs.push(pair);
            }
        }
    }

    let mut segments: Vec<Segment> = pairs.iter().flat_map(|p| [p.line1, p.line2]).collect();

    if let (Some(first), Some(last)) = (pairs.first(), pairs.last())
        && pairs.len() >= 2
    {
        segments.push(Segment::new(first.line1.start, last.line1.end));
        segments.push(Segment::new(first.line2.start, last.line2.end));
    }

    log::debug!(
        "MapBuilder: {} events -> {} segments, half-width {} mm",
        events.len(),
        segments.len(),
        r
    );

    Ok(CorridorMap { bounds, segments })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn travel(distance_mm: i32) -> MotionEvent {
        MotionEvent::Travel { distance_mm }
    }

    fn rotate(angle_degrees: i32) -> MotionEvent {
        MotionEvent::Rotate { angle_degrees }
    }

    #[test]
    fn test_empty_log() {
        let map = build_map(&[], 200).unwrap();
        assert!(map.is_empty());
        assert_eq!(map.bounds, Bounds::default());
    }

    #[test]
    fn test_single_travel() {
        let map = build_map(&[travel(1000)], 200).unwrap();
        assert_eq!(
            map.segments,
            vec![
                Segment::from_coords(-200, 0, -200, 1000),
                Segment::from_coords(200, 0, 200, 1000),
            ]
        );
        assert_eq!(
            map.bounds,
            Bounds { min_x: -200, min_y: 0, max_x: 200, max_y: 1000 }
        );
    }

    #[test]
    fn test_right_corner() {
        let map = build_map(&[travel(1000), rotate(90), travel(500)], 200).unwrap();
        assert_eq!(
            map.segments,
            vec![
                // Inner wall shortened, outer wall stretched
                Segment::from_coords(-200, 0, -200, 1200),
                Segment::from_coords(200, 0, 200, 800),
                Segment::from_coords(200, 800, 500, 800),
                Segment::from_coords(-200, 1200, 500, 1200),
                // Closing pair
                Segment::from_coords(-200, 0, 500, 800),
                Segment::from_coords(200, 0, 500, 1200),
            ]
        );
        assert_eq!(
            map.bounds,
            Bounds { min_x: -200, min_y: 0, max_x: 500, max_y: 1200 }
        );
    }

    #[test]
    fn test_left_turn_heading_wraps() {
        // Left from 0 wraps to 270: travel goes towards -X
        let map = build_map(&[rotate(-90), travel(600)], 100).unwrap();
        assert_eq!(
            map.segments,
            vec![
                Segment::from_coords(-100, -100, -600, -100),
                Segment::from_coords(100, 100, -600, 100),
            ]
        );
        assert_eq!(map.bounds.min_x, -600);
        assert_eq!(map.bounds.max_x, 100);
    }

    #[test]
    fn test_non_cardinal_rotation_rejected() {
        let result = build_map(&[travel(100), rotate(45), travel(100)], 200);
        match result {
            Err(GatiError::InvalidGeometry { index, event, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(event, rotate(45));
            }
            other => panic!("expected InvalidGeometry, got {:?}", other),
        }
    }

    #[test]
    fn test_all_segments_axis_aligned_except_closing() {
        let events = [
            travel(800),
            rotate(90),
            travel(400),
            rotate(90),
            travel(800),
            rotate(-90),
            travel(400),
            rotate(270),
            rotate(-180),
            travel(300),
        ];
        let map = build_map(&events, 200).unwrap();
        let walls = map.segment_count() - 2;
        assert!(map.segments[..walls].iter().all(|s| s.is_axis_aligned()));
        assert_eq!(walls, 10);
    }

    #[test]
    fn test_bounds_contain_every_endpoint() {
        let events = [travel(1200), rotate(-90), travel(400), rotate(-90), travel(900)];
        let map = build_map(&events, 180).unwrap();
        for seg in &map.segments {
            assert!(map.bounds.contains(seg.start));
            assert!(map.bounds.contains(seg.end));
        }
        assert!(map.bounds.contains(Point::origin()));
    }

    #[test]
    fn test_build_is_pure() {
        let events = [travel(500), rotate(90), travel(500), rotate(90), travel(500)];
        let a = build_map(&events, 200).unwrap();
        let b = build_map(&events, 200).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_consecutive_rotations_no_stretch_between() {
        // Stretch comes only from immediate neighbours
        let map = build_map(&[rotate(90), rotate(90), travel(100)], 50).unwrap();
        // Heading 180, preceded by a right rotation: s = 50
        assert_eq!(
            map.segments,
            vec![
                Segment::from_coords(-50, -50, -50, -100),
                Segment::from_coords(50, 50, 50, -100),
            ]
        );
    }

    #[test]
    fn test_huge_rotation_reduced_before_adding() {
        // 2147483610 is a multiple of 90 equal to 90 mod 360
        let events = [travel(10), rotate(90), rotate(2147483610), travel(10)];
        let map = build_map(&events, 200).unwrap();
        // Heading 180: the second travel runs back to the origin
        let second = map.segments[2];
        assert_eq!(second.start.x, second.end.x);
        assert_eq!(second.end, Point::new(-200, 0));
    }

    #[test]
    fn test_coordinate_overflow_rejected() {
        match build_map(&[travel(i32::MAX), travel(1)], 200) {
            Err(GatiError::InvalidGeometry { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidGeometry, got {:?}", other),
        }
        // The corner stretch alone pushes past i32::MAX
        match build_map(&[travel(i32::MAX - 10), rotate(90)], 200) {
            Err(GatiError::InvalidGeometry { index, .. }) => assert_eq!(index, 0),
            other => panic!("expected InvalidGeometry, got {:?}", other),
        }
    }
}
