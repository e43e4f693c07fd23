//! Corridor map model and builder.

mod builder;
mod types;

pub use builder::build_map;
pub use types::{Bounds, CorridorMap, Point, Segment};
