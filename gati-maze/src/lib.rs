//! GatiMaze - gyro-corrected maze explorer
//!
//! A two-wheel robot explores a corridor maze under a small subsumption
//! arbiter, logs every rotation and straight run it makes, and rebuilds the
//! corridors as an axis-aligned line map when the run is stopped.
//!
//! ## Layout
//!
//! - [`heading`]: heading-hold controller with a background correction loop
//! - [`arbiter`] and [`behaviors`]: priority arbitration over the three
//!   exploration behaviors
//! - [`driver`]: mapping run orchestration and the motion log
//! - [`map`]: corridor map building from the motion log
//! - [`sim`]: simulated robot and maze for running without hardware

pub mod arbiter;
pub mod behaviors;
pub mod config;
pub mod driver;
pub mod error;
pub mod hardware;
pub mod heading;
pub mod map;
pub mod shared;
pub mod sim;
pub mod store;

pub use config::GatiConfig;
pub use driver::{Driver, DriverHandle, DriverMode, Pilot};
pub use error::{GatiError, Result};
pub use hardware::Hardware;
pub use heading::HeadingController;
pub use map::{CorridorMap, build_map};
pub use store::MotionEvent;
