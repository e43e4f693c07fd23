//! Error types for GatiMaze

use thiserror::Error;

use crate::store::MotionEvent;

/// GatiMaze error type
#[derive(Error, Debug)]
pub enum GatiError {
    /// A motion event that cannot be laid out on a rectilinear map.
    #[error("Invalid geometry at event {index} ({event:?}): {reason}")]
    InvalidGeometry {
        index: usize,
        event: MotionEvent,
        reason: String,
    },

    #[error("Sensor fault: {0}")]
    SensorFault(String),

    #[error(
        "Rotation did not converge: desired {desired}°, heading {heading}° after {attempts} attempts"
    )]
    ConvergenceFailure {
        desired: i64,
        heading: i64,
        attempts: usize,
    },

    #[error("Calibration failed: {0}")]
    CalibrationFailed(String),

    #[error("Cancelled by operator")]
    Cancelled,

    #[error("Invalid behavior priority: {0}")]
    InvalidPriority(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for GatiError {
    fn from(e: toml::de::Error) -> Self {
        GatiError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for GatiError {
    fn from(e: toml::ser::Error) -> Self {
        GatiError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatiError>;
