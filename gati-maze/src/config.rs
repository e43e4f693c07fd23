//! Configuration loading for GatiMaze
//!
//! All sections are optional in the TOML file; missing fields fall back to
//! the values the EV3 build was tuned with.

use crate::behaviors::BehaviorKind;
use crate::error::{GatiError, Result};
use crate::heading::GyroOrientation;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct GatiConfig {
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub behaviors: BehaviorConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Robot physical parameters
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RobotConfig {
    /// Lateral offset of each drive wheel from the chassis centre (mm)
    #[serde(default = "default_wheel_offset")]
    pub wheel_offset_mm: f32,

    /// Distance between the two side-facing ultrasonic sensors (mm)
    #[serde(default = "default_sensor_gap")]
    pub sensor_gap_mm: f32,

    /// Mounting orientation of the gyro sensor
    #[serde(default)]
    pub gyro_orientation: GyroOrientation,
}

/// Heading controller tuning
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MotionConfig {
    /// Nominal linear speed (mm/s)
    #[serde(default = "default_linear_speed")]
    pub linear_speed: f32,

    /// Nominal angular speed for rotations (deg/s)
    #[serde(default = "default_angular_speed")]
    pub angular_speed: f32,

    /// Angular speed used for the 720° calibration spin (deg/s)
    #[serde(default = "default_calibration_speed")]
    pub calibration_speed: f32,

    /// Speed multiplier applied to the wheels on the side that is ahead
    #[serde(default = "default_correction_factor")]
    pub correction_factor: f32,

    /// Heading correction tick (ms)
    #[serde(default = "default_correction_interval")]
    pub correction_interval_ms: u64,

    /// Maximum angular speed for convergence retries (deg/s)
    #[serde(default = "default_retry_speed_cap")]
    pub retry_speed_cap: f32,

    /// Retries after the first rotation attempt before giving up
    #[serde(default = "default_max_convergence_retries")]
    pub max_convergence_retries: usize,

    /// Accepted |heading - desired| after a rotation (degrees)
    #[serde(default)]
    pub heading_tolerance: i64,

    /// Settle delay per retry level (ms)
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Delay between heading samples while rotating (ms)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Consecutive unreadable heading samples tolerated while rotating
    #[serde(default = "default_max_consecutive_faults")]
    pub max_consecutive_faults: usize,

    /// Consecutive faults before a warning is logged
    #[serde(default = "default_fault_warn_threshold")]
    pub fault_warn_threshold: usize,

    /// Lowest calibration scale accepted
    #[serde(default = "default_min_calibration_scale")]
    pub min_calibration_scale: f64,

    /// Highest calibration scale accepted
    #[serde(default = "default_max_calibration_scale")]
    pub max_calibration_scale: f64,
}

/// Behavior and arbitration parameters
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BehaviorConfig {
    /// Side distance above which the left side counts as open (m)
    #[serde(default = "default_clearance_threshold")]
    pub clearance_threshold_m: f32,

    /// Corridor width sampling period while advancing (ms)
    #[serde(default = "default_width_sample_interval")]
    pub width_sample_interval_ms: u64,

    /// Arbiter scheduling cycle (ms)
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_ms: u64,

    /// Return from arbitration once no behavior wants control
    #[serde(default = "default_return_when_inactive")]
    pub return_when_inactive: bool,

    /// Rotation performed after a front contact (degrees, positive = right)
    #[serde(default = "default_avoid_turn")]
    pub avoid_turn_degrees: f64,

    /// Rotation performed into an open side (degrees, negative = left)
    #[serde(default = "default_explore_turn")]
    pub explore_turn_degrees: f64,

    /// Behavior priority, lowest first
    #[serde(default = "default_priority")]
    pub priority: Vec<BehaviorKind>,
}

/// Map building parameters
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MappingConfig {
    /// Wall offset used when no corridor width was recorded (mm)
    #[serde(default = "default_half_width")]
    pub default_half_width_mm: i32,

    /// Fraction of the narrowest recorded width used as the wall offset
    #[serde(default = "default_wall_offset_fraction")]
    pub wall_offset_fraction: f64,
}

/// Simulated robot and maze
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Maze rows, top row first: `#` wall, `.` floor, `S` start (facing up)
    #[serde(default = "default_maze")]
    pub maze: Vec<String>,

    /// Edge length of one maze cell (mm)
    #[serde(default = "default_cell_size")]
    pub cell_size_mm: f32,

    /// Simulation time multiplier (2.0 = twice real time)
    #[serde(default = "default_speed_factor")]
    pub speed_factor: f64,

    /// Raw gyro degrees reported per true degree
    #[serde(default = "default_gyro_drift")]
    pub gyro_drift: f64,

    /// Rotation momentum carried past a stop command (seconds of angular velocity)
    #[serde(default = "default_coast_secs")]
    pub coast_secs: f64,

    /// Ultrasonic range limit (m); beyond it the sensor reports infinity
    #[serde(default = "default_max_range")]
    pub max_range_m: f32,

    /// Distance ahead of the chassis centre at which the bumper closes (mm)
    #[serde(default = "default_contact_reach")]
    pub contact_reach_mm: f32,

    /// Distance ahead of the chassis centre that cannot enter a wall (mm)
    #[serde(default = "default_body_reach")]
    pub body_reach_mm: f32,

    /// How far behind the chassis centre the side sensors sit (mm)
    #[serde(default = "default_side_sensor_setback")]
    pub side_sensor_setback_mm: f32,
}

/// Output configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Path to save the corridor map (TOML)
    #[serde(default = "default_map_path")]
    pub map_path: String,
}

/// Logging configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default log filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            wheel_offset_mm: default_wheel_offset(),
            sensor_gap_mm: default_sensor_gap(),
            gyro_orientation: GyroOrientation::default(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            linear_speed: default_linear_speed(),
            angular_speed: default_angular_speed(),
            calibration_speed: default_calibration_speed(),
            correction_factor: default_correction_factor(),
            correction_interval_ms: default_correction_interval(),
            retry_speed_cap: default_retry_speed_cap(),
            max_convergence_retries: default_max_convergence_retries(),
            heading_tolerance: 0,
            retry_backoff_ms: default_retry_backoff(),
            poll_interval_ms: default_poll_interval(),
            max_consecutive_faults: default_max_consecutive_faults(),
            fault_warn_threshold: default_fault_warn_threshold(),
            min_calibration_scale: default_min_calibration_scale(),
            max_calibration_scale: default_max_calibration_scale(),
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            clearance_threshold_m: default_clearance_threshold(),
            width_sample_interval_ms: default_width_sample_interval(),
            cycle_interval_ms: default_cycle_interval(),
            return_when_inactive: default_return_when_inactive(),
            avoid_turn_degrees: default_avoid_turn(),
            explore_turn_degrees: default_explore_turn(),
            priority: default_priority(),
        }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            default_half_width_mm: default_half_width(),
            wall_offset_fraction: default_wall_offset_fraction(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            maze: default_maze(),
            cell_size_mm: default_cell_size(),
            speed_factor: default_speed_factor(),
            gyro_drift: default_gyro_drift(),
            coast_secs: default_coast_secs(),
            max_range_m: default_max_range(),
            contact_reach_mm: default_contact_reach(),
            body_reach_mm: default_body_reach(),
            side_sensor_setback_mm: default_side_sensor_setback(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            map_path: default_map_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_wheel_offset() -> f32 {
    80.0
}
fn default_sensor_gap() -> f32 {
    150.0
}
fn default_linear_speed() -> f32 {
    100.0
}
fn default_angular_speed() -> f32 {
    30.0
}
fn default_calibration_speed() -> f32 {
    30.0
}
fn default_correction_factor() -> f32 {
    0.8
}
fn default_correction_interval() -> u64 {
    5
}
fn default_retry_speed_cap() -> f32 {
    10.0
}
fn default_max_convergence_retries() -> usize {
    16
}
fn default_retry_backoff() -> u64 {
    1
}
fn default_poll_interval() -> u64 {
    1
}
fn default_max_consecutive_faults() -> usize {
    200
}
fn default_fault_warn_threshold() -> usize {
    20
}
fn default_min_calibration_scale() -> f64 {
    0.5
}
fn default_max_calibration_scale() -> f64 {
    2.0
}

// Behavior defaults
fn default_clearance_threshold() -> f32 {
    0.3
}
fn default_width_sample_interval() -> u64 {
    20
}
fn default_cycle_interval() -> u64 {
    10
}
fn default_return_when_inactive() -> bool {
    true
}
fn default_avoid_turn() -> f64 {
    90.0
}
fn default_explore_turn() -> f64 {
    -90.0
}
fn default_priority() -> Vec<BehaviorKind> {
    vec![
        BehaviorKind::Advance,
        BehaviorKind::AvoidAndTurn,
        BehaviorKind::ExploreOpenSide,
    ]
}

// Mapping defaults
fn default_half_width() -> i32 {
    200
}
fn default_wall_offset_fraction() -> f64 {
    1.0
}

// Simulation defaults
fn default_maze() -> Vec<String> {
    [
        "#######", //
        "#.....#", //
        "#.###.#", //
        "#.#...#", //
        "#S#.###", //
        "#######",
    ]
    .iter()
    .map(|row| row.to_string())
    .collect()
}
fn default_cell_size() -> f32 {
    400.0
}
fn default_speed_factor() -> f64 {
    4.0
}
fn default_gyro_drift() -> f64 {
    1.02
}
fn default_coast_secs() -> f64 {
    0.05
}
fn default_max_range() -> f32 {
    2.55
}
fn default_contact_reach() -> f32 {
    110.0
}
fn default_body_reach() -> f32 {
    90.0
}
fn default_side_sensor_setback() -> f32 {
    150.0
}

fn default_map_path() -> String {
    "output/maze_map.toml".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl GatiConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GatiError::Config(format!("Failed to read config file: {}", e)))?;
        let config: GatiConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.motion.correction_factor) {
            return Err(GatiError::Config(format!(
                "correction_factor must be within 0..=1, got {}",
                self.motion.correction_factor
            )));
        }
        if self.motion.min_calibration_scale > self.motion.max_calibration_scale {
            return Err(GatiError::Config(
                "min_calibration_scale exceeds max_calibration_scale".to_string(),
            ));
        }
        if self.behaviors.priority.is_empty() {
            return Err(GatiError::Config("priority list is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatiConfig::default();
        assert_eq!(config.robot.sensor_gap_mm, 150.0);
        assert_eq!(config.motion.correction_factor, 0.8);
        assert_eq!(config.behaviors.clearance_threshold_m, 0.3);
        assert_eq!(config.mapping.default_half_width_mm, 200);
        assert_eq!(
            config.behaviors.priority,
            vec![
                BehaviorKind::Advance,
                BehaviorKind::AvoidAndTurn,
                BehaviorKind::ExploreOpenSide
            ]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let toml_content = r#"
[motion]
linear_speed = 150.0
heading_tolerance = 1

[behaviors]
priority = ["advance", "explore_open_side", "avoid_and_turn"]

[logging]
level = "debug"
"#;

        let config: GatiConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.motion.linear_speed, 150.0);
        assert_eq!(config.motion.heading_tolerance, 1);
        // Untouched fields keep their defaults
        assert_eq!(config.motion.angular_speed, 30.0);
        assert_eq!(config.behaviors.priority[2], BehaviorKind::AvoidAndTurn);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.simulation.maze.len(), 6);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gati.toml");

        let mut config = GatiConfig::default();
        config.robot.gyro_orientation = GyroOrientation::GlyphBottom;
        config.mapping.wall_offset_fraction = 0.5;
        config.to_file(&path).unwrap();

        let loaded = GatiConfig::load(&path).unwrap();
        assert_eq!(loaded.robot.gyro_orientation, GyroOrientation::GlyphBottom);
        assert_eq!(loaded.mapping.wall_offset_fraction, 0.5);
    }

    #[test]
    fn test_validate_rejects_bad_correction_factor() {
        let mut config = GatiConfig::default();
        config.motion.correction_factor = 1.5;
        assert!(matches!(config.validate(), Err(GatiError::Config(_))));
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let config: GatiConfig = toml::from_str(include_str!("../gati.toml")).unwrap();
        assert!(config.validate().is_ok());
        let defaults = GatiConfig::default();
        assert_eq!(config.simulation.maze, defaults.simulation.maze);
        assert_eq!(config.behaviors.priority, defaults.behaviors.priority);
        assert_eq!(config.output.map_path, defaults.output.map_path);
    }

    #[test]
    fn test_load_missing_file() {
        let result = GatiConfig::load(Path::new("/nonexistent/gati.toml"));
        assert!(matches!(result, Err(GatiError::Config(_))));
    }
}
