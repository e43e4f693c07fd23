//! GatiMaze - maze exploration and corridor mapping
//!
//! Runs one mapping session on the simulated robot:
//!
//! 1. Calibrate the gyro with a two-turn spin (skippable)
//! 2. Explore under the behavior arbiter until Ctrl-C or the time limit
//! 3. Build the corridor line map and save it as TOML

use clap::Parser;
use gati_maze::hardware::{ConsoleOperator, Operator};
use gati_maze::sim::Simulation;
use gati_maze::{Driver, GatiConfig, GatiError, Result};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const DEFAULT_CONFIG: &str = "gati.toml";

#[derive(Parser)]
#[command(name = "gati-maze")]
#[command(about = "Explore a maze with the simulated robot and save its corridor map")]
struct Args {
    /// Configuration file (falls back to ./gati.toml, then defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip gyro calibration
    #[arg(long)]
    skip_calibration: bool,

    /// Stop mapping after this many seconds (0 = until Ctrl-C)
    #[arg(short, long, default_value = "30")]
    duration_secs: u64,

    /// Prompt on the terminal during calibration instead of auto-confirming
    #[arg(long)]
    console_operator: bool,

    /// Override the map output path
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<GatiConfig> {
    match &args.config {
        Some(path) => GatiConfig::load(path),
        None if Path::new(DEFAULT_CONFIG).exists() => GatiConfig::load(Path::new(DEFAULT_CONFIG)),
        None => Ok(GatiConfig::default()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    info!("GatiMaze v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Speeds: {} mm/s linear, {}°/s angular, correction factor {}",
        config.motion.linear_speed, config.motion.angular_speed, config.motion.correction_factor
    );

    let sim = Simulation::realtime(&config.simulation, &config.robot)?;
    let mut driver = Driver::new(sim.hardware(), &config)?;

    if args.skip_calibration {
        info!("Skipping gyro calibration");
    } else {
        let mut operator: Box<dyn Operator> = if args.console_operator {
            Box::new(ConsoleOperator::stdin())
        } else {
            Box::new(sim.operator())
        };
        let scale = driver.calibrate(operator.as_mut())?;
        info!("Gyro calibration scale: {:.4}", scale);
    }

    let handle = driver.handle();
    let ctrlc_handle = handle.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        ctrlc_handle.stop_mapping();
    })
    .map_err(|e| GatiError::Io(std::io::Error::other(format!("Error setting Ctrl-C handler: {}", e))))?;

    if args.duration_secs > 0 {
        let limit = Duration::from_secs(args.duration_secs);
        let timer_handle = handle.clone();
        thread::Builder::new()
            .name("run-timer".to_string())
            .spawn(move || {
                thread::sleep(limit);
                info!("Time limit of {:?} reached", limit);
                timer_handle.stop_mapping();
            })?;
        info!("Mapping for up to {:?}. Press Ctrl-C to stop early.", limit);
    } else {
        info!("Mapping until Ctrl-C");
    }

    let map = match driver.start_mapping() {
        Ok(map) => map,
        Err(GatiError::Cancelled) => {
            warn!("Mapping cancelled before it started");
            return Ok(());
        }
        Err(e) => {
            error!("Mapping failed: {}", e);
            return Err(e);
        }
    };

    let pose = sim.pose();
    info!(
        "Robot finished at ({:.0}, {:.0}) mm, heading {:.1}°",
        pose.x, pose.y, pose.heading
    );
    info!(
        "Map: {} segments, bounds {}x{} mm",
        map.segment_count(),
        map.bounds.width(),
        map.bounds.height()
    );

    let map_path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.map_path));
    map.save(&map_path)?;
    info!("Map saved to {:?}", map_path);

    Ok(())
}
