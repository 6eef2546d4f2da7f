// Runs the swerve runtime against simulated hardware
//
// Usage: diffswerve-runtime --config robot.json --left-y 0.8 --duration-secs 3
//
// The config file is a flat JSON object of the configuration keys; zero
// offsets are saved back into it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use diffswerve_runtime::config::{JsonConfigFile, KeyValueStore, SwerveConfig, offset_key};
use diffswerve_runtime::hardware::sim::sim_hardware;
use diffswerve_runtime::messages::{ControllerState, Pov};
use diffswerve_runtime::runtime;

#[derive(Parser)]
#[command(name = "diffswerve-runtime")]
#[command(about = "Differential swerve drive runtime (simulated hardware)")]
struct Args {
    /// Flat JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override a configuration key, e.g. --set wheel_angle_kP=6
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Left stick x, [-1, 1]
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    left_x: f64,

    /// Left stick y, [-1, 1]
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    left_y: f64,

    /// Trigger rotation, positive turns clockwise
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    rotate: f64,

    /// D-pad direction in degrees, engages heading hold
    #[arg(long)]
    pov: Option<i32>,

    /// Zero every module at startup
    #[arg(long)]
    zero_all: bool,

    /// How long to run
    #[arg(long, default_value_t = 2.0)]
    duration_secs: f64,

    /// Print the final status as JSON
    #[arg(long)]
    json_status: bool,
}

fn controller_state(args: &Args) -> ControllerState {
    ControllerState {
        left_x: args.left_x,
        left_y: args.left_y,
        right_trigger: args.rotate.max(0.0),
        left_trigger: (-args.rotate).max(0.0),
        pov: args.pov.map(Pov::from_degrees).unwrap_or_default(),
        start_released: false,
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let file = args
        .config
        .as_ref()
        .map(|path| JsonConfigFile::load(path))
        .transpose()?;

    // overrides apply to this run only, they are never written back
    let mut values: BTreeMap<String, String> =
        file.as_ref().map(|f| f.values().clone()).unwrap_or_default();
    for entry in &args.overrides {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(format!("--set expects KEY=VALUE, got {:?}", entry).into());
        };
        values.insert(key.trim().to_string(), value.trim().to_string());
    }

    let config = SwerveConfig::from_store(&values)?;
    info!(
        "Loaded config: {} modules, kP={}, max motor speed {} rad/s",
        config.modules.len(),
        config.angle_gains.kp,
        config.max_motor_speed
    );
    for geometry in &config.modules {
        if values.get_value(&offset_key(&geometry.name)).is_none() {
            warn!("Module {} has no saved zero offset", geometry.name);
        }
    }

    let names: Vec<String> = config.modules.iter().map(|m| m.name.clone()).collect();
    let (mut hardware, sim) = sim_hardware(&names, config.steering_gear_ratio);
    if let Some(store) = file {
        hardware.zero_store = Box::new(store);
    }
    sim.input.set(controller_state(&args));

    let handle = runtime::start(config, hardware)?;
    if args.zero_all {
        handle.request_zero_all();
    }

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs_f64(args.duration_secs.max(0.0))) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    let status = handle.status();
    handle.stop().await?;

    for (name, module) in names.iter().zip(&sim.modules) {
        info!(
            "Module {}: azimuth {:.3} rot, writes {}",
            name,
            module.azimuth(),
            module.write_count()
        );
    }
    if args.json_status {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        info!("Final status: {:?}", status);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Setup logging (set RUST_LOG=info or debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(args).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
