use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mecanum_zenoh_runtime::config::{DriveConfig, MOTOR_PORT};
use mecanum_zenoh_runtime::runtime::{self, Backend};

#[derive(Parser, Debug)]
#[command(version, about = "Mecanum base runtime: velocity commands in, wheel setpoints and odometry out")]
struct Args {
    /// JSON drive configuration; built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Drive a simulated base instead of the motor bus
    #[arg(long)]
    sim: bool,

    /// Serial port of the Feetech motor bus
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            info!("Loading drive config from {}", path.display());
            match DriveConfig::from_file(path) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Config error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => DriveConfig::default(),
    };

    let backend = if args.sim {
        Backend::Simulated
    } else {
        Backend::Feetech { port: args.port }
    };

    if let Err(e) = runtime::run(config, backend).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
