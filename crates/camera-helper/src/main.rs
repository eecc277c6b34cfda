//! Camera Helper - Main Entry Point

use std::path::PathBuf;
use std::time::Duration;

use camera_helper::{default_output, init_logging, record_clip};
use camera_session::CameraSettings;
use clap::Parser;
use tracing::info;

/// Drive a camera preview and recording session
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Settings file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to record
    #[arg(short, long, default_value_t = 3)]
    seconds: u64,

    /// Destination of the clip (defaults to a timestamped name)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print the effective settings and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.json_logs)?;

    info!("=== Camera Helper v{} ===", env!("CARGO_PKG_VERSION"));

    let settings = CameraSettings::load(args.config.as_deref())?;
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    let output = args.output.unwrap_or_else(default_output);
    let saved = record_clip(&settings, Duration::from_secs(args.seconds), &output).await?;
    if !saved {
        return Err(format!("recording to {} failed", output.display()).into());
    }
    Ok(())
}
