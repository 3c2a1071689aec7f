//! motion-recorder: record a camera stream whenever the detector sees something
//!
//! Usage:
//!   motion-recorder run   --config config.toml   # sample and record until CTRL+C
//!   motion-recorder probe --config config.toml   # classify one frame and exit
//!
//! Without `--config`, settings come from MOTION_RECORDER_RTSP_URL,
//! MOTION_RECORDER_YOLO_API and MOTION_RECORDER_SAVE_PATH.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use motion_recorder::classifier::{Classifier, HttpClassifier};
use motion_recorder::config::Config;
use motion_recorder::manager::MotionRecorder;
use motion_recorder::sampler::{FfmpegSampler, FrameSource};

#[derive(Parser)]
#[command(name = "motion-recorder", about = "Motion-triggered camera recorder", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sample the stream and record on detection until interrupted.
    Run {
        /// Path to the TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Capture one frame, classify it and print the verdict.
    Probe {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => {
            run_record(config).await;
        }
        Command::Probe { config } => {
            if let Err(e) = run_probe(config).await {
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
        }
    }
}

async fn run_record(config_path: Option<PathBuf>) {
    let cfg = match Config::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        source = %cfg.stream.url,
        base_path = ?cfg.storage.base_path,
        interval_secs = cfg.sampling.interval_secs,
        "Starting motion recorder"
    );

    let recorder = match MotionRecorder::start(&cfg) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "Failed to start motion recorder");
            std::process::exit(1);
        }
    };

    // Wait for CTRL+C.
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received CTRL+C, shutting down…");
        }
        Err(e) => {
            error!(error = %e, "Signal error");
        }
    }

    recorder.shutdown().await;
}

async fn run_probe(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let cfg = Config::load(config_path.as_deref()).context("loading config")?;

    let sampler = FfmpegSampler::new(
        &cfg.ffmpeg.binary,
        Duration::from_secs(cfg.sampling.capture_timeout_secs),
    );
    let classifier = HttpClassifier::new(&cfg.classifier.endpoint)?;

    let frame = sampler
        .capture(&cfg.stream.url)
        .await
        .with_context(|| format!("capturing a frame from {}", cfg.stream.url))?;
    println!("Frame       : {} bytes", frame.len());

    let detected = classifier
        .classify(frame)
        .await
        .with_context(|| format!("classifying via {}", classifier.endpoint()))?;
    println!("Detection   : {}", if detected { "motion" } else { "nothing" });
    Ok(())
}
