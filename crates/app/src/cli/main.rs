//! Minstrel CLI Application

use anyhow::Context;
use clap::{Parser, Subcommand};
use minstrel_core::domain::config::{ConfigManager, MinstrelConfig};
use minstrel_core::domain::context::MediaContext;
use minstrel_core::domain::device::{DeviceIdentity, Lane};
use minstrel_core::domain::format::VideoFormat;
use minstrel_core::domain::preview::FrameSink;
use minstrel_infra::SymphoniaClipLoader;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "minstrel")]
#[command(about = "Media device orchestration for softphones", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the devices of every media class
    Devices {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run the microphone-to-speaker or video preview
    Preview {
        /// Preview the camera instead of the microphone
        #[arg(long)]
        video: bool,

        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },

    /// Play a configured sound event or a clip file
    Play {
        event_or_file: String,

        #[arg(long, default_value_t = 1)]
        repeat: u32,

        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },

    /// Print the effective configuration
    Config {
        /// Rewrite the configuration with factory defaults
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Serialize)]
struct ClassDevices {
    current: DeviceIdentity,
    devices: Vec<DeviceIdentity>,
}

#[derive(Serialize)]
struct DeviceReport {
    audio_input: ClassDevices,
    audio_output: ClassDevices,
    video_input: ClassDevices,
}

/// Counts frames reaching the video renderer
#[derive(Default)]
struct FrameCounter {
    frames: AtomicU64,
}

impl FrameSink<VideoFormat> for FrameCounter {
    fn start_sink(&self, format: &VideoFormat) {
        println!("Video preview {}x{} @ {} fps", format.width, format.height, format.fps);
    }

    fn push_frame(&self, _frame: &[u8]) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}

fn config_manager(path: Option<PathBuf>) -> anyhow::Result<ConfigManager> {
    match path {
        Some(path) => Ok(ConfigManager::with_path(path)),
        None => Ok(ConfigManager::new(ConfigManager::default_config_dir()?)),
    }
}

fn build_context(config: &MinstrelConfig) -> anyhow::Result<MediaContext> {
    let context = MediaContext::new(Arc::new(SymphoniaClipLoader::new()), config.app.data_dir.clone())
        .context("Failed to start media context")?;
    minstrel_infra::register_default_managers(&context);
    config.apply(&context);
    Ok(context)
}

fn list_devices(context: &MediaContext, json: bool) -> anyhow::Result<()> {
    let report = DeviceReport {
        audio_input: ClassDevices {
            current: context.audio_input.current_device(Lane::Primary),
            devices: context.audio_input.devices(),
        },
        audio_output: ClassDevices {
            current: context.audio_output.current_device(Lane::Primary),
            devices: context.audio_output.devices(),
        },
        video_input: ClassDevices {
            current: context.video_input.current_device(Lane::Primary),
            devices: context.video_input.devices(),
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for (label, class) in [
        ("Audio input", &report.audio_input),
        ("Audio output", &report.audio_output),
        ("Video input", &report.video_input),
    ] {
        println!("{label}:");
        for device in &class.devices {
            let marker = if *device == class.current { "*" } else { " " };
            println!("  {marker} {device}");
        }
    }
    Ok(())
}

async fn preview(context: &MediaContext, video: bool, seconds: u64) -> anyhow::Result<()> {
    if video {
        let counter = Arc::new(FrameCounter::default());
        context.set_video_sink(counter.clone())?;
        context.video_input.start_preview()?;

        for second in 1..=seconds {
            tokio::time::sleep(Duration::from_secs(1)).await;
            println!("{second}s: {} frames", counter.frames.load(Ordering::Relaxed));
        }
        context.video_input.stop_preview()?;
    } else {
        println!(
            "Monitoring {} on {}",
            context.audio_input.current_device(Lane::Primary),
            context.audio_output.current_device(Lane::Primary)
        );
        context.audio_input.start_preview()?;
        tokio::time::sleep(Duration::from_secs(seconds)).await;
        context.audio_input.stop_preview()?;
    }
    Ok(())
}

async fn play(context: &MediaContext, target: &str, repeat: u32, interval: Duration) {
    let scheduler = &context.scheduler;
    let is_event = scheduler.file_name(target).is_some();
    if !is_event && !Path::new(target).exists() {
        tracing::warn!(name = target, "Not a configured event or an existing file, trying the data directory");
    }
    scheduler.add_event_to_queue(target, !is_event, interval, repeat);

    while !scheduler.pending_events().is_empty() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    // Waits for the last clip to finish
    scheduler.stop();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    tracing::info!("Minstrel starting...");

    let manager = config_manager(cli.config)?;

    if let Command::Config { reset } = cli.command {
        let config = if reset {
            manager.reset().await?
        } else {
            manager.load().await
        };
        println!("# {}", manager.config_path().display());
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let config = manager.load().await;
    let context = build_context(&config)?;

    match cli.command {
        Command::Devices { json } => list_devices(&context, json)?,
        Command::Preview { video, seconds } => preview(&context, video, seconds).await?,
        Command::Play {
            event_or_file,
            repeat,
            interval_ms,
        } => play(&context, &event_or_file, repeat, Duration::from_millis(interval_ms)).await,
        Command::Config { .. } => {}
    }

    Ok(())
}
