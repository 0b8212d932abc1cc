//! Example demonstrating configuration loading and the media context
//!
//! Run with: cargo run --package minstrel-core --example config_demo

use minstrel_core::domain::config::MinstrelConfig;
use minstrel_core::domain::context::MediaContext;
use minstrel_core::domain::device::Lane;
use minstrel_core::domain::format::AudioFormat;
use minstrel_core::domain::scheduler::{ClipLoader, SoundClip};
use std::path::Path;
use std::sync::Arc;

/// Loader that hands out one second of silence for any file name
struct SilenceLoader;

impl ClipLoader for SilenceLoader {
    fn load(&self, _path: &Path) -> minstrel_core::domain::scheduler::Result<SoundClip> {
        let format = AudioFormat::default();
        let len = format.bytes_per_second();
        Ok(SoundClip::new(format, vec![0; len]))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("minstrel_core=debug,info")
        .init();

    println!("=== Minstrel Configuration Demo ===\n");

    println!("1. Creating factory default configuration...");
    let config = MinstrelConfig::factory_default();
    println!("   Configured {} sound events", config.events.len());

    println!("\n2. Saving and reloading configuration...");
    let config_path = "demo_config.toml";
    config.save_to_file(config_path).await?;
    let loaded = MinstrelConfig::load_from_file(config_path).await?;
    println!("   Round trip equal: {}", loaded == config);

    println!("\n3. Applying configuration to a media context...");
    let context = MediaContext::new(Arc::new(SilenceLoader), loaded.app.data_dir.clone())?;
    loaded.apply(&context);
    for (name, entry) in context.scheduler.events() {
        println!(
            "   {} -> {} on {} lane",
            name,
            entry.file_name.display(),
            entry.lane
        );
    }

    println!("\n4. Devices per class:");
    println!("   audio in:  {}", context.audio_input.current_device(Lane::Primary));
    println!("   audio out: {}", context.audio_output.current_device(Lane::Primary));
    println!("   video in:  {}", context.video_input.current_device(Lane::Primary));

    std::fs::remove_file(config_path)?;
    println!("\n=== Demo complete ===");
    Ok(())
}
