//! Configuration files applied to a live media context

use minstrel_core::domain::config::{ConfigManager, MinstrelConfig};
use minstrel_core::domain::context::MediaContext;
use minstrel_core::domain::device::{DeviceIdentity, Lane, MediaClass};
use minstrel_core::domain::format::VideoFormat;
use minstrel_infra::SymphoniaClipLoader;
use std::sync::Arc;
use tempfile::TempDir;

fn context(temp_dir: &TempDir) -> MediaContext {
    let context = MediaContext::new(Arc::new(SymphoniaClipLoader::new()), temp_dir.path().to_path_buf()).unwrap();
    minstrel_infra::register_fallback_managers(&context);
    context
}

#[tokio::test]
async fn test_first_run_writes_and_applies_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let manager = ConfigManager::new(temp_dir.path().join("minstrel"));
    assert!(!manager.exists());

    let config = manager.load().await;
    assert_eq!(config, MinstrelConfig::factory_default());
    assert!(manager.exists());

    let context = context(&temp_dir);
    config.apply(&context);

    let events = context.scheduler.events();
    assert_eq!(events.len(), 4);
    let (name, first) = &events[0];
    assert_eq!(name, "busy_tone");
    assert_eq!(first.lane, Lane::Primary);
    assert!(context.scheduler.file_name("incoming_call").is_some_and(|e| e.lane == Lane::Secondary));

    for lane in [Lane::Primary, Lane::Secondary] {
        assert!(context
            .audio_output
            .current_device(lane)
            .is_fallback(MediaClass::AudioOutput));
    }
}

#[tokio::test]
async fn test_unknown_devices_fall_back_but_stay_desired() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[audio_input]
device = "Desk Mic (ALSA/hw:2)"

[audio_output]
primary_device = "not a device string"

[video_input]
device = "Webcam (V4L2//dev/video0)"
width = 320
height = 240
fps = 10
"#,
    )
    .unwrap();

    let config = ConfigManager::with_path(path.clone()).load().await;
    assert_eq!(config.video_input.format(), VideoFormat::new(320, 240, 10));

    let context = context(&temp_dir);
    config.apply(&context);

    let mic = &context.audio_input;
    assert_eq!(mic.desired_device(Lane::Primary), DeviceIdentity::new("ALSA", "hw:2", "Desk Mic"));
    assert!(mic.current_device(Lane::Primary).is_fallback(MediaClass::AudioInput));

    // A malformed string is the fallback outright
    assert!(context
        .audio_output
        .desired_device(Lane::Primary)
        .is_fallback(MediaClass::AudioOutput));

    assert_eq!(context.video_input.stream_config().format, VideoFormat::new(320, 240, 10));
    assert_eq!(context.video_input.current_manager(Lane::Primary).as_deref(), Some("test-pattern"));
}

#[tokio::test]
async fn test_corrupt_file_is_backed_up() {
    let temp_dir = TempDir::new().unwrap();
    let manager = ConfigManager::new(temp_dir.path().to_path_buf());
    std::fs::write(manager.config_path(), "[audio_input\nvolume = ").unwrap();

    let config = manager.load().await;
    assert_eq!(config, MinstrelConfig::factory_default());

    let backup = temp_dir.path().join("config.toml.corrupt");
    assert_eq!(std::fs::read_to_string(backup).unwrap(), "[audio_input\nvolume = ");
}

#[tokio::test]
async fn test_invalid_values_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let manager = ConfigManager::new(temp_dir.path().to_path_buf());
    std::fs::write(manager.config_path(), "[video_input]\nfps = 0\n").unwrap();

    assert_eq!(manager.load().await, MinstrelConfig::factory_default());
    assert!(temp_dir.path().join("config.toml.corrupt").exists());
}
