//! Orchestrating core against the infra managers
//!
//! Covers fallback resolution, the mode state machine, the video handoff and
//! failover on the frame path while a stream is live.

use crate::support::{bus_device, wait_for, Counting, FlakyManager, FILL};
use minstrel_core::domain::context::MediaContext;
use minstrel_core::domain::device::{DeviceIdentity, Lane, MediaClass};
use minstrel_core::domain::events::CoreEvent;
use minstrel_core::domain::format::{BufferConfig, VideoFormat};
use minstrel_core::domain::kind::{AudioInput, AudioOutput};
use minstrel_core::domain::media::{AudioInputCore, AudioOutputCore, CoreMode, ModeError, VideoInputCore};
use minstrel_infra::{SilentAudioManager, SymphoniaClipLoader, TestPatternManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn microphone_core() -> (Arc<AudioInputCore>, Arc<crate::support::Switches>) {
    let core = AudioInputCore::new();
    core.add_manager(Box::new(SilentAudioManager::<AudioInput>::new()));
    let (flaky, switches) = FlakyManager::<AudioInput>::new(vec![bus_device("X")]);
    core.add_manager(flaky);
    (core, switches)
}

// ============================================================================
// DEVICE RESOLUTION
// ============================================================================

#[test]
fn test_unclaimed_device_resolves_to_silent_fallback() {
    let (core, _switches) = microphone_core();

    core.set_device(Lane::Primary, bus_device("Y"));
    assert!(core.current_device(Lane::Primary).is_fallback(MediaClass::AudioInput));
    assert_eq!(core.current_manager(Lane::Primary).as_deref(), Some("silent"));
    assert_eq!(core.desired_device(Lane::Primary), bus_device("Y"));
}

#[test]
fn test_device_list_spans_all_managers() {
    let (core, _switches) = microphone_core();
    let devices = core.devices();

    assert_eq!(devices[0], DeviceIdentity::fallback(MediaClass::AudioInput));
    assert!(devices.contains(&bus_device("X")));
    // Null and silent managers both report the fallback, listed once
    assert_eq!(devices.len(), 2);
}

#[test]
fn test_malformed_device_string_selects_fallback() {
    let (core, _switches) = microphone_core();
    core.set_device(
        Lane::Primary,
        DeviceIdentity::parse_or_fallback("no backend part", MediaClass::AudioInput),
    );
    assert!(core.current_device(Lane::Primary).is_fallback(MediaClass::AudioInput));
}

// ============================================================================
// MODE STATE MACHINE
// ============================================================================

#[test]
fn test_stream_rejected_while_microphone_previews() {
    let temp_dir = TempDir::new().unwrap();
    let context = MediaContext::new(Arc::new(SymphoniaClipLoader::new()), temp_dir.path().to_path_buf()).unwrap();
    minstrel_infra::register_fallback_managers(&context);

    context.audio_input.start_preview().unwrap();
    assert_eq!(context.audio_input.start_stream(), Err(ModeError::PreviewActive));
    assert_eq!(context.audio_input.mode(), CoreMode::Preview);

    // The speaker plays the monitored microphone
    assert_eq!(context.audio_output.mode(), CoreMode::Preview);
    assert!(wait_for(|| context.audio_input.preview_frames() >= 2));

    context.audio_input.stop_preview().unwrap();
    assert_eq!(context.audio_input.mode(), CoreMode::Idle);
    assert_eq!(context.audio_output.mode(), CoreMode::Idle);
}

fn camera() -> (Arc<VideoInputCore>, Arc<std::sync::atomic::AtomicUsize>, Arc<std::sync::atomic::AtomicUsize>) {
    let core = VideoInputCore::new();
    let (manager, opens, closes) = Counting::new(TestPatternManager::new());
    core.add_manager(manager);
    (core, opens, closes)
}

#[test]
fn test_video_handoff_without_reopen() {
    let (core, opens, closes) = camera();
    let qcif = VideoFormat::new(176, 144, 30);
    core.set_preview_config(qcif, BufferConfig::default());
    core.set_stream_config(qcif, BufferConfig::default());

    core.start_preview().unwrap();
    core.start_stream().unwrap();
    assert_eq!(core.mode(), CoreMode::Stream);
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 0);
    assert_eq!(core.current_manager(Lane::Primary).as_deref(), Some("test-pattern"));
}

#[test]
fn test_video_handoff_reopens_once_for_new_size() {
    let (core, opens, closes) = camera();
    core.set_preview_config(VideoFormat::new(176, 144, 30), BufferConfig::default());
    core.set_stream_config(VideoFormat::new(352, 288, 15), BufferConfig::default());

    core.start_preview().unwrap();
    core.start_stream().unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), 2);
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    let mut frame = vec![0; 352 * 288 * 3 / 2];
    assert_eq!(core.get_frame_data(&mut frame), frame.len());
    // First bar of the pattern is white
    assert_eq!(frame[0], 235);
}

// ============================================================================
// FAILOVER ON THE FRAME PATH
// ============================================================================

#[test]
fn test_live_device_removal_is_invisible_to_streaming_thread() {
    let (core, switches) = microphone_core();
    core.set_device(Lane::Primary, bus_device("X"));
    core.start_stream().unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let streamer = {
        let core = Arc::clone(&core);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut frame = vec![0; 320];
            let mut lengths = Vec::new();
            while running.load(Ordering::SeqCst) {
                lengths.push(core.get_frame_data(&mut frame));
            }
            lengths
        })
    };

    assert!(wait_for(|| switches.transfers.load(Ordering::SeqCst) >= 3));
    core.remove_device("bus", "X", "");
    assert!(core.current_device(Lane::Primary).is_fallback(MediaClass::AudioInput));
    assert_eq!(core.current_manager(Lane::Primary).as_deref(), Some("silent"));
    assert!(core.is_open(Lane::Primary));

    thread::sleep(Duration::from_millis(100));
    running.store(false, Ordering::SeqCst);
    let lengths = streamer.join().unwrap();
    assert!(!lengths.is_empty());
    assert!(lengths.iter().all(|len| *len == 320));
    assert_eq!(switches.closes(), 1);
}

#[test]
fn test_replugged_device_is_reclaimed() {
    let (core, switches) = microphone_core();
    core.set_device(Lane::Primary, bus_device("X"));
    core.start_stream().unwrap();
    let events = core.subscribe();

    core.remove_device("bus", "X", "flaky");
    assert!(core.current_device(Lane::Primary).is_fallback(MediaClass::AudioInput));

    core.add_device("bus", "X", "flaky");
    assert_eq!(core.current_device(Lane::Primary), bus_device("X"));
    assert_eq!(switches.opens(), 2);

    let received: Vec<_> = events.try_iter().collect();
    assert!(received.contains(&CoreEvent::DeviceRemoved {
        device: bus_device("X"),
        was_current: true,
    }));
    assert!(received.contains(&CoreEvent::DeviceAdded {
        device: bus_device("X"),
        is_desired: true,
    }));
}

#[test]
fn test_failing_capture_falls_back_to_silence() {
    let (core, switches) = microphone_core();
    core.set_device(Lane::Primary, bus_device("X"));
    core.start_stream().unwrap();

    let mut frame = vec![0; 320];
    assert_eq!(core.get_frame_data(&mut frame), 320);
    assert!(frame.iter().all(|b| *b == FILL));

    switches.fail_transfer.store(true, Ordering::SeqCst);
    for _ in 0..3 {
        assert_eq!(core.get_frame_data(&mut frame), 320);
        assert!(frame.iter().all(|b| *b == 0));
    }
    assert!(core.current_device(Lane::Primary).is_fallback(MediaClass::AudioInput));
    assert_eq!(core.mode(), CoreMode::Stream);
    assert_eq!(switches.closes(), 1);
}

#[test]
fn test_failing_playback_still_acknowledged() {
    let core = AudioOutputCore::new();
    core.add_manager(Box::new(SilentAudioManager::<AudioOutput>::new()));
    let (flaky, switches) = FlakyManager::<AudioOutput>::new(vec![bus_device("speaker")]);
    core.add_manager(flaky);
    core.set_device(Lane::Primary, bus_device("speaker"));
    core.start_stream().unwrap();

    switches.fail_transfer.store(true, Ordering::SeqCst);
    for _ in 0..3 {
        assert_eq!(core.set_frame_data(Lane::Primary, &[0; 320]), 320);
    }
    assert_eq!(core.current_manager(Lane::Primary).as_deref(), Some("silent"));
}
