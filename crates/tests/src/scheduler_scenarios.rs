//! Event scheduler timing and clip playback through the speaker core

use crate::support::{wait_for, write_wav};
use minstrel_core::domain::context::MediaContext;
use minstrel_core::domain::device::{DeviceIdentity, Lane, MediaClass};
use minstrel_core::domain::events::CoreEvent;
use minstrel_core::domain::format::AudioFormat;
use minstrel_core::domain::scheduler::{BufferPlayer, ClipError, ClipLoader, EventScheduler, SoundClip};
use minstrel_infra::SymphoniaClipLoader;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingPlayer {
    fired: Mutex<Vec<(Lane, Instant)>>,
}

impl RecordingPlayer {
    fn fired(&self) -> Vec<(Lane, Instant)> {
        self.fired.lock().unwrap().clone()
    }
}

impl BufferPlayer for RecordingPlayer {
    fn play_clip(&self, lane: Lane, _clip: &SoundClip) {
        self.fired.lock().unwrap().push((lane, Instant::now()));
    }
}

/// Serves a short beep for `beep.wav` only
struct BeepLoader;

impl ClipLoader for BeepLoader {
    fn load(&self, path: &Path) -> Result<SoundClip, ClipError> {
        if path.file_name().is_some_and(|name| name == "beep.wav") {
            Ok(SoundClip::new(AudioFormat::default(), vec![0; 320]))
        } else {
            Err(ClipError::NotFound(path.to_path_buf()))
        }
    }
}

fn scheduler(player: Arc<RecordingPlayer>) -> EventScheduler {
    EventScheduler::new(player, Arc::new(BeepLoader), "/usr/share/minstrel".into()).unwrap()
}

#[test]
fn test_repeating_event_fires_on_interval() {
    let player = Arc::new(RecordingPlayer::default());
    let scheduler = scheduler(Arc::clone(&player));
    scheduler.add_event("ring", "beep.wav", Lane::Secondary, true);

    scheduler.start_play_event("ring", Duration::from_millis(1000), 3);
    assert!(wait_for(|| player.fired().len() == 3));

    let fired = player.fired();
    for pair in fired.windows(2) {
        let gap = pair[1].1 - pair[0].1;
        assert!(
            gap >= Duration::from_millis(800) && gap <= Duration::from_millis(1400),
            "gap was {gap:?}"
        );
    }
    assert!(fired.iter().all(|(lane, _)| *lane == Lane::Secondary));
    assert!(scheduler.pending_events().is_empty());
}

#[test]
fn test_stopped_event_stops_repeating() {
    let player = Arc::new(RecordingPlayer::default());
    let scheduler = scheduler(Arc::clone(&player));
    scheduler.add_event("ring", "beep.wav", Lane::Primary, true);

    scheduler.start_play_event("ring", Duration::from_millis(200), 100);
    assert!(wait_for(|| !player.fired().is_empty()));
    assert_eq!(scheduler.stop_play_event("ring"), 1);

    let count = player.fired().len();
    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(player.fired().len(), count);
}

#[test]
fn test_disabled_event_is_silent() {
    let player = Arc::new(RecordingPlayer::default());
    let scheduler = scheduler(Arc::clone(&player));
    scheduler.add_event("message", "beep.wav", Lane::Secondary, false);

    scheduler.play_event("message");
    assert!(wait_for(|| scheduler.pending_events().is_empty()));
    std::thread::sleep(Duration::from_millis(100));
    assert!(player.fired().is_empty());

    assert!(scheduler.set_enabled("message", true));
    scheduler.play_event("message");
    assert!(wait_for(|| player.fired().len() == 1));
}

#[test]
fn test_clip_plays_through_speaker_primary() {
    let temp_dir = TempDir::new().unwrap();
    let samples: Vec<i16> = (0..800).map(|i| ((i % 16) * 512) as i16).collect();
    write_wav(&temp_dir.path().join("ding.wav"), 8000, &samples);

    let context = MediaContext::new(Arc::new(SymphoniaClipLoader::new()), temp_dir.path().to_path_buf()).unwrap();
    minstrel_infra::register_fallback_managers(&context);
    let events = context.audio_output.subscribe();

    // Relative names resolve under the data directory
    context.scheduler.add_event("message", "ding.wav", Lane::Secondary, true);
    context.scheduler.play_event("message");

    let fallback = DeviceIdentity::fallback(MediaClass::AudioOutput);
    let opened = events.recv_timeout(Duration::from_secs(3)).unwrap();
    assert!(matches!(
        opened,
        CoreEvent::DeviceOpened { ref manager, lane: Lane::Primary, ref device, .. }
            if manager == "silent" && *device == fallback
    ));
    let closed = events.recv_timeout(Duration::from_secs(3)).unwrap();
    assert_eq!(
        closed,
        CoreEvent::DeviceClosed {
            manager: "silent".to_string(),
            lane: Lane::Primary,
            device: fallback,
        }
    );
    assert!(!context.audio_output.is_open(Lane::Primary));
}
