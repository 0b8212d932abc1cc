//! Audio event scheduler
//!
//! Plays short sound clips (ring tones, message beeps) on one-shot or
//! repeating timers without touching the call stream. A background worker
//! waits on the time-ordered queue and hands decoded clips to a
//! [`BufferPlayer`], normally the audio output core.
//!
//! The queue and the event catalog sit behind separate locks so catalog
//! edits never wait on a firing event.

use crate::domain::device::Lane;
use crate::domain::format::AudioFormat;
use crate::sync::{lock, wait, wait_timeout};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while loading a sound clip
#[derive(Debug, Error)]
pub enum ClipError {
    #[error("Clip not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to decode clip: {0}")]
    Decode(String),

    #[error("Unsupported clip: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, ClipError>;

/// Decoded, interleaved PCM ready for playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundClip {
    pub format: AudioFormat,
    pub data: Vec<u8>,
}

impl SoundClip {
    pub fn new(format: AudioFormat, data: Vec<u8>) -> Self {
        Self { format, data }
    }

    pub fn duration(&self) -> Duration {
        let rate = self.format.bytes_per_second();
        if rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.data.len() as f64 / rate as f64)
    }
}

/// Turns a file on disk into a [`SoundClip`]
pub trait ClipLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<SoundClip>;
}

/// Plays a whole clip, blocking until it has been handed to the device
pub trait BufferPlayer: Send + Sync {
    fn play_clip(&self, lane: Lane, clip: &SoundClip);
}

/// Catalog entry mapping an event name to the clip it plays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFileName {
    pub file_name: PathBuf,
    pub lane: Lane,
    pub enabled: bool,
}

impl EventFileName {
    pub fn new(file_name: impl Into<PathBuf>, lane: Lane, enabled: bool) -> Self {
        Self {
            file_name: file_name.into(),
            lane,
            enabled,
        }
    }
}

#[derive(Debug, Clone)]
struct QueuedEvent {
    name: String,
    is_file_name: bool,
    interval: Duration,
    remaining: u32,
    due: Instant,
}

#[derive(Debug, Default)]
struct Queue {
    events: Vec<QueuedEvent>,
    shutdown: bool,
}

impl Queue {
    /// Pull every entry due at `now`, requeueing the recurring ones
    fn take_due(&mut self, now: Instant) -> Vec<QueuedEvent> {
        let (mut ready, pending): (Vec<_>, Vec<_>) =
            mem::take(&mut self.events).into_iter().partition(|event| event.due <= now);
        self.events = pending;
        ready.sort_by_key(|event| event.due);

        for event in &ready {
            let remaining = event.remaining.saturating_sub(1);
            if remaining == 0 {
                continue;
            }
            let mut next = event.due + event.interval;
            if next <= now {
                next = now + event.interval;
            }
            self.events.push(QueuedEvent {
                remaining,
                due: next,
                ..event.clone()
            });
        }
        ready
    }

    fn next_due(&self) -> Option<Instant> {
        self.events.iter().map(|event| event.due).min()
    }
}

struct Shared {
    queue: Mutex<Queue>,
    signal: Condvar,
    catalog: Mutex<HashMap<String, EventFileName>>,
    player: Arc<dyn BufferPlayer>,
    loader: Arc<dyn ClipLoader>,
    data_dir: PathBuf,
}

impl Shared {
    fn run(&self) {
        loop {
            let ready = {
                let mut queue = lock(&self.queue);
                loop {
                    if queue.shutdown {
                        return;
                    }
                    let now = Instant::now();
                    match queue.next_due() {
                        Some(due) if due <= now => break,
                        Some(due) => queue = wait_timeout(&self.signal, queue, due - now),
                        None => queue = wait(&self.signal, queue),
                    }
                }
                queue.take_due(Instant::now())
            };

            for event in ready {
                self.fire(&event);
            }
        }
    }

    fn fire(&self, event: &QueuedEvent) {
        let (path, lane) = if event.is_file_name {
            (PathBuf::from(&event.name), Lane::Secondary)
        } else {
            match lock(&self.catalog).get(&event.name) {
                Some(entry) if entry.enabled => (entry.file_name.clone(), entry.lane),
                Some(_) => {
                    debug!(event = %event.name, "Event disabled, skipping");
                    return;
                }
                None => {
                    debug!(event = %event.name, "Unknown event, skipping");
                    return;
                }
            }
        };

        let clip = match self.load(&path) {
            Ok(clip) => clip,
            Err(e) => {
                warn!(event = %event.name, path = %path.display(), error = %e, "Failed to load clip");
                return;
            }
        };

        debug!(
            event = %event.name,
            lane = %lane,
            remaining = event.remaining - 1,
            "Firing event"
        );
        self.player.play_clip(lane, &clip);
    }

    /// Try the path as given, then under the installed data directory
    fn load(&self, path: &Path) -> Result<SoundClip> {
        let first = match self.loader.load(path) {
            Ok(clip) => return Ok(clip),
            Err(e) => e,
        };
        if path.is_absolute() {
            return Err(first);
        }
        debug!(path = %path.display(), error = %first, "Clip not loadable as given, trying data directory");
        self.loader.load(&self.data_dir.join(path))
    }
}

/// Background player of named and file-based sound events
pub struct EventScheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventScheduler {
    pub fn new(
        player: Arc<dyn BufferPlayer>,
        loader: Arc<dyn ClipLoader>,
        data_dir: PathBuf,
    ) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            signal: Condvar::new(),
            catalog: Mutex::new(HashMap::new()),
            player,
            loader,
            data_dir,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("event-scheduler".to_string())
            .spawn(move || worker_shared.run())?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.shared.data_dir
    }

    /// Queue `name` to fire now and then every `interval`, `repetitions`
    /// times in total (0 counts as 1)
    pub fn add_event_to_queue(&self, name: &str, is_file_name: bool, interval: Duration, repetitions: u32) {
        let event = QueuedEvent {
            name: name.to_string(),
            is_file_name,
            interval,
            remaining: repetitions.max(1),
            due: Instant::now(),
        };
        let mut queue = lock(&self.shared.queue);
        if queue.shutdown {
            warn!(event = %name, "Scheduler stopped, dropping event");
            return;
        }
        debug!(event = %name, is_file_name, interval_ms = interval.as_millis() as u64, repetitions = event.remaining, "Event queued");

        queue.events.push(event);
        drop(queue);
        self.shared.signal.notify_all();
    }

    /// Drop every queued entry named `name`, returning how many went away
    pub fn remove_event_from_queue(&self, name: &str) -> usize {
        let mut queue = lock(&self.shared.queue);
        let before = queue.events.len();
        queue.events.retain(|event| event.name != name);
        let removed = before - queue.events.len();
        if removed > 0 {
            debug!(event = %name, removed, "Event dequeued");
        }
        removed
    }

    pub fn play_event(&self, name: &str) {
        self.add_event_to_queue(name, false, Duration::ZERO, 1);
    }

    pub fn start_play_event(&self, name: &str, interval: Duration, repetitions: u32) {
        self.add_event_to_queue(name, false, interval, repetitions);
    }

    pub fn stop_play_event(&self, name: &str) -> usize {
        self.remove_event_from_queue(name)
    }

    /// Play a clip file once on the secondary lane
    pub fn play_file(&self, path: &Path) {
        self.add_event_to_queue(&path.to_string_lossy(), true, Duration::ZERO, 1);
    }

    /// Names of the queued entries, soonest first
    pub fn pending_events(&self) -> Vec<String> {
        let queue = lock(&self.shared.queue);
        let mut events: Vec<_> = queue.events.iter().collect();
        events.sort_by_key(|event| event.due);
        events.into_iter().map(|event| event.name.clone()).collect()
    }

    pub fn add_event(&self, name: &str, file_name: impl Into<PathBuf>, lane: Lane, enabled: bool) {
        lock(&self.shared.catalog).insert(name.to_string(), EventFileName::new(file_name, lane, enabled));
    }

    /// Set the clip of `name`; new entries play enabled on the secondary lane
    pub fn set_file_name(&self, name: &str, file_name: impl Into<PathBuf>) {
        let file_name = file_name.into();
        lock(&self.shared.catalog)
            .entry(name.to_string())
            .and_modify(|entry| entry.file_name = file_name.clone())
            .or_insert_with(|| EventFileName::new(file_name, Lane::Secondary, true));
    }

    /// Returns false when `name` is not in the catalog
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match lock(&self.shared.catalog).get_mut(name) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn set_lane(&self, name: &str, lane: Lane) -> bool {
        match lock(&self.shared.catalog).get_mut(name) {
            Some(entry) => {
                entry.lane = lane;
                true
            }
            None => false,
        }
    }

    pub fn file_name(&self, name: &str) -> Option<EventFileName> {
        lock(&self.shared.catalog).get(name).cloned()
    }

    /// Catalog contents sorted by event name
    pub fn events(&self) -> Vec<(String, EventFileName)> {
        let mut events: Vec<_> = lock(&self.shared.catalog)
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();
        events.sort_by(|a, b| a.0.cmp(&b.0));
        events
    }

    /// Stop the worker, waiting for an in-flight clip to finish
    pub fn stop(&self) {
        lock(&self.shared.queue).shutdown = true;
        self.shared.signal.notify_all();

        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            let _ = worker.join();
            info!("Event scheduler stopped");
        }
    }
}

impl Drop for EventScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
