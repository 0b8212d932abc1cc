//! Always-available silent audio device
//!
//! Serves the audio fallback identity in both directions. Capture produces
//! silence and playback discards, both paced to the frame period so a caller
//! driving the core in a loop runs at the same rate it would against real
//! hardware.

use crate::pacing::Pacer;
use minstrel_core::domain::device::{DeviceIdentity, Lane};
use minstrel_core::domain::format::{AudioFormat, BufferConfig, StreamFormat};
use minstrel_core::domain::kind::MediaKind;
use minstrel_core::domain::manager::{Manager, ManagerEvents};
use minstrel_core::domain::settings::{AudioSettings, DeviceSettings};
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default)]
struct SilentLane {
    selected: bool,
    open: Option<AudioFormat>,
    pacer: Option<Pacer>,
    settings: AudioSettings,
}

pub struct SilentAudioManager<K> {
    fallback: DeviceIdentity,
    /// Locked per lane so both output lanes can pace side by side
    lanes: [Mutex<SilentLane>; 2],
    events: Option<ManagerEvents<AudioSettings>>,
    _kind: PhantomData<fn() -> K>,
}

fn slot(lane: Lane) -> usize {
    match lane {
        Lane::Primary => 0,
        Lane::Secondary => 1,
    }
}

/// Time one frame of `len` bytes lasts at `format`
fn frame_period(format: &AudioFormat, len: usize) -> Duration {
    let rate = format.bytes_per_second();
    if rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(len as f64 / rate as f64)
}

impl<K: MediaKind<Format = AudioFormat, Settings = AudioSettings>> SilentAudioManager<K> {
    pub fn new() -> Self {
        Self {
            fallback: DeviceIdentity::fallback(K::CLASS),
            lanes: Default::default(),
            events: None,
            _kind: PhantomData,
        }
    }

    fn lane(&self, lane: Lane) -> MutexGuard<'_, SilentLane> {
        self.lanes[slot(lane)].lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pace(&self, lane: Lane, len: usize) {
        let mut state = self.lane(lane);
        let Some(format) = state.open else {
            return;
        };
        let period = frame_period(&format, len);
        let pacer = state.pacer.get_or_insert_with(|| Pacer::new(period));
        if pacer.period() != period {
            pacer.set_period(period);
        }
        pacer.wait();
    }
}

impl<K: MediaKind<Format = AudioFormat, Settings = AudioSettings>> Default for SilentAudioManager<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: MediaKind<Format = AudioFormat, Settings = AudioSettings>> Manager<K> for SilentAudioManager<K> {
    fn name(&self) -> &str {
        "silent"
    }

    fn attach(&mut self, events: ManagerEvents<AudioSettings>) {
        self.events = Some(events);
    }

    fn enumerate(&self) -> Vec<DeviceIdentity> {
        vec![self.fallback.clone()]
    }

    fn select(&mut self, lane: Lane, device: &DeviceIdentity) -> bool {
        let accepted = *device == self.fallback;
        self.lane(lane).selected = accepted;
        accepted
    }

    fn open(&mut self, lane: Lane, format: &AudioFormat) -> bool {
        let mut state = self.lane(lane);
        if !state.selected {
            return false;
        }
        state.open = Some(*format);
        state.pacer = None;
        debug!(lane = %lane, format = ?format, "Silent device opened");

        if let Some(events) = &self.events {
            events.opened(lane, self.fallback.clone(), DeviceSettings::new(state.settings, true));
        }
        true
    }

    fn close(&mut self, lane: Lane) {
        let mut state = self.lane(lane);
        if state.open.take().is_none() {
            return;
        }
        state.pacer = None;
        if let Some(events) = &self.events {
            events.closed(lane, self.fallback.clone());
        }
    }

    fn configure_buffers(&mut self, lane: Lane, buffers: &BufferConfig) {
        let mut state = self.lane(lane);
        if let Some(format) = state.open {
            let period = frame_period(&format, format.frame_len(buffers));
            state.pacer = Some(Pacer::new(period));
        }
    }

    fn read_frame(&self, lane: Lane, frame: &mut [u8]) -> bool {
        self.pace(lane, frame.len());
        frame.fill(0);
        true
    }

    fn write_frame(&self, lane: Lane, frame: &[u8]) -> Option<usize> {
        self.pace(lane, frame.len());
        Some(frame.len())
    }

    fn apply_settings(&self, lane: Lane, settings: &AudioSettings) {
        self.lane(lane).settings = *settings;
    }

    fn owns(&self, source: &str, name: &str) -> Option<DeviceIdentity> {
        (self.fallback.source == source && self.fallback.name == name).then(|| self.fallback.clone())
    }
}
