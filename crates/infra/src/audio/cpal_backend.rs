//! CPAL-based audio manager
//!
//! One manager per direction. Devices are identified as
//! `"<name> (CPAL/<host>)"`, e.g. `"USB Headset (CPAL/ALSA)"`.

use crate::audio::stream::{Direction, Pipe, StreamHandle};
use cpal::traits::{DeviceTrait, HostTrait};
use crossbeam::channel::RecvTimeoutError;
use minstrel_core::domain::device::{DeviceIdentity, Lane, MediaClass};
use minstrel_core::domain::format::{AudioFormat, BufferConfig};
use minstrel_core::domain::kind::MediaKind;
use minstrel_core::domain::manager::{DeviceErrorCode, Manager, ManagerEvents};
use minstrel_core::domain::settings::{AudioSettings, DeviceSettings};
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const CPAL_TYPE: &str = "CPAL";

/// A stream that delivers nothing for this long is treated as lost
const STALL_TIMEOUT: Duration = Duration::from_millis(500);

/// Sample chunks queued between the stream callback and the manager
const DEFAULT_QUEUE_DEPTH: usize = 8;

struct LaneStream {
    device: DeviceIdentity,
    handle: StreamHandle,
    /// Captured bytes not yet handed out
    pending: Vec<u8>,
}

#[derive(Default)]
struct CpalLane {
    selected: Option<DeviceIdentity>,
    stream: Option<LaneStream>,
    settings: AudioSettings,
    queue_depth: usize,
}

pub struct CpalAudioManager<K> {
    direction: Direction,
    host_name: String,
    /// Locked per lane; the two output lanes stream independently
    lanes: [Mutex<CpalLane>; 2],
    events: Option<ManagerEvents<AudioSettings>>,
    _kind: PhantomData<fn() -> K>,
}

fn slot(lane: Lane) -> usize {
    match lane {
        Lane::Primary => 0,
        Lane::Secondary => 1,
    }
}

/// Software gain with the default volume as unity
fn gain(settings: &AudioSettings) -> f32 {
    settings.gain() / AudioSettings::default().gain()
}

fn scale(sample: i16, gain: f32) -> i16 {
    (sample as f32 * gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

impl<K: MediaKind<Format = AudioFormat, Settings = AudioSettings>> CpalAudioManager<K> {
    pub fn new() -> Self {
        let direction = match K::CLASS {
            MediaClass::AudioOutput => Direction::Playback,
            _ => Direction::Capture,
        };
        let host = cpal::default_host();
        let host_name = host.id().name().to_string();
        debug!("Using audio host: {:?}", host.id());

        let lane = || {
            Mutex::new(CpalLane {
                queue_depth: DEFAULT_QUEUE_DEPTH,
                ..CpalLane::default()
            })
        };
        Self {
            direction,
            host_name,
            lanes: [lane(), lane()],
            events: None,
            _kind: PhantomData,
        }
    }

    fn lane(&self, lane: Lane) -> MutexGuard<'_, CpalLane> {
        self.lanes[slot(lane)].lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn device_names(&self) -> Vec<String> {
        let host = cpal::default_host();
        let devices = match self.direction {
            Direction::Capture => host.input_devices().map(|d| d.collect::<Vec<_>>()),
            Direction::Playback => host.output_devices().map(|d| d.collect::<Vec<_>>()),
        };
        match devices {
            Ok(devices) => devices
                .iter()
                .filter_map(|device| {
                    #[allow(deprecated)]
                    let name = device.name().ok();
                    name
                })
                .collect(),
            Err(e) => {
                warn!("Failed to enumerate {} devices: {}", self.direction, e);
                Vec::new()
            }
        }
    }

    fn identity(&self, name: &str) -> DeviceIdentity {
        DeviceIdentity::new(CPAL_TYPE, self.host_name.clone(), name)
    }

    /// Report `stream` as gone; the next transfer fails
    fn lose(&self, lane: Lane, stream: &LaneStream, code: DeviceErrorCode) {
        stream.handle.mark_lost();
        if let Some(events) = &self.events {
            events.error(lane, stream.device.clone(), code);
        }
    }
}

impl<K: MediaKind<Format = AudioFormat, Settings = AudioSettings>> Default for CpalAudioManager<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: MediaKind<Format = AudioFormat, Settings = AudioSettings>> Manager<K> for CpalAudioManager<K> {
    fn name(&self) -> &str {
        "cpal"
    }

    fn attach(&mut self, events: ManagerEvents<AudioSettings>) {
        self.events = Some(events);
    }

    fn enumerate(&self) -> Vec<DeviceIdentity> {
        let devices: Vec<_> = self
            .device_names()
            .iter()
            .map(|name| self.identity(name))
            .collect();
        info!("Found {} {} devices", devices.len(), self.direction);
        devices
    }

    /// Claims every identity of this host; a device that is gone fails at open
    fn select(&mut self, lane: Lane, device: &DeviceIdentity) -> bool {
        let accepted = device.device_type == CPAL_TYPE && device.source == self.host_name;
        self.lane(lane).selected = accepted.then(|| device.clone());
        accepted
    }

    fn open(&mut self, lane: Lane, format: &AudioFormat) -> bool {
        let mut state = self.lane(lane);
        let Some(device) = state.selected.clone() else {
            return false;
        };
        if format.bits_per_sample != 16 {
            warn!(device = %device, bits = format.bits_per_sample, "Only 16-bit PCM is supported");
            return false;
        }

        let handle = match StreamHandle::spawn(self.direction, &device.name, *format, state.queue_depth) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(device = %device, error = %e, "Failed to open stream");
                return false;
            }
        };

        state.stream = Some(LaneStream {
            device: device.clone(),
            handle,
            pending: Vec::new(),
        });
        if let Some(events) = &self.events {
            events.opened(lane, device, DeviceSettings::new(state.settings, true));
        }
        true
    }

    fn close(&mut self, lane: Lane) {
        let Some(stream) = self.lane(lane).stream.take() else {
            return;
        };
        let device = stream.device.clone();
        drop(stream);
        info!(device = %device, "Stream closed");
        if let Some(events) = &self.events {
            events.closed(lane, device);
        }
    }

    fn configure_buffers(&mut self, lane: Lane, buffers: &BufferConfig) {
        if buffers.count > 0 {
            // The queue is sized when the stream opens
            self.lane(lane).queue_depth = buffers.count;
            debug!(lane = %lane, count = buffers.count, "Queue depth applies from the next open");
        }
    }

    fn read_frame(&self, lane: Lane, frame: &mut [u8]) -> bool {
        let mut state = self.lane(lane);
        let gain = gain(&state.settings);
        let Some(stream) = state.stream.as_mut() else {
            return false;
        };
        if stream.handle.is_lost() {
            return false;
        }

        while stream.pending.len() < frame.len() {
            let Pipe::Capture(rx) = stream.handle.pipe() else {
                return false;
            };
            match rx.recv_timeout(STALL_TIMEOUT) {
                Ok(chunk) => {
                    for sample in chunk {
                        stream.pending.extend_from_slice(&scale(sample, gain).to_le_bytes());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.lose(lane, stream, DeviceErrorCode::Read);
                    return false;
                }
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }

        frame.copy_from_slice(&stream.pending[..frame.len()]);
        stream.pending.drain(..frame.len());
        true
    }

    fn write_frame(&self, lane: Lane, frame: &[u8]) -> Option<usize> {
        let state = self.lane(lane);
        let gain = gain(&state.settings);
        let stream = state.stream.as_ref()?;
        let Pipe::Playback(tx) = stream.handle.pipe() else {
            return None;
        };
        if stream.handle.is_lost() {
            return None;
        }

        let chunk: Vec<i16> = frame
            .chunks_exact(2)
            .map(|pair| scale(i16::from_le_bytes([pair[0], pair[1]]), gain))
            .collect();
        if tx.send_timeout(chunk, STALL_TIMEOUT).is_err() {
            self.lose(lane, stream, DeviceErrorCode::Write);
            return None;
        }
        Some(frame.len())
    }

    fn apply_settings(&self, lane: Lane, settings: &AudioSettings) {
        debug!(lane = %lane, volume = settings.volume, "Software gain updated");
        self.lane(lane).settings = *settings;
    }

    /// Hot-plug notices usually arrive after the OS dropped the device, so
    /// the identity is built without looking the name up
    fn owns(&self, source: &str, name: &str) -> Option<DeviceIdentity> {
        (source == self.host_name && !name.is_empty()).then(|| self.identity(name))
    }
}
