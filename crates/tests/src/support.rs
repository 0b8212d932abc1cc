//! Test managers and helpers shared by the scenarios

use minstrel_core::domain::device::{DeviceIdentity, Lane};
use minstrel_core::domain::format::BufferConfig;
use minstrel_core::domain::kind::MediaKind;
use minstrel_core::domain::manager::{Manager, ManagerEvents};
use minstrel_core::domain::settings::DeviceSettings;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const FILL: u8 = 0x5A;

pub fn bus_device(name: &str) -> DeviceIdentity {
    DeviceIdentity::new("Flaky", "bus", name)
}

pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Switches and counters shared with a [`FlakyManager`]
#[derive(Default)]
pub struct Switches {
    pub fail_transfer: AtomicBool,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub transfers: AtomicUsize,
}

impl Switches {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Serves a fixed device list; transfers fail on demand
pub struct FlakyManager<K: MediaKind> {
    devices: Vec<DeviceIdentity>,
    selected: Option<DeviceIdentity>,
    events: Option<ManagerEvents<K::Settings>>,
    switches: Arc<Switches>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: MediaKind> FlakyManager<K> {
    pub fn new(devices: Vec<DeviceIdentity>) -> (Box<Self>, Arc<Switches>) {
        let switches = Arc::new(Switches::default());
        let manager = Box::new(Self {
            devices,
            selected: None,
            events: None,
            switches: Arc::clone(&switches),
            _kind: PhantomData,
        });
        (manager, switches)
    }
}

impl<K: MediaKind> Manager<K> for FlakyManager<K> {
    fn name(&self) -> &str {
        "flaky"
    }

    fn attach(&mut self, events: ManagerEvents<K::Settings>) {
        self.events = Some(events);
    }

    fn enumerate(&self) -> Vec<DeviceIdentity> {
        self.devices.clone()
    }

    fn select(&mut self, _lane: Lane, device: &DeviceIdentity) -> bool {
        let accepted = self.devices.contains(device);
        self.selected = accepted.then(|| device.clone());
        accepted
    }

    fn open(&mut self, lane: Lane, _format: &K::Format) -> bool {
        let Some(device) = self.selected.clone() else {
            return false;
        };
        self.switches.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(events) = &self.events {
            events.opened(lane, device, DeviceSettings::new(K::Settings::default(), true));
        }
        true
    }

    fn close(&mut self, lane: Lane) {
        self.switches.closes.fetch_add(1, Ordering::SeqCst);
        if let (Some(events), Some(device)) = (&self.events, self.selected.clone()) {
            events.closed(lane, device);
        }
    }

    fn read_frame(&self, _lane: Lane, frame: &mut [u8]) -> bool {
        if self.switches.fail_transfer.load(Ordering::SeqCst) {
            return false;
        }
        self.switches.transfers.fetch_add(1, Ordering::SeqCst);
        frame.fill(FILL);
        // Roughly one 10 ms frame period
        thread::sleep(Duration::from_millis(2));
        true
    }

    fn write_frame(&self, _lane: Lane, frame: &[u8]) -> Option<usize> {
        if self.switches.fail_transfer.load(Ordering::SeqCst) {
            return None;
        }
        self.switches.transfers.fetch_add(1, Ordering::SeqCst);
        Some(frame.len())
    }

    fn owns(&self, source: &str, name: &str) -> Option<DeviceIdentity> {
        self.devices
            .iter()
            .find(|d| d.source == source && d.name == name)
            .cloned()
    }
}

/// Wraps another manager, counting opens and closes
pub struct Counting<M> {
    inner: M,
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl<M> Counting<M> {
    pub fn new(inner: M) -> (Box<Self>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let manager = Box::new(Self {
            inner,
            opens: Arc::clone(&opens),
            closes: Arc::clone(&closes),
        });
        (manager, opens, closes)
    }
}

impl<K: MediaKind, M: Manager<K>> Manager<K> for Counting<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn attach(&mut self, events: ManagerEvents<K::Settings>) {
        self.inner.attach(events);
    }

    fn enumerate(&self) -> Vec<DeviceIdentity> {
        self.inner.enumerate()
    }

    fn select(&mut self, lane: Lane, device: &DeviceIdentity) -> bool {
        self.inner.select(lane, device)
    }

    fn open(&mut self, lane: Lane, format: &K::Format) -> bool {
        let opened = self.inner.open(lane, format);
        if opened {
            self.opens.fetch_add(1, Ordering::SeqCst);
        }
        opened
    }

    fn close(&mut self, lane: Lane) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close(lane);
    }

    fn configure_buffers(&mut self, lane: Lane, buffers: &BufferConfig) {
        self.inner.configure_buffers(lane, buffers);
    }

    fn read_frame(&self, lane: Lane, frame: &mut [u8]) -> bool {
        self.inner.read_frame(lane, frame)
    }

    fn write_frame(&self, lane: Lane, frame: &[u8]) -> Option<usize> {
        self.inner.write_frame(lane, frame)
    }

    fn apply_settings(&self, lane: Lane, settings: &K::Settings) {
        self.inner.apply_settings(lane, settings);
    }

    fn owns(&self, source: &str, name: &str) -> Option<DeviceIdentity> {
        self.inner.owns(source, name)
    }
}

/// Write a mono 16-bit PCM WAV file of `samples`
pub fn write_wav(path: &Path, sample_rate: u32, samples: &[i16]) {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + samples.len() * 2);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(path, out).unwrap();
}
