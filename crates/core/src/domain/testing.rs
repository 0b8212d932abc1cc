//! Scripted manager shared by the unit tests

use crate::domain::device::{DeviceIdentity, Lane};
use crate::domain::format::BufferConfig;
use crate::domain::kind::MediaKind;
use crate::domain::manager::{Manager, ManagerEvents};
use crate::domain::settings::DeviceSettings;
use crate::sync::lock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) struct Record<K: MediaKind> {
    pub opens: Vec<(Lane, DeviceIdentity, K::Format)>,
    pub closes: Vec<(Lane, DeviceIdentity)>,
    pub buffers: Vec<(Lane, BufferConfig)>,
    pub applied: Vec<K::Settings>,
    pub written: Vec<u8>,
    pub reads: usize,
}

/// What a [`ScriptedManager`] saw, plus switches to make it misbehave
pub(crate) struct Recorder<K: MediaKind> {
    record: Mutex<Record<K>>,
    pub fail_open: AtomicBool,
    pub fail_transfer: AtomicBool,
}

impl<K: MediaKind> Recorder<K> {
    fn new() -> Self {
        Self {
            record: Mutex::new(Record {
                opens: Vec::new(),
                closes: Vec::new(),
                buffers: Vec::new(),
                applied: Vec::new(),
                written: Vec::new(),
                reads: 0,
            }),
            fail_open: AtomicBool::new(false),
            fail_transfer: AtomicBool::new(false),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&Record<K>) -> R) -> R {
        f(&lock(&self.record))
    }

    pub fn open_count(&self) -> usize {
        self.with(|r| r.opens.len())
    }

    pub fn close_count(&self) -> usize {
        self.with(|r| r.closes.len())
    }

    pub fn set_fail_transfer(&self, fail: bool) {
        self.fail_transfer.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }
}

/// Manager serving a fixed device list and filling reads with one byte
pub(crate) struct ScriptedManager<K: MediaKind> {
    name: String,
    devices: Vec<DeviceIdentity>,
    selected: [Option<DeviceIdentity>; 2],
    events: Option<ManagerEvents<K::Settings>>,
    recorder: Arc<Recorder<K>>,
    fill: u8,
}

fn slot(lane: Lane) -> usize {
    match lane {
        Lane::Primary => 0,
        Lane::Secondary => 1,
    }
}

impl<K: MediaKind> ScriptedManager<K> {
    pub fn new(name: &str, devices: Vec<DeviceIdentity>) -> (Box<Self>, Arc<Recorder<K>>) {
        let recorder = Arc::new(Recorder::new());
        let manager = Box::new(Self {
            name: name.to_string(),
            devices,
            selected: [None, None],
            events: None,
            recorder: Arc::clone(&recorder),
            fill: 0xAB,
        });
        (manager, recorder)
    }

    fn device(&self, lane: Lane) -> DeviceIdentity {
        self.selected[slot(lane)]
            .clone()
            .unwrap_or_else(|| DeviceIdentity::fallback(K::CLASS))
    }
}

impl<K: MediaKind> Manager<K> for ScriptedManager<K> {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&mut self, events: ManagerEvents<K::Settings>) {
        self.events = Some(events);
    }

    fn enumerate(&self) -> Vec<DeviceIdentity> {
        self.devices.clone()
    }

    fn select(&mut self, lane: Lane, device: &DeviceIdentity) -> bool {
        if self.devices.contains(device) {
            self.selected[slot(lane)] = Some(device.clone());
            true
        } else {
            false
        }
    }

    fn open(&mut self, lane: Lane, format: &K::Format) -> bool {
        if self.recorder.fail_open.load(Ordering::SeqCst) {
            return false;
        }
        let device = self.device(lane);
        lock(&self.recorder.record)
            .opens
            .push((lane, device.clone(), format.clone()));
        if let Some(events) = &self.events {
            events.opened(lane, device, DeviceSettings::new(K::Settings::default(), true));
        }
        true
    }

    fn close(&mut self, lane: Lane) {
        let device = self.device(lane);
        lock(&self.recorder.record).closes.push((lane, device.clone()));
        if let Some(events) = &self.events {
            events.closed(lane, device);
        }
    }

    fn configure_buffers(&mut self, lane: Lane, buffers: &BufferConfig) {
        lock(&self.recorder.record).buffers.push((lane, *buffers));
    }

    fn read_frame(&self, _lane: Lane, frame: &mut [u8]) -> bool {
        if self.recorder.fail_transfer.load(Ordering::SeqCst) {
            return false;
        }
        frame.fill(self.fill);
        lock(&self.recorder.record).reads += 1;
        true
    }

    fn write_frame(&self, _lane: Lane, frame: &[u8]) -> Option<usize> {
        if self.recorder.fail_transfer.load(Ordering::SeqCst) {
            return None;
        }
        lock(&self.recorder.record).written.extend_from_slice(frame);
        Some(frame.len())
    }

    fn apply_settings(&self, _lane: Lane, settings: &K::Settings) {
        lock(&self.recorder.record).applied.push(settings.clone());
    }

    fn owns(&self, source: &str, name: &str) -> Option<DeviceIdentity> {
        self.devices
            .iter()
            .find(|device| device.source == source && device.name == name)
            .cloned()
    }
}
