//! Orchestrating core
//!
//! One [`MediaCore`] exists per media class. It owns the registered managers,
//! tracks the desired and current device of every lane, runs the
//! Idle/Preview/Stream state machine and serves the real-time frame path.
//!
//! Locking: control operations are serialized by a control mutex and mutate
//! the primary `state` mutex. The frame path never touches the control mutex
//! and holds `state` only long enough to copy out the manager it talks to.
//! Managers sit behind a read/write lock: transfers share it, so the two
//! audio output lanes never wait on each other, while control calls take it
//! exclusively. Locks are always taken in the order state, manager,
//! settings, hub.

mod frame;
mod hotplug;
mod mode;

pub use mode::{CoreMode, ModeError};

use crate::domain::device::{DeviceIdentity, Lane};
use crate::domain::events::{CoreEvent, EventHub};
use crate::domain::format::DeviceConfig;
use crate::domain::kind::{AudioInput, AudioOutput, CaptureKind, MediaKind, VideoInput};
use crate::domain::manager::{Manager, ManagerEvents, NullManager};
use crate::domain::preview::{FrameSink, PreviewPump};
use crate::domain::settings::{AudioSettings, SettingsBank, SettingsSnapshot};
use crate::sync::{lock, read, write};
use crossbeam::channel::Receiver;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, error, info, warn};

pub type AudioInputCore = MediaCore<AudioInput>;
pub type AudioOutputCore = MediaCore<AudioOutput>;
pub type VideoInputCore = MediaCore<VideoInput>;

/// Index of the primary lane, present in every kind
const PRIMARY: usize = 0;

type ManagerHandle<K> = Arc<RwLock<Box<dyn Manager<K>>>>;

struct Registered<K: MediaKind> {
    name: String,
    handle: ManagerHandle<K>,
}

struct LaneState<F> {
    lane: Lane,
    desired: DeviceIdentity,
    current: DeviceIdentity,
    /// Index into the registry, `None` only until the first resolution
    manager: Option<usize>,
    /// Config the device was opened with, `Some` while the device is live
    open: Option<DeviceConfig<F>>,
    /// Bumped on every open and close
    generation: u64,
}

/// What the frame path copies out of the primary lock
struct Ticket<K: MediaKind> {
    handle: ManagerHandle<K>,
    lane: Lane,
    generation: u64,
}

struct CoreState<K: MediaKind> {
    managers: Vec<Registered<K>>,
    lanes: Vec<LaneState<K::Format>>,
    preview: DeviceConfig<K::Format>,
    stream: DeviceConfig<K::Format>,
    /// Stream took over a running preview which must come back on stop
    resume_preview: bool,
}

impl<K: MediaKind> CoreState<K> {
    fn new() -> Self {
        let fallback = DeviceIdentity::fallback(K::CLASS);
        let lanes = K::LANES
            .iter()
            .map(|lane| LaneState {
                lane: *lane,
                desired: fallback.clone(),
                current: fallback.clone(),
                manager: None,
                open: None,
                generation: 0,
            })
            .collect();

        Self {
            managers: Vec::new(),
            lanes,
            preview: DeviceConfig::new(K::Format::default(), K::default_buffers()),
            stream: DeviceConfig::new(K::Format::default(), K::default_buffers()),
            resume_preview: false,
        }
    }

    /// Registry index of the last manager accepting `device`
    fn select(&self, lane: Lane, device: &DeviceIdentity) -> Option<usize> {
        let mut chosen = None;
        for (index, registered) in self.managers.iter().enumerate() {
            if write(&registered.handle).select(lane, device) {
                chosen = Some(index);
            }
        }
        chosen
    }

    /// Resolve the manager for `device`, substituting the fallback when no
    /// manager accepts it
    fn set_manager(&mut self, idx: usize, device: &DeviceIdentity) {
        let lane = self.lanes[idx].lane;
        let (manager, current) = match self.select(lane, device) {
            Some(manager) => (Some(manager), device.clone()),
            None => {
                warn!(class = %K::CLASS, lane = %lane, device = %device, "No manager accepts device, using fallback");
                let fallback = DeviceIdentity::fallback(K::CLASS);
                let manager = self.select(lane, &fallback);
                if manager.is_none() {
                    error!(class = %K::CLASS, lane = %lane, "No manager accepts the fallback device");
                }
                (manager, fallback)
            }
        };

        let slot = &mut self.lanes[idx];
        slot.manager = manager;
        slot.current = current;
        debug!(
            class = %K::CLASS,
            lane = %lane,
            device = %slot.current,
            manager = ?manager.map(|m| self.managers[m].name.as_str()),
            "Manager resolved"
        );
    }

    fn try_open(&self, idx: usize, config: &DeviceConfig<K::Format>) -> bool {
        let slot = &self.lanes[idx];
        let Some(manager) = slot.manager else {
            return false;
        };
        let mut manager = write(&self.managers[manager].handle);
        if !manager.open(slot.lane, &config.format) {
            return false;
        }
        manager.configure_buffers(slot.lane, &config.buffers);
        true
    }

    /// Open the lane's current device, failing over to the fallback once
    fn open(&mut self, idx: usize, config: &DeviceConfig<K::Format>) -> bool {
        if self.lanes[idx].open.is_some() {
            self.close(idx);
        }
        if self.lanes[idx].manager.is_none() {
            let desired = self.lanes[idx].desired.clone();
            self.set_manager(idx, &desired);
        }

        if !self.try_open(idx, config) {
            let lane = self.lanes[idx].lane;
            warn!(class = %K::CLASS, lane = %lane, device = %self.lanes[idx].current, "Failed to open device, using fallback");
            self.set_manager(idx, &DeviceIdentity::fallback(K::CLASS));
            if !self.try_open(idx, config) {
                error!(class = %K::CLASS, lane = %lane, "Failed to open the fallback device");
                return false;
            }
        }

        let slot = &mut self.lanes[idx];
        slot.open = Some(config.clone());
        slot.generation += 1;
        info!(
            class = %K::CLASS,
            lane = %slot.lane,
            device = %slot.current,
            frame_len = config.frame_len(),
            "Device opened"
        );
        true
    }

    fn close(&mut self, idx: usize) {
        let slot = &mut self.lanes[idx];
        if slot.open.take().is_none() {
            return;
        }
        slot.generation += 1;
        if let Some(manager) = slot.manager {
            write(&self.managers[manager].handle).close(slot.lane);
        }
        info!(class = %K::CLASS, lane = %slot.lane, device = %slot.current, "Device closed");
    }

    /// Re-resolve the desired device of an idle lane
    fn reresolve(&mut self, idx: usize) {
        let desired = self.lanes[idx].desired.clone();
        self.set_manager(idx, &desired);
    }

    fn ticket(&self, idx: usize) -> Option<Ticket<K>> {
        let slot = self.lanes.get(idx)?;
        slot.open.as_ref()?;
        let manager = slot.manager?;
        Some(Ticket {
            handle: Arc::clone(&self.managers[manager].handle),
            lane: slot.lane,
            generation: slot.generation,
        })
    }
}

struct PumpSlot<F> {
    pump: PreviewPump,
    sink: Arc<dyn FrameSink<F>>,
}

/// Device orchestrator for one media class
pub struct MediaCore<K: MediaKind> {
    control: Mutex<()>,
    state: Mutex<CoreState<K>>,
    settings: Arc<SettingsBank<K::Settings>>,
    hub: Arc<EventHub<K::Settings>>,
    yield_requested: AtomicBool,
    pump: Mutex<Option<PumpSlot<K::Format>>>,
}

impl<K: MediaKind> MediaCore<K> {
    /// Create a core with only the built-in [`NullManager`] registered
    pub fn new() -> Arc<Self> {
        let core = Arc::new(Self {
            control: Mutex::new(()),
            state: Mutex::new(CoreState::new()),
            settings: Arc::new(SettingsBank::new(K::LANES.len())),
            hub: Arc::new(EventHub::new()),
            yield_requested: AtomicBool::new(false),
            pump: Mutex::new(None),
        });
        core.add_manager(Box::new(NullManager::new(K::CLASS)));
        core
    }

    /// Serialize a control operation and ask the frame path to back off
    fn begin_control(&self) -> MutexGuard<'_, ()> {
        self.yield_requested.store(true, Ordering::Release);
        lock(&self.control)
    }

    fn lane_index(lane: Lane) -> Option<usize> {
        K::LANES.iter().position(|l| *l == lane)
    }

    fn known_lane(lane: Lane) -> Option<usize> {
        let idx = Self::lane_index(lane);
        if idx.is_none() {
            warn!(class = %K::CLASS, lane = %lane, "Lane not served by this core");
        }
        idx
    }

    /// Register a manager; the core owns it from now on
    pub fn add_manager(&self, mut manager: Box<dyn Manager<K>>) {
        let _control = self.begin_control();
        let name = manager.name().to_string();
        manager.attach(ManagerEvents::new(
            name.clone(),
            K::LANES,
            Arc::clone(&self.settings),
            Arc::clone(&self.hub),
        ));

        {
            let mut state = lock(&self.state);
            state.managers.push(Registered {
                name: name.clone(),
                handle: Arc::new(RwLock::new(manager)),
            });
            info!(class = %K::CLASS, manager = %name, "Manager registered");

            // A new manager may own a desired device that fell back earlier
            for idx in 0..state.lanes.len() {
                if state.lanes[idx].open.is_none() {
                    state.reresolve(idx);
                }
            }
        }

        self.hub.publish(CoreEvent::ManagerAdded { manager: name });
    }

    /// Names of the registered managers, in registration order
    pub fn managers(&self) -> Vec<String> {
        lock(&self.state)
            .managers
            .iter()
            .map(|registered| registered.name.clone())
            .collect()
    }

    /// Every device the registered managers see, without duplicates
    pub fn devices(&self) -> Vec<DeviceIdentity> {
        let handles: Vec<_> = lock(&self.state)
            .managers
            .iter()
            .map(|registered| Arc::clone(&registered.handle))
            .collect();

        let mut devices: Vec<DeviceIdentity> = Vec::new();
        for handle in handles {
            for device in read(&handle).enumerate() {
                if !devices.contains(&device) {
                    devices.push(device);
                }
            }
        }
        devices
    }

    /// Choose the device for `lane`, switching a live lane in place
    pub fn set_device(&self, lane: Lane, device: DeviceIdentity) {
        let _control = self.begin_control();
        let Some(idx) = Self::known_lane(lane) else {
            return;
        };
        info!(class = %K::CLASS, lane = %lane, device = %device, "Device selected");
        lock(&self.state).lanes[idx].desired = device.clone();
        self.switch_lane(idx, &device);
    }

    /// Move a lane to `device`: close, resolve, reopen with the same config.
    /// Caller holds the control lock.
    fn switch_lane(&self, idx: usize, device: &DeviceIdentity) {
        let live_preview = idx == PRIMARY && lock(&self.state).preview.active;
        if live_preview {
            self.pause_pump();
        }

        {
            let mut state = lock(&self.state);
            match state.lanes[idx].open.clone() {
                Some(config) => {
                    state.close(idx);
                    state.set_manager(idx, device);
                    state.open(idx, &config);
                }
                None => state.set_manager(idx, device),
            }
        }

        if live_preview {
            self.resume_pump();
        }
    }

    pub fn desired_device(&self, lane: Lane) -> DeviceIdentity {
        let state = lock(&self.state);
        Self::lane_index(lane)
            .map(|idx| state.lanes[idx].desired.clone())
            .unwrap_or_else(|| DeviceIdentity::fallback(K::CLASS))
    }

    pub fn current_device(&self, lane: Lane) -> DeviceIdentity {
        let state = lock(&self.state);
        Self::lane_index(lane)
            .map(|idx| state.lanes[idx].current.clone())
            .unwrap_or_else(|| DeviceIdentity::fallback(K::CLASS))
    }

    /// Name of the manager currently resolved for `lane`
    pub fn current_manager(&self, lane: Lane) -> Option<String> {
        let state = lock(&self.state);
        let idx = Self::lane_index(lane)?;
        let manager = state.lanes[idx].manager?;
        Some(state.managers[manager].name.clone())
    }

    /// Whether the device of `lane` is currently open
    pub fn is_open(&self, lane: Lane) -> bool {
        let state = lock(&self.state);
        Self::lane_index(lane).is_some_and(|idx| state.lanes[idx].open.is_some())
    }

    /// Store the desired settings; the frame path pushes them to the manager
    pub fn set_settings(&self, lane: Lane, values: K::Settings) {
        let Some(idx) = Self::known_lane(lane) else {
            return;
        };
        debug!(class = %K::CLASS, lane = %lane, settings = ?values, "Settings requested");
        self.settings.set_desired(idx, values);
    }

    pub fn settings(&self, lane: Lane) -> SettingsSnapshot<K::Settings> {
        self.settings
            .snapshot(Self::lane_index(lane).unwrap_or(usize::MAX))
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent<K::Settings>> {
        self.hub.subscribe()
    }

    /// Frames the preview pump has forwarded so far
    pub fn preview_frames(&self) -> u64 {
        lock(&self.pump)
            .as_ref()
            .map(|slot| slot.pump.frames())
            .unwrap_or(0)
    }

    fn pause_pump(&self) {
        if let Some(slot) = lock(&self.pump).as_ref() {
            if slot.pump.is_running() {
                slot.pump.stop();
                slot.sink.stop_sink();
            }
        }
    }

    /// Restart the pump if preview is active
    fn resume_pump(&self) {
        let config = {
            let state = lock(&self.state);
            if !state.preview.active {
                return;
            }
            state.preview.clone()
        };
        if let Some(slot) = lock(&self.pump).as_ref() {
            if !slot.pump.is_running() {
                slot.sink.start_sink(&config.format);
                slot.pump.start(config.frame_len());
            }
        }
    }
}

impl<K: MediaKind<Settings = AudioSettings>> MediaCore<K> {
    pub fn set_volume(&self, lane: Lane, volume: u32) {
        self.set_settings(lane, AudioSettings::new(volume));
    }

    /// Volume most recently requested for `lane`
    pub fn volume(&self, lane: Lane) -> Option<u32> {
        self.settings(lane).desired.map(|settings| settings.volume)
    }
}

impl<K: CaptureKind> MediaCore<K> {
    /// Install the output the preview pump feeds, replacing any previous one
    pub fn set_preview_sink(self: &Arc<Self>, sink: Arc<dyn FrameSink<K::Format>>) -> io::Result<()> {
        let _control = self.begin_control();

        let weak = Arc::downgrade(self);
        let target = Arc::clone(&sink);
        let pump = PreviewPump::spawn(&format!("{}-preview", K::CLASS.label()), move |frame| {
            if let Some(core) = weak.upgrade() {
                core.get_frame_data(frame);
                target.push_frame(frame);
            }
        })?;

        self.pause_pump();
        let previous = lock(&self.pump).replace(PumpSlot { pump, sink });
        drop(previous);
        self.resume_pump();
        Ok(())
    }
}

impl<K: MediaKind> Drop for MediaCore<K> {
    fn drop(&mut self) {
        self.pause_pump();
        let slot = self.pump.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        drop(slot);

        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for idx in 0..state.lanes.len() {
            state.close(idx);
        }
    }
}
