//! Backend manager contract
//!
//! A manager wraps one capture/playback framework. The core owns every
//! registered manager and only ever talks to the hardware through this trait.
//! Managers are driven per [`Lane`] so a single backend instance can serve
//! both audio output lanes; capture managers only ever see `Lane::Primary`.
//!
//! Control calls take `&mut self` and are exclusive. Frame transfers and
//! settings updates take `&self` and may run concurrently on different
//! lanes, so a manager keeps its per-lane transfer state behind its own lock.

use crate::domain::device::{DeviceIdentity, Lane, MediaClass};
use crate::domain::events::{CoreEvent, EventHub};
use crate::domain::format::BufferConfig;
use crate::domain::kind::MediaKind;
use crate::domain::settings::{DeviceKnobs, DeviceSettings, SettingsBank};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Asynchronous device failures reported by managers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceErrorCode {
    #[error("driver error")]
    Driver,

    #[error("device unavailable")]
    Device,

    #[error("device busy")]
    Busy,

    #[error("invalid stream parameters")]
    Invalid,

    #[error("read failed")]
    Read,

    #[error("write failed")]
    Write,

    #[error("{0}")]
    Other(String),
}

/// Capability contract every backend implements
pub trait Manager<K: MediaKind>: Send + Sync {
    /// Short backend name used in logs and notifications
    fn name(&self) -> &str;

    /// Receive the handle used to emit opened/closed/error notifications
    fn attach(&mut self, _events: ManagerEvents<K::Settings>) {}

    /// Devices this backend currently sees
    fn enumerate(&self) -> Vec<DeviceIdentity>;

    /// Remember `device` for `lane` if this backend can drive it. No I/O.
    fn select(&mut self, lane: Lane, device: &DeviceIdentity) -> bool;

    /// Open the selected device. Returning false is a hard failure.
    fn open(&mut self, lane: Lane, format: &K::Format) -> bool;

    fn close(&mut self, lane: Lane);

    /// Best-effort buffering hint, applied after a successful open
    fn configure_buffers(&mut self, _lane: Lane, _buffers: &BufferConfig) {}

    /// Fill `frame` from the capture device; false means the device is lost
    fn read_frame(&self, _lane: Lane, _frame: &mut [u8]) -> bool {
        false
    }

    /// Hand `frame` to the playback device; `None` means the device is lost
    fn write_frame(&self, _lane: Lane, _frame: &[u8]) -> Option<usize> {
        None
    }

    /// Best-effort volume / picture control update
    fn apply_settings(&self, _lane: Lane, _settings: &K::Settings) {}

    /// Hot-plug correlation: the identity this backend gives to `source`/`name`
    fn owns(&self, source: &str, name: &str) -> Option<DeviceIdentity>;
}

/// Floor manager every core registers first
///
/// Owns the class fallback identity: captures zeros and swallows playback
/// without pacing. Managers registered later that also claim the fallback
/// take precedence over it.
pub struct NullManager {
    class: MediaClass,
}

impl NullManager {
    pub fn new(class: MediaClass) -> Self {
        Self { class }
    }

    fn fallback(&self) -> DeviceIdentity {
        DeviceIdentity::fallback(self.class)
    }
}

impl<K: MediaKind> Manager<K> for NullManager {
    fn name(&self) -> &str {
        "null"
    }

    fn enumerate(&self) -> Vec<DeviceIdentity> {
        vec![self.fallback()]
    }

    fn select(&mut self, _lane: Lane, device: &DeviceIdentity) -> bool {
        device.is_fallback(self.class)
    }

    fn open(&mut self, _lane: Lane, _format: &K::Format) -> bool {
        true
    }

    fn close(&mut self, _lane: Lane) {}

    fn read_frame(&self, _lane: Lane, frame: &mut [u8]) -> bool {
        frame.fill(0);
        true
    }

    fn write_frame(&self, _lane: Lane, frame: &[u8]) -> Option<usize> {
        Some(frame.len())
    }

    fn owns(&self, source: &str, name: &str) -> Option<DeviceIdentity> {
        let fallback = self.fallback();
        (fallback.source == source && fallback.name == name).then_some(fallback)
    }
}

/// Notification handle a core hands to each manager it registers
///
/// Cloneable and `Send`, so backends can report errors from their own
/// callback threads.
pub struct ManagerEvents<S> {
    manager: String,
    lanes: &'static [Lane],
    settings: Arc<SettingsBank<S>>,
    hub: Arc<EventHub<S>>,
}

impl<S: DeviceKnobs> ManagerEvents<S> {
    pub(crate) fn new(
        manager: String,
        lanes: &'static [Lane],
        settings: Arc<SettingsBank<S>>,
        hub: Arc<EventHub<S>>,
    ) -> Self {
        Self {
            manager,
            lanes,
            settings,
            hub,
        }
    }

    fn lane_index(&self, lane: Lane) -> usize {
        self.lanes.iter().position(|l| *l == lane).unwrap_or(0)
    }

    pub fn opened(&self, lane: Lane, device: DeviceIdentity, settings: DeviceSettings<S>) {
        self.settings.device_opened(self.lane_index(lane), &settings);
        self.hub.publish(CoreEvent::DeviceOpened {
            manager: self.manager.clone(),
            lane,
            device,
            settings,
        });
    }

    pub fn closed(&self, lane: Lane, device: DeviceIdentity) {
        self.settings.device_closed(self.lane_index(lane));
        self.hub.publish(CoreEvent::DeviceClosed {
            manager: self.manager.clone(),
            lane,
            device,
        });
    }

    pub fn error(&self, lane: Lane, device: DeviceIdentity, error: DeviceErrorCode) {
        warn!(manager = %self.manager, device = %device, error = %error, "Device error");
        self.hub.publish(CoreEvent::DeviceError {
            manager: self.manager.clone(),
            lane,
            device,
            error,
        });
    }
}

impl<S> Clone for ManagerEvents<S> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            lanes: self.lanes,
            settings: Arc::clone(&self.settings),
            hub: Arc::clone(&self.hub),
        }
    }
}
