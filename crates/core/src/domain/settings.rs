//! Runtime-adjustable device settings
//!
//! Every lane keeps a *desired* value written by the control thread and a
//! *current* value that only the frame-transfer thread updates after pushing
//! the desired value to the manager.

use crate::sync::lock;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Mutex;

/// Knobs a core can push to its manager
pub trait DeviceKnobs: Clone + PartialEq + Debug + Default + Send + Sync + 'static {}

/// Audio volume, 0 to 100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub volume: u32,
}

impl AudioSettings {
    pub const MAX_VOLUME: u32 = 100;

    pub fn new(volume: u32) -> Self {
        Self {
            volume: volume.min(Self::MAX_VOLUME),
        }
    }

    /// Volume as a linear gain factor
    pub fn gain(&self) -> f32 {
        self.volume as f32 / Self::MAX_VOLUME as f32
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self::new(50)
    }
}

impl DeviceKnobs for AudioSettings {}

/// Picture controls, each 0 to 255
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSettings {
    pub brightness: i32,
    pub whiteness: i32,
    pub colour: i32,
    pub contrast: i32,
}

impl VideoSettings {
    pub const MAX: i32 = 255;

    pub fn new(brightness: i32, whiteness: i32, colour: i32, contrast: i32) -> Self {
        Self {
            brightness: brightness.clamp(0, Self::MAX),
            whiteness: whiteness.clamp(0, Self::MAX),
            colour: colour.clamp(0, Self::MAX),
            contrast: contrast.clamp(0, Self::MAX),
        }
    }
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self::new(127, 127, 127, 127)
    }
}

impl DeviceKnobs for VideoSettings {}

/// Settings a manager reports when it opens a device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings<S> {
    pub values: S,
    /// Whether the manager honours runtime changes
    pub modifiable: bool,
}

impl<S> DeviceSettings<S> {
    pub fn new(values: S, modifiable: bool) -> Self {
        Self { values, modifiable }
    }
}

/// Point-in-time view of a lane's settings
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsSnapshot<S> {
    pub desired: Option<S>,
    pub current: Option<S>,
    pub modifiable: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct SettingsCell<S> {
    pub desired: Option<S>,
    pub current: Option<S>,
    pub modifiable: bool,
}

impl<S: DeviceKnobs> SettingsCell<S> {
    /// Value that must be pushed to the manager, if any
    pub fn pending(&self) -> Option<S> {
        match &self.desired {
            Some(desired) if self.current.as_ref() != Some(desired) => Some(desired.clone()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> SettingsSnapshot<S> {
        SettingsSnapshot {
            desired: self.desired.clone(),
            current: self.current.clone(),
            modifiable: self.modifiable,
        }
    }
}

impl<S> Default for SettingsCell<S> {
    fn default() -> Self {
        Self {
            desired: None,
            current: None,
            modifiable: false,
        }
    }
}

/// Settings of every lane of a core, behind the narrow settings lock
pub(crate) struct SettingsBank<S> {
    cells: Mutex<Vec<SettingsCell<S>>>,
}

impl<S: DeviceKnobs> SettingsBank<S> {
    pub fn new(lanes: usize) -> Self {
        Self {
            cells: Mutex::new(vec![SettingsCell::default(); lanes]),
        }
    }

    fn with<R>(&self, lane: usize, f: impl FnOnce(&mut SettingsCell<S>) -> R) -> Option<R> {
        lock(&self.cells).get_mut(lane).map(f)
    }

    pub fn set_desired(&self, lane: usize, values: S) {
        self.with(lane, |cell| cell.desired = Some(values));
    }

    pub fn pending(&self, lane: usize) -> Option<S> {
        self.with(lane, |cell| cell.pending()).flatten()
    }

    pub fn mark_applied(&self, lane: usize, values: S) {
        self.with(lane, |cell| cell.current = Some(values));
    }

    pub fn device_opened(&self, lane: usize, settings: &DeviceSettings<S>) {
        self.with(lane, |cell| {
            cell.current = Some(settings.values.clone());
            cell.modifiable = settings.modifiable;
        });
    }

    pub fn device_closed(&self, lane: usize) {
        self.with(lane, |cell| {
            cell.current = None;
            cell.modifiable = false;
        });
    }

    pub fn snapshot(&self, lane: usize) -> SettingsSnapshot<S> {
        self.with(lane, |cell| cell.snapshot())
            .unwrap_or_else(|| SettingsCell::default().snapshot())
    }
}
