//! Hot-plug notifications
//!
//! Must be called from the control thread. The core asks every manager
//! whether it recognises the physical device, republishes the result and
//! moves affected lanes.

use super::MediaCore;
use crate::domain::device::DeviceIdentity;
use crate::domain::events::CoreEvent;
use crate::domain::kind::MediaKind;
use crate::sync::{lock, read};
use tracing::info;

impl<K: MediaKind> MediaCore<K> {
    /// Identities the registered managers give to `source`/`name`
    fn correlate(&self, source: &str, name: &str, backend_hint: &str) -> Vec<DeviceIdentity> {
        let state = lock(&self.state);
        let mut found: Vec<DeviceIdentity> = Vec::new();
        for registered in &state.managers {
            let Some(device) = read(&registered.handle).owns(source, name) else {
                continue;
            };
            if !backend_hint.is_empty() && !device.device_type.eq_ignore_ascii_case(backend_hint) {
                continue;
            }
            if !found.contains(&device) {
                found.push(device);
            }
        }
        found
    }

    /// A device appeared. Lanes that want it but run on something else
    /// switch back to it.
    pub fn add_device(&self, source: &str, name: &str, backend_hint: &str) {
        let _control = self.begin_control();
        for device in self.correlate(source, name, backend_hint) {
            let (is_desired, reclaim) = {
                let state = lock(&self.state);
                let wanting: Vec<usize> = state
                    .lanes
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| slot.desired == device)
                    .map(|(idx, _)| idx)
                    .collect();
                let reclaim: Vec<usize> = wanting
                    .iter()
                    .copied()
                    .filter(|idx| state.lanes[*idx].current != device)
                    .collect();
                (!wanting.is_empty(), reclaim)
            };

            info!(class = %K::CLASS, device = %device, is_desired, "Device added");
            self.hub.publish(CoreEvent::DeviceAdded {
                device: device.clone(),
                is_desired,
            });

            for idx in reclaim {
                self.switch_lane(idx, &device);
            }
        }
    }

    /// A device went away. Lanes running on it move to the fallback.
    pub fn remove_device(&self, source: &str, name: &str, backend_hint: &str) {
        let _control = self.begin_control();
        let fallback = DeviceIdentity::fallback(K::CLASS);
        for device in self.correlate(source, name, backend_hint) {
            let affected: Vec<usize> = lock(&self.state)
                .lanes
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.current == device)
                .map(|(idx, _)| idx)
                .collect();
            let was_current = !affected.is_empty();

            info!(class = %K::CLASS, device = %device, was_current, "Device removed");
            self.hub.publish(CoreEvent::DeviceRemoved {
                device: device.clone(),
                was_current,
            });

            if device == fallback {
                continue;
            }
            for idx in affected {
                self.switch_lane(idx, &fallback);
            }
        }
    }
}
