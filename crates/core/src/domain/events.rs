//! Notifications published by a core
//!
//! Listeners subscribe with [`EventHub::subscribe`] and drain the returned
//! channel on their own thread. Publishing never blocks the publisher, which
//! may be the real-time streaming thread.

use crate::domain::device::{DeviceIdentity, Lane};
use crate::domain::manager::DeviceErrorCode;
use crate::domain::settings::DeviceSettings;
use crate::sync::lock;
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::Mutex;
use tracing::trace;

/// Everything a core tells the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent<S> {
    ManagerAdded {
        manager: String,
    },
    DeviceAdded {
        device: DeviceIdentity,
        is_desired: bool,
    },
    DeviceRemoved {
        device: DeviceIdentity,
        was_current: bool,
    },
    DeviceOpened {
        manager: String,
        lane: Lane,
        device: DeviceIdentity,
        settings: DeviceSettings<S>,
    },
    DeviceClosed {
        manager: String,
        lane: Lane,
        device: DeviceIdentity,
    },
    DeviceError {
        manager: String,
        lane: Lane,
        device: DeviceIdentity,
        error: DeviceErrorCode,
    },
}

/// Fan-out of core events to any number of subscribers
pub struct EventHub<S> {
    subscribers: Mutex<Vec<Sender<CoreEvent<S>>>>,
}

impl<S: Clone> EventHub<S> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent<S>> {
        let (tx, rx) = unbounded();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Deliver to every live subscriber, dropping the ones that went away
    pub fn publish(&self, event: CoreEvent<S>) {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        trace!(subscribers = subscribers.len(), "Published core event");
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

impl<S: Clone> Default for EventHub<S> {
    fn default() -> Self {
        Self::new()
    }
}
