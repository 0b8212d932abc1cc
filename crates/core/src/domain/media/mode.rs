//! Idle / Preview / Stream state machine

use super::{MediaCore, PRIMARY};
use crate::domain::format::{BufferConfig, DeviceConfig};
use crate::domain::kind::MediaKind;
use crate::sync::{lock, write};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Illegal mode transitions; the core state is left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("Preview is already running")]
    AlreadyPreviewing,

    #[error("Stream is already running")]
    AlreadyStreaming,

    #[error("A stream is active")]
    StreamActive,

    #[error("A preview is active and this device class cannot hand it over")]
    PreviewActive,

    #[error("Preview is not running")]
    NotPreviewing,

    #[error("Stream is not running")]
    NotStreaming,
}

pub type Result<T> = std::result::Result<T, ModeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreMode {
    Idle,
    Preview,
    Stream,
}

impl fmt::Display for CoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreMode::Idle => f.write_str("idle"),
            CoreMode::Preview => f.write_str("preview"),
            CoreMode::Stream => f.write_str("stream"),
        }
    }
}

impl<K: MediaKind> MediaCore<K> {
    pub fn mode(&self) -> CoreMode {
        let state = lock(&self.state);
        if state.stream.active {
            CoreMode::Stream
        } else if state.preview.active {
            CoreMode::Preview
        } else {
            CoreMode::Idle
        }
    }

    fn rejected(&self, error: ModeError) -> Result<()> {
        warn!(class = %K::CLASS, error = %error, "Mode change rejected");
        Err(error)
    }

    pub fn start_preview(&self) -> Result<()> {
        let _control = self.begin_control();
        {
            let mut state = lock(&self.state);
            if state.stream.active {
                return self.rejected(ModeError::StreamActive);
            }
            if state.preview.active {
                return self.rejected(ModeError::AlreadyPreviewing);
            }

            let config = state.preview.clone();
            state.open(PRIMARY, &config);
            state.preview.active = true;
            info!(class = %K::CLASS, "Preview started");
        }

        self.resume_pump();
        Ok(())
    }

    pub fn stop_preview(&self) -> Result<()> {
        let _control = self.begin_control();
        {
            let mut state = lock(&self.state);
            if state.stream.active && state.resume_preview {
                // Preview is suspended behind the stream; just forget it
                state.resume_preview = false;
                info!(class = %K::CLASS, "Suspended preview cancelled");
                return Ok(());
            }
            if !state.preview.active {
                return self.rejected(ModeError::NotPreviewing);
            }
        }

        // The pump must be parked before the device goes away
        self.pause_pump();

        let mut state = lock(&self.state);
        state.close(PRIMARY);
        state.preview.active = false;
        state.reresolve(PRIMARY);
        info!(class = %K::CLASS, "Preview stopped");
        Ok(())
    }

    pub fn start_stream(&self) -> Result<()> {
        let _control = self.begin_control();
        let previewing = {
            let state = lock(&self.state);
            if state.stream.active {
                return self.rejected(ModeError::AlreadyStreaming);
            }
            if state.preview.active && !K::PREVIEW_HANDOFF {
                return self.rejected(ModeError::PreviewActive);
            }
            state.preview.active
        };

        if previewing {
            self.pause_pump();
        }

        let mut state = lock(&self.state);
        let stream = state.stream.clone();
        if previewing {
            if state.preview.same_parameters(&stream) {
                debug!(class = %K::CLASS, "Stream reuses the preview device");
            } else {
                state.close(PRIMARY);
                state.open(PRIMARY, &stream);
            }
            state.preview.active = false;
            state.resume_preview = true;
        } else {
            state.open(PRIMARY, &stream);
        }
        state.stream.active = true;
        info!(class = %K::CLASS, handoff = previewing, "Stream started");
        Ok(())
    }

    pub fn stop_stream(&self) -> Result<()> {
        let _control = self.begin_control();
        let resumed = {
            let mut state = lock(&self.state);
            if !state.stream.active {
                return self.rejected(ModeError::NotStreaming);
            }
            state.stream.active = false;

            if state.resume_preview {
                state.resume_preview = false;
                let preview = state.preview.clone();
                let reusable = state.lanes[PRIMARY]
                    .open
                    .as_ref()
                    .is_some_and(|open| open.same_parameters(&preview));
                if !reusable {
                    state.close(PRIMARY);
                    state.open(PRIMARY, &preview);
                }
                state.preview.active = true;
                true
            } else {
                state.close(PRIMARY);
                state.reresolve(PRIMARY);
                false
            }
        };

        info!(class = %K::CLASS, preview_resumed = resumed, "Stream stopped");
        if resumed {
            self.resume_pump();
        }
        Ok(())
    }

    pub fn preview_config(&self) -> DeviceConfig<K::Format> {
        lock(&self.state).preview.clone()
    }

    pub fn stream_config(&self) -> DeviceConfig<K::Format> {
        lock(&self.state).stream.clone()
    }

    /// Change the preview parameters; a running preview is restarted with them
    pub fn set_preview_config(&self, format: K::Format, buffers: BufferConfig) {
        let _control = self.begin_control();
        let restart = {
            let mut state = lock(&self.state);
            let mut next = DeviceConfig::new(format, buffers);
            if state.preview.same_parameters(&next) {
                return;
            }
            next.active = state.preview.active;
            state.preview = next;
            state.preview.active
        };
        debug!(class = %K::CLASS, restart, "Preview config changed");

        if restart {
            self.pause_pump();
            {
                let mut state = lock(&self.state);
                let config = state.preview.clone();
                state.close(PRIMARY);
                state.open(PRIMARY, &config);
            }
            self.resume_pump();
        }
    }

    /// Change the stream parameters used by the next `start_stream`
    pub fn set_stream_config(&self, format: K::Format, buffers: BufferConfig) {
        let _control = self.begin_control();
        let mut state = lock(&self.state);
        let active = state.stream.active;
        state.stream = DeviceConfig::new(format, buffers);
        state.stream.active = active;
        if active {
            debug!(class = %K::CLASS, "Stream config changed, applies to the next stream");
        }
    }

    /// Change preview buffering, applied to the live device when previewing
    pub fn set_preview_buffers(&self, size: usize, count: usize) {
        let _control = self.begin_control();
        let buffers = BufferConfig::new(size, count);
        let live = {
            let mut state = lock(&self.state);
            state.preview.buffers = buffers;
            state.preview.active
        };
        if !live {
            return;
        }

        // Frame length may follow the buffer size
        self.pause_pump();
        self.reconfigure_live(buffers);
        self.resume_pump();
    }

    /// Change stream buffering, applied to the live device when streaming
    pub fn set_stream_buffers(&self, size: usize, count: usize) {
        let _control = self.begin_control();
        let buffers = BufferConfig::new(size, count);
        let live = {
            let mut state = lock(&self.state);
            state.stream.buffers = buffers;
            state.stream.active
        };
        if live {
            self.reconfigure_live(buffers);
        }
    }

    fn reconfigure_live(&self, buffers: BufferConfig) {
        let mut state = lock(&self.state);
        let Some(ticket) = state.ticket(PRIMARY) else {
            return;
        };
        write(&ticket.handle).configure_buffers(ticket.lane, &buffers);
        if let Some(open) = state.lanes[PRIMARY].open.as_mut() {
            open.buffers = buffers;
        }
        debug!(class = %K::CLASS, size = buffers.size, count = buffers.count, "Buffers reconfigured");
    }
}
