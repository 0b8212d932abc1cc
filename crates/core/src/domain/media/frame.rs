//! Real-time frame path
//!
//! Runs on the streaming thread (and on the preview pump / scheduler worker).
//! It never reports failure to its caller: a failed transfer fails the lane
//! over to the fallback device, retries once, and zero-fills as a last resort.

use super::{MediaCore, Ticket, PRIMARY};
use crate::domain::device::{DeviceIdentity, Lane};
use crate::domain::format::{AudioFormat, BufferConfig, DeviceConfig};
use crate::domain::kind::{AudioOutput, CaptureKind, MediaKind, PlaybackKind};
use crate::domain::manager::Manager;
use crate::domain::preview::FrameSink;
use crate::domain::scheduler::{BufferPlayer, SoundClip};
use crate::sync::{lock, read};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Sleep taken by the frame path after a control operation asked it to yield
const YIELD_BACKOFF: Duration = Duration::from_millis(5);

impl<K: MediaKind> MediaCore<K> {
    fn backoff(&self) {
        if self.yield_requested.swap(false, Ordering::AcqRel) {
            trace!(class = %K::CLASS, "Frame path yielding to control thread");
            thread::sleep(YIELD_BACKOFF);
        }
    }

    fn ticket(&self, idx: usize) -> Option<Ticket<K>> {
        lock(&self.state).ticket(idx)
    }

    /// Run `io` against the lane's manager, then push pending settings
    fn run_ticket<F>(&self, idx: usize, ticket: &Ticket<K>, io: &mut F) -> bool
    where
        F: FnMut(&dyn Manager<K>, Lane) -> bool,
    {
        let manager = read(&ticket.handle);
        if !io(&**manager, ticket.lane) {
            return false;
        }
        if let Some(values) = self.settings.pending(idx) {
            debug!(class = %K::CLASS, lane = %ticket.lane, settings = ?values, "Applying settings");
            manager.apply_settings(ticket.lane, &values);
            self.settings.mark_applied(idx, values);
        }
        true
    }

    /// Fail the lane over after a transfer error observed at `generation`.
    ///
    /// A generation mismatch means a control operation already swapped the
    /// device under us, so the new device is simply tried.
    fn recover(&self, idx: usize, generation: u64) -> Option<Ticket<K>> {
        let mut state = lock(&self.state);
        let slot = &state.lanes[idx];
        if slot.generation == generation {
            let config = slot.open.clone()?;
            warn!(class = %K::CLASS, lane = %slot.lane, device = %slot.current, "Frame transfer failed, switching to fallback");
            state.close(idx);
            state.set_manager(idx, &DeviceIdentity::fallback(K::CLASS));
            if !state.open(idx, &config) {
                return None;
            }
        }
        state.ticket(idx)
    }

    /// Transfer one frame on lane `idx`; false when nothing could serve it
    fn transfer<F>(&self, idx: usize, mut io: F) -> bool
    where
        F: FnMut(&dyn Manager<K>, Lane) -> bool,
    {
        self.backoff();
        let Some(mut ticket) = self.ticket(idx) else {
            return false;
        };

        if self.run_ticket(idx, &ticket, &mut io) {
            return true;
        }
        match self.recover(idx, ticket.generation) {
            Some(next) => ticket = next,
            None => return false,
        }
        if self.run_ticket(idx, &ticket, &mut io) {
            return true;
        }
        error!(class = %K::CLASS, "Frame transfer failed after failover");
        false
    }
}

impl<K: CaptureKind> MediaCore<K> {
    /// Fill `frame` from the current device. Always fills the whole buffer.
    pub fn get_frame_data(&self, frame: &mut [u8]) -> usize {
        if !self.transfer(PRIMARY, |manager, lane| manager.read_frame(lane, frame)) {
            frame.fill(0);
        }
        frame.len()
    }
}

impl<K: PlaybackKind> MediaCore<K> {
    fn write_lane(&self, idx: usize, frame: &[u8]) {
        self.transfer(idx, |manager, lane| manager.write_frame(lane, frame).is_some());
    }

    /// Hand `frame` to the device of `lane`. Always acknowledges the whole frame.
    pub fn set_frame_data(&self, lane: Lane, frame: &[u8]) -> usize {
        if let Some(idx) = Self::lane_index(lane) {
            self.write_lane(idx, frame);
        }
        frame.len()
    }
}

impl MediaCore<AudioOutput> {
    /// Lane a clip requested on `requested` should play on, if any is free
    fn clip_lane(&self, requested: Lane) -> Option<usize> {
        let state = lock(&self.state);
        let primary = &state.lanes[PRIMARY];
        let secondary = &state.lanes[1];

        let mut idx = Self::lane_index(requested)?;
        if requested == Lane::Secondary
            && (secondary.desired.is_fallback(AudioOutput::CLASS) || secondary.desired == primary.desired)
        {
            idx = PRIMARY;
        }
        if state.lanes[idx].open.is_none() {
            return Some(idx);
        }

        let other = Self::lane_index(AudioOutput::LANES[idx].other())?;
        let busy = &state.lanes[idx];
        let alternative = &state.lanes[other];
        let usable = alternative.open.is_none()
            && !alternative.desired.is_fallback(AudioOutput::CLASS)
            && alternative.desired != busy.desired;
        usable.then_some(other)
    }

    /// Play a whole clip on `lane`, blocking until it has been written
    pub fn play_buffer(&self, lane: Lane, clip: &SoundClip) {
        if clip.data.is_empty() {
            return;
        }
        let _control = self.begin_control();
        let Some(idx) = self.clip_lane(lane) else {
            debug!(lane = %lane, "Both output lanes busy, dropping clip");
            return;
        };

        let config = DeviceConfig::new(clip.format, BufferConfig::default());
        if !lock(&self.state).open(idx, &config) {
            return;
        }
        debug!(lane = %AudioOutput::LANES[idx], bytes = clip.data.len(), "Playing clip");

        for chunk in clip.data.chunks(config.frame_len()) {
            self.write_lane(idx, chunk);
        }

        let mut state = lock(&self.state);
        state.close(idx);
        state.reresolve(idx);
    }
}

impl BufferPlayer for MediaCore<AudioOutput> {
    fn play_clip(&self, lane: Lane, clip: &SoundClip) {
        self.play_buffer(lane, clip);
    }
}

/// Lets the speaker act as the microphone's preview output
impl FrameSink<AudioFormat> for MediaCore<AudioOutput> {
    fn start_sink(&self, format: &AudioFormat) {
        let buffers = self.preview_config().buffers;
        self.set_preview_config(*format, buffers);
        let _ = self.start_preview();
    }

    fn push_frame(&self, frame: &[u8]) {
        self.set_frame_data(Lane::Primary, frame);
    }

    fn stop_sink(&self) {
        let _ = self.stop_preview();
    }
}
