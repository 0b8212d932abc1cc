//! Preview pump
//!
//! While a capture core is previewing, a dedicated worker pulls frames from
//! it and forwards them to a sibling output (the speaker for microphone
//! monitoring, a renderer for video). `start` and `stop` are join points: they
//! return only once the worker has actually entered or left its active loop.

use crate::sync::{lock, wait_timeout};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::debug;

/// Pause between two frames, lets control threads grab the core lock
const PUMP_INTERVAL: Duration = Duration::from_millis(5);

/// How often a blocked `start`/`stop` re-checks that the worker is alive
const ACK_POLL: Duration = Duration::from_millis(50);

/// Receiver of preview frames
pub trait FrameSink<F>: Send + Sync {
    /// Preview is about to start delivering frames in `format`
    fn start_sink(&self, _format: &F) {}

    fn push_frame(&self, frame: &[u8]);

    fn stop_sink(&self) {}
}

#[derive(Debug, Default)]
struct PumpState {
    /// Requested by the owner
    run: bool,
    /// Acknowledged by the worker
    running: bool,
    quit: bool,
    frame_len: usize,
}

#[derive(Default)]
struct PumpShared {
    state: Mutex<PumpState>,
    signal: Condvar,
    frames: AtomicU64,
}

/// Worker thread driving a preview step function
pub struct PreviewPump {
    shared: Arc<PumpShared>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl PreviewPump {
    /// Spawn a paused worker that calls `step` once per frame while running
    pub fn spawn<F>(name: &str, step: F) -> io::Result<Self>
    where
        F: FnMut(&mut [u8]) + Send + 'static,
    {
        let shared = Arc::new(PumpShared::default());
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || pump_loop(&worker_shared, step))?;
        let worker_id = worker.thread().id();

        Ok(Self {
            shared,
            worker: Some(worker),
            worker_id,
        })
    }

    /// Resume pumping frames of `frame_len` bytes
    pub fn start(&self, frame_len: usize) {
        {
            let mut state = lock(&self.shared.state);
            state.frame_len = frame_len;
            state.run = true;
        }
        self.shared.signal.notify_all();
        self.await_ack(true);
        debug!(frame_len, "Preview pump started");
    }

    /// Pause the worker, blocking until it is out of its active loop
    pub fn stop(&self) {
        lock(&self.shared.state).run = false;
        self.shared.signal.notify_all();
        self.await_ack(false);
        debug!(frames = self.frames(), "Preview pump stopped");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.state).running
    }

    /// Frames pumped since the worker was spawned
    pub fn frames(&self) -> u64 {
        self.shared.frames.load(Ordering::Relaxed)
    }

    fn on_worker(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    fn worker_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn await_ack(&self, running: bool) {
        // The worker cannot acknowledge a request it is itself making
        if self.on_worker() {
            return;
        }
        let mut state = lock(&self.shared.state);
        while state.running != running && self.worker_alive() {
            state = wait_timeout(&self.shared.signal, state, ACK_POLL);
        }
    }
}

impl Drop for PreviewPump {
    fn drop(&mut self) {
        {
            let mut state = lock(&self.shared.state);
            state.quit = true;
            state.run = false;
        }
        self.shared.signal.notify_all();

        if self.on_worker() {
            // Dropped from inside a step: the loop sees `quit` and exits
            return;
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn pump_loop<F>(shared: &PumpShared, mut step: F)
where
    F: FnMut(&mut [u8]),
{
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let frame_len = {
            let mut state = lock(&shared.state);
            loop {
                if state.quit {
                    state.running = false;
                    shared.signal.notify_all();
                    return;
                }
                if state.run {
                    break;
                }
                if state.running {
                    state.running = false;
                    shared.signal.notify_all();
                }
                state = wait_timeout(&shared.signal, state, ACK_POLL);
            }
            if !state.running {
                state.running = true;
                shared.signal.notify_all();
            }
            state.frame_len
        };

        if buffer.len() != frame_len {
            buffer.resize(frame_len, 0);
        }
        // Started before a format was known: nothing to pull yet
        if !buffer.is_empty() {
            step(&mut buffer);
            shared.frames.fetch_add(1, Ordering::Relaxed);
        }

        thread::sleep(PUMP_INTERVAL);
    }
}
