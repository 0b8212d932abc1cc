//! Real-time pacing for synthetic devices

use std::thread;
use std::time::{Duration, Instant};

/// Keeps a producer or consumer at one frame per `period`
///
/// A pacer that fell behind (the caller stalled) restarts from now instead
/// of bursting to catch up.
#[derive(Debug)]
pub struct Pacer {
    period: Duration,
    next: Option<Instant>,
}

impl Pacer {
    pub fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
        self.next = None;
    }

    /// Block until the next frame slot
    pub fn wait(&mut self) {
        let now = Instant::now();
        let due = match self.next {
            Some(due) if due > now => {
                thread::sleep(due - now);
                due
            }
            _ => now,
        };
        self.next = Some(due + self.period);
    }

    pub fn reset(&mut self) {
        self.next = None;
    }
}
