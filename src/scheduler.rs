//! Debounce timer
//!
//! A single deferred task that can be armed, re-armed and cancelled. It owns
//! no thread or callback: whatever event loop hosts it (a browser
//! `setTimeout`, a frame loop, a test) checks [`Debouncer::fire`] against the
//! clock. Re-arming replaces the pending deadline, so at most one task is ever
//! pending.

use std::time::Duration;

use crate::platform::time::Timestamp;

#[derive(Debug, Clone)]
pub struct Debouncer {
    window_ms: u64,
    deadline: Option<Timestamp>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// (Re)start the quiet period from `now`, dropping any pending deadline
    pub fn arm(&mut self, now: Timestamp) -> Timestamp {
        let deadline = now.saturating_add(self.window_ms);
        self.deadline = Some(deadline);
        deadline
    }

    /// Drop the pending task; returns whether one was pending
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Timestamp> {
        self.deadline
    }

    /// Consume the pending task if its deadline has passed
    pub fn fire(&mut self, now: Timestamp) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Host handle for a scheduled callback (a `setTimeout` id in the browser)
pub type TimerId = i32;

/// Host event loop that can run a task once after a delay
///
/// Timers may fire early or late; callers re-check their own deadline.
pub trait TimerHost {
    /// Schedule `task`; `None` if the host could not take it
    fn schedule(&self, delay_ms: u64, task: Box<dyn FnOnce()>) -> Option<TimerId>;
    fn cancel(&self, id: TimerId);
}
