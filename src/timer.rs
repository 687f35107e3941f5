//! Interval timer for the wait phase of a playback cycle
//!
//! Timing is measured on the monotonic clock. The wall-clock "next
//! execution" shown to the user is computed separately and never drives
//! the wait.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

type Callback = Box<dyn FnOnce() + Send>;

/// One-shot countdown. Created fresh for every wait and never reused.
pub struct PreciseTimer {
    duration: Duration,
    start: Instant,
    active: AtomicBool,
    callback: Mutex<Option<Callback>>,
}

impl PreciseTimer {
    /// Start a timer with no completion callback
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            start: Instant::now(),
            active: AtomicBool::new(true),
            callback: Mutex::new(None),
        }
    }

    /// Start a timer that runs `callback` the first time it is observed
    /// to have reached zero
    pub fn with_callback<F>(duration: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            callback: Mutex::new(Some(Box::new(callback))),
            ..Self::new(duration)
        }
    }

    /// Time left, saturating at zero.
    ///
    /// The first call that sees zero fires the callback and deactivates
    /// the timer; a stopped timer always reports zero without firing.
    pub fn remaining(&self) -> Duration {
        if !self.active.load(Ordering::Acquire) {
            return Duration::ZERO;
        }

        let remaining = self.duration.saturating_sub(self.start.elapsed());
        if remaining.is_zero() && self.active.swap(false, Ordering::AcqRel) {
            let callback = self
                .callback
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(callback) = callback {
                callback();
            }
        }
        remaining
    }

    /// Deactivate without firing
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Whether the timer has neither fired nor been stopped
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Time since the timer started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl fmt::Debug for PreciseTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreciseTimer")
            .field("duration", &self.duration)
            .field("elapsed", &self.start.elapsed())
            .field("active", &self.is_active())
            .finish()
    }
}
