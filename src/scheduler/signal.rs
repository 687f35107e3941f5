// Cooperative cancellation flag for one worker run

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Set-once flag with an interruptible wait.
///
/// Each worker run gets its own signal, so a worker that outlives a
/// bounded stop can never observe a later run's reset.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    flag: Mutex<bool>,
    condvar: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every waiter
    pub fn trigger(&self) {
        let mut flag = self.flag.lock().unwrap_or_else(|e| e.into_inner());
        *flag = true;
        self.condvar.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.flag.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for up to `timeout`, returning early once triggered.
    /// Returns whether shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.flag.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = self
            .condvar
            .wait_timeout_while(guard, timeout, |set| !*set)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_wait_times_out_when_not_triggered() {
        let signal = ShutdownSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_trigger_wakes_waiter() {
        let signal = Arc::new(ShutdownSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || {
                let start = Instant::now();
                let set = signal.wait_timeout(Duration::from_secs(10));
                (set, start.elapsed())
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        signal.trigger();

        let (set, elapsed) = waiter.join().unwrap();
        assert!(set);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_triggered_signal_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        assert!(signal.is_set());
        assert!(signal.wait_timeout(Duration::from_secs(10)));
    }
}
