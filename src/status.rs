//! Status projection and the periodic status tick
//!
//! The reporter turns a [`SchedulerStatus`] snapshot into display text. The
//! ticker runs it on a fixed cadence and forwards schedule-window triggers
//! as start/stop requests; it never writes scheduler state itself.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::schedule::{ScheduleAction, ScheduleTrigger, ScheduleWindow};
use crate::scheduler::{SchedulerStatus, ShutdownSignal};

/// Display text for one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub running: bool,
    pub status_line: String,
    pub next_line: String,
    pub countdown: String,
    /// Playlist row to highlight
    pub highlighted: Option<usize>,
}

/// Render a snapshot against the given wall-clock time. The highlight is
/// dropped when the index no longer fits a playlist of `playlist_len`.
pub fn render(status: &SchedulerStatus, now: DateTime<Local>, playlist_len: usize) -> StatusReport {
    let status_line = if status.running {
        "Status: Running"
    } else {
        "Status: Stopped"
    };

    let (next_line, countdown) = match status.next_execution_time {
        Some(next) if status.running => {
            let remaining = (next - now).num_seconds().max(0);
            if remaining > 0 {
                let (mins, secs) = (remaining / 60, remaining % 60);
                (
                    format!("Next: {}", next.format("%H:%M:%S")),
                    format!("IN {:02}:{:02}", mins, secs),
                )
            } else {
                ("Next: NOW".to_string(), "00:00".to_string())
            }
        }
        _ => ("Next: --:--:--".to_string(), String::new()),
    };

    StatusReport {
        running: status.running,
        status_line: status_line.to_string(),
        next_line,
        countdown,
        highlighted: status
            .current_index
            .filter(|&index| status.running && index < playlist_len),
    }
}

/// What the ticker observes and whom it asks to start or stop
pub trait StatusSource: Send + Sync {
    fn status(&self) -> SchedulerStatus;

    fn playlist_len(&self) -> usize;

    fn schedule_window(&self) -> ScheduleWindow;

    /// Called when the schedule window fires
    fn apply_schedule(&self, action: ScheduleAction);
}

/// Pairs rendering with debounced schedule evaluation
#[derive(Debug, Default)]
pub struct StatusReporter {
    trigger: ScheduleTrigger,
}

impl StatusReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(
        &mut self,
        status: &SchedulerStatus,
        playlist_len: usize,
        window: &ScheduleWindow,
        now: DateTime<Local>,
    ) -> (StatusReport, Option<ScheduleAction>) {
        let report = render(status, now, playlist_len);
        let action = self
            .trigger
            .evaluate(window, now.naive_local(), status.running);
        (report, action)
    }
}

/// Recurring status task on its own thread
pub struct StatusTicker {
    signal: Arc<ShutdownSignal>,
    thread: Option<thread::JoinHandle<()>>,
}

impl StatusTicker {
    pub fn spawn<S, F>(source: Arc<S>, cadence: Duration, mut on_report: F) -> io::Result<Self>
    where
        S: StatusSource + 'static,
        F: FnMut(&StatusReport) + Send + 'static,
    {
        let signal = Arc::new(ShutdownSignal::new());
        let ticker_signal = Arc::clone(&signal);

        let thread = thread::Builder::new()
            .name("status-ticker".to_string())
            .spawn(move || {
                let mut reporter = StatusReporter::new();
                debug!(cadence_ms = cadence.as_millis() as u64, "Status ticker started");

                loop {
                    let status = source.status();
                    let window = source.schedule_window();
                    let (report, action) =
                        reporter.tick(&status, source.playlist_len(), &window, Local::now());

                    if let Some(action) = action {
                        source.apply_schedule(action);
                    }
                    on_report(&report);

                    if ticker_signal.wait_timeout(cadence) {
                        break;
                    }
                }

                debug!("Status ticker stopped");
            })?;

        Ok(Self {
            signal,
            thread: Some(thread),
        })
    }

    /// Stop ticking and join the thread
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.signal.trigger();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Status ticker panicked");
            }
        }
    }
}

impl Drop for StatusTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
