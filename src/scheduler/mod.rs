//! Playback scheduler
//!
//! Owns the single playback worker and the state it shares with the control
//! layer: the running flag, the cursor into the playlist, the wall-clock time
//! of the next cycle and the active interval timer.
//!
//! Lock order is always playlist, then cursor. Control requests (start,
//! stop, jump) are serialized through the worker slot, so at most one
//! worker exists at any time.

mod signal;
mod worker;

pub use signal::ShutdownSignal;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::audio::{clamp_volume, SoundBackend, DEFAULT_VOLUME};
use crate::error::SchedulerError;
use crate::metrics::PlaybackMetrics;
use crate::playlist::{AudioItem, MoveDirection, Playlist, SharedPlaylist};
use crate::timer::PreciseTimer;

/// Timing knobs for the playback loop
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    /// Granularity of the interruptible wait
    pub poll_interval: Duration,

    /// How long Stop waits for the worker to exit
    pub stop_timeout: Duration,

    /// Length of one interval minute
    pub interval_unit: Duration,

    /// Sound played before each clip when alerts are enabled
    pub alert_sound: PathBuf,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            stop_timeout: Duration::from_secs(3),
            interval_unit: Duration::from_secs(60),
            alert_sound: PathBuf::from("alert.wav"),
        }
    }
}

/// Live playback options the worker reads every cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    pub alert_enabled: bool,
    pub volume: f32,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            alert_enabled: true,
            volume: DEFAULT_VOLUME,
        }
    }
}

/// Where the worker is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Playing the alert sound
    Alert,
    /// Playing the item's clip
    Playing,
    /// Counting down the item's interval
    Waiting,
    Stopping,
}

/// Point-in-time view of the scheduler. Two snapshots may disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerStatus {
    pub running: bool,
    pub phase: Phase,
    pub current_index: Option<usize>,
    pub next_execution_time: Option<DateTime<Local>>,
}

impl SchedulerStatus {
    pub fn idle() -> Self {
        Self {
            running: false,
            phase: Phase::Idle,
            current_index: None,
            next_execution_time: None,
        }
    }
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The worker was signalled and has exited
    Stopped,
    /// Nothing was running
    AlreadyStopped,
    /// The worker did not exit within the stop timeout. It will be joined
    /// before the next start.
    TimedOut,
}

struct Cursor {
    current_index: Option<usize>,
    next_execution_time: Option<DateTime<Local>>,
    phase: Phase,
}

impl Cursor {
    fn idle() -> Self {
        Self {
            current_index: None,
            next_execution_time: None,
            phase: Phase::Idle,
        }
    }
}

/// State shared between the control layer and the worker
pub(crate) struct Shared {
    playlist: SharedPlaylist,
    backend: Arc<dyn SoundBackend>,
    settings: SchedulerSettings,
    running: AtomicBool,
    cursor: Mutex<Cursor>,
    active_timer: Mutex<Option<Arc<PreciseTimer>>>,
    options: RwLock<PlaybackOptions>,
    metrics: PlaybackMetrics,
}

impl Shared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn read_playlist(&self) -> RwLockReadGuard<'_, Playlist> {
        self.playlist.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_playlist(&self) -> RwLockWriteGuard<'_, Playlist> {
        self.playlist.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_cursor(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<Arc<PreciseTimer>>> {
        self.active_timer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn options(&self) -> PlaybackOptions {
        *self.options.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: Phase) {
        self.lock_cursor().phase = phase;
    }

    /// Set the phase unless `signal` has been triggered. The check runs
    /// under the cursor lock, so a stop that resets the cursor after
    /// triggering is never overwritten by its worker.
    fn set_live_phase(&self, signal: &ShutdownSignal, phase: Phase) {
        let mut cursor = self.lock_cursor();
        if !signal.is_set() {
            cursor.phase = phase;
        }
    }

    /// Record the display time of the next cycle
    fn begin_cycle(&self, signal: &ShutdownSignal, wait: Duration) {
        let next = chrono::Duration::from_std(wait)
            .ok()
            .and_then(|d| Local::now().checked_add_signed(d));
        let mut cursor = self.lock_cursor();
        if signal.is_set() {
            return;
        }
        cursor.next_execution_time = next;
        cursor.phase = Phase::Playing;
    }

    /// Replace the active timer, stopping the previous one
    fn install_timer(&self, timer: Arc<PreciseTimer>) {
        if let Some(previous) = self.lock_timer().replace(timer) {
            previous.stop();
        }
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.lock_timer().take() {
            timer.stop();
        }
    }

    /// Return to idle. Called by the worker as it exits.
    fn finish(&self) {
        *self.lock_cursor() = Cursor::idle();
        self.cancel_timer();
        self.running.store(false, Ordering::SeqCst);
    }
}

struct Worker {
    signal: Arc<ShutdownSignal>,
    done: mpsc::Receiver<()>,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn join(self) {
        if self.thread.join().is_err() {
            warn!("Playback worker panicked");
        }
    }
}

/// Runs the playlist on a background worker
pub struct Scheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl Scheduler {
    pub fn new(
        playlist: SharedPlaylist,
        backend: Arc<dyn SoundBackend>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                playlist,
                backend,
                settings,
                running: AtomicBool::new(false),
                cursor: Mutex::new(Cursor::idle()),
                active_timer: Mutex::new(None),
                options: RwLock::new(PlaybackOptions::default()),
                metrics: PlaybackMetrics::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start from the first item whose file exists
    pub fn start(&self) -> Result<usize, SchedulerError> {
        let mut slot = self.lock_worker();

        if self.shared.is_running() {
            warn!("Playback sequence is already running");
            return Err(SchedulerError::AlreadyRunning);
        }

        let first = {
            let playlist = self.shared.read_playlist();
            if playlist.is_empty() {
                warn!("Add at least one audio before starting");
                return Err(SchedulerError::EmptyPlaylist);
            }
            match playlist.first_playable_from(0) {
                Some(index) => index,
                None => {
                    warn!("No audio file in the playlist exists on disk");
                    return Err(SchedulerError::NoPlayableItems);
                }
            }
        };

        self.spawn_locked(&mut slot, first)
    }

    /// Stop any run and start again at `index`
    pub fn jump_to(&self, index: usize) -> Result<usize, SchedulerError> {
        let mut slot = self.lock_worker();

        let len = self.shared.read_playlist().len();
        if index >= len {
            return Err(SchedulerError::IndexOutOfRange { index, len });
        }

        if self.shared.is_running() || slot.is_some() {
            if self.stop_locked(&mut slot) == StopOutcome::TimedOut {
                warn!("Previous worker still running, joining before jump");
            }
        }

        self.spawn_locked(&mut slot, index)
    }

    /// Stop the run and wait (bounded) for the worker to exit
    pub fn stop(&self) -> StopOutcome {
        let mut slot = self.lock_worker();

        let worker_alive = slot.as_ref().is_some_and(|w| !w.thread.is_finished());
        if !self.shared.is_running() && !worker_alive {
            if let Some(finished) = slot.take() {
                finished.join();
            }
            info!("Playback sequence is already stopped");
            return StopOutcome::AlreadyStopped;
        }

        // A worker left behind by a timed-out stop is joined by the next
        // start, jump or drop; waiting on it again here would only block
        let already_signalled = slot.as_ref().is_some_and(|w| w.signal.is_set());
        if !self.shared.is_running() && already_signalled {
            info!("Playback sequence is already stopped, worker still finishing");
            return StopOutcome::AlreadyStopped;
        }

        self.stop_locked(&mut slot)
    }

    fn stop_locked(&self, slot: &mut Option<Worker>) -> StopOutcome {
        info!("Stopping playback sequence");
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.set_phase(Phase::Stopping);

        let Some(worker) = slot.take() else {
            self.shared.finish();
            return StopOutcome::Stopped;
        };

        worker.signal.trigger();
        self.shared.cancel_timer();

        let deadline = Instant::now() + self.shared.settings.stop_timeout;
        let poll = self.shared.settings.poll_interval;
        loop {
            // Repeated in case the worker began a clip after the last call
            self.shared.backend.stop_all();

            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                warn!(
                    timeout_ms = self.shared.settings.stop_timeout.as_millis() as u64,
                    "Playback worker did not stop in time"
                );
                *self.shared.lock_cursor() = Cursor::idle();
                self.shared.cancel_timer();
                *slot = Some(worker);
                return StopOutcome::TimedOut;
            }

            match worker.done.recv_timeout(left.min(poll)) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => continue,
            }
        }

        worker.join();
        // No-op after a clean exit; covers a worker that died mid-cycle
        self.shared.finish();
        info!("Playback sequence stopped");
        StopOutcome::Stopped
    }

    fn spawn_locked(&self, slot: &mut Option<Worker>, index: usize) -> Result<usize, SchedulerError> {
        if let Some(previous) = slot.take() {
            previous.signal.trigger();
            self.shared.backend.stop_all();
            previous.join();
        }

        {
            let mut cursor = self.shared.lock_cursor();
            *cursor = Cursor::idle();
            cursor.current_index = Some(index);
        }
        self.shared.running.store(true, Ordering::SeqCst);

        let signal = Arc::new(ShutdownSignal::new());
        let (done_tx, done_rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let worker_signal = Arc::clone(&signal);

        let spawned = thread::Builder::new()
            .name("playback-worker".to_string())
            .spawn(move || {
                worker::run(&shared, &worker_signal);
                let _ = done_tx.send(());
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.shared.finish();
                return Err(SchedulerError::Spawn(e));
            }
        };

        *slot = Some(Worker {
            signal,
            done: done_rx,
            thread,
        });

        info!(index, "Playback sequence started");
        Ok(index)
    }

    /// Current state as a snapshot
    pub fn status(&self) -> SchedulerStatus {
        let running = self.shared.is_running();
        let cursor = self.shared.lock_cursor();
        SchedulerStatus {
            running,
            phase: cursor.phase,
            current_index: cursor.current_index,
            next_execution_time: cursor.next_execution_time,
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Whether a worker thread exists and has not exited
    pub fn worker_alive(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_some_and(|w| !w.thread.is_finished())
    }

    pub fn backend(&self) -> &Arc<dyn SoundBackend> {
        &self.shared.backend
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.shared.settings
    }

    pub fn metrics(&self) -> &PlaybackMetrics {
        &self.shared.metrics
    }

    pub fn options(&self) -> PlaybackOptions {
        self.shared.options()
    }

    pub fn set_alert_enabled(&self, enabled: bool) {
        self.shared
            .options
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .alert_enabled = enabled;
    }

    /// Store the volume for later clips and apply it to the one in flight
    pub fn set_volume(&self, volume: f32) -> f32 {
        let volume = clamp_volume(volume);
        self.shared
            .options
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .volume = volume;
        self.shared.backend.set_volume(volume);
        volume
    }

    /// Snapshot of the playlist
    pub fn playlist_snapshot(&self) -> Playlist {
        self.shared.read_playlist().clone()
    }

    pub fn add_item(&self, item: AudioItem) -> usize {
        let mut playlist = self.shared.write_playlist();
        playlist.push(item);
        playlist.len() - 1
    }

    /// Change an item's interval. A wait already in progress keeps its
    /// old length; the new one applies from the item's next cycle.
    pub fn set_interval(&self, index: usize, interval: u32) -> Result<(), SchedulerError> {
        self.shared.write_playlist().set_interval(index, interval)
    }

    /// Remove an item, keeping the cursor on the same logical item.
    /// The item currently playing cannot be removed while running.
    pub fn remove_item(&self, index: usize) -> Result<AudioItem, SchedulerError> {
        let mut playlist = self.shared.write_playlist();
        let mut cursor = self.shared.lock_cursor();

        if self.shared.is_running() && cursor.current_index == Some(index) {
            warn!(index, "Cannot remove the audio that is playing");
            return Err(SchedulerError::RemoveActiveItem(index));
        }

        let removed = playlist.remove(index)?;
        if let Some(current) = cursor.current_index {
            if current > index {
                cursor.current_index = Some(current - 1);
            }
        }
        Ok(removed)
    }

    /// Reorder an item, keeping the cursor on the same logical item
    pub fn move_item(&self, index: usize, direction: MoveDirection) -> Result<usize, SchedulerError> {
        let mut playlist = self.shared.write_playlist();
        let mut cursor = self.shared.lock_cursor();

        let target = playlist.move_item(index, direction)?;
        if target != index {
            cursor.current_index = match cursor.current_index {
                Some(current) if current == index => Some(target),
                Some(current) if current == target => Some(index),
                other => other,
            };
        }
        Ok(target)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let mut slot = self.lock_worker();
        if slot.is_some() || self.shared.is_running() {
            let _ = self.stop_locked(&mut slot);
        }
        // A worker that outlived the timeout is joined here so no audio
        // call can follow teardown of the backend
        if let Some(worker) = slot.take() {
            worker.signal.trigger();
            self.shared.backend.stop_all();
            worker.join();
        }
    }
}
