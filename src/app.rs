//! Application context
//!
//! [`SchedulerApp`] owns one scheduler, its sound backend and the state
//! store for the lifetime of the process. Every user command is a method
//! returning synchronously; playlist and settings changes are saved right
//! away, and a failed save is logged without undoing the change.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::audio::{SoundBackend, DEFAULT_DEVICE, TEST_TONE_DURATION, TEST_TONE_HZ};
use crate::error::{AppError, ConfigResult, LoadError, Result};
use crate::metrics::MetricsReporter;
use crate::playlist::{AudioItem, MoveDirection, Playlist};
use crate::schedule::{ScheduleAction, ScheduleWindow};
use crate::scheduler::{Scheduler, SchedulerSettings, SchedulerStatus, StopOutcome};
use crate::status::StatusSource;
use crate::store::{PlaylistStore, SavedSettings, SavedState};

/// Settings that live outside the scheduler
struct AppSettings {
    selected_device: String,
    window: ScheduleWindow,
}

pub struct SchedulerApp {
    scheduler: Scheduler,
    store: PlaylistStore,
    settings: Mutex<AppSettings>,
    metrics_reporter: Mutex<MetricsReporter>,
}

impl SchedulerApp {
    /// Build the app from whatever the store holds
    pub fn new(
        backend: Arc<dyn SoundBackend>,
        store: PlaylistStore,
        settings: SchedulerSettings,
    ) -> Self {
        let state = store.load_or_default();
        Self::from_state(backend, store, settings, state)
    }

    pub fn from_state(
        backend: Arc<dyn SoundBackend>,
        store: PlaylistStore,
        settings: SchedulerSettings,
        state: SavedState,
    ) -> Self {
        let SavedState {
            audios,
            settings: saved,
        } = state;

        let devices = backend.output_devices();
        let selected_device = match saved.selected_device {
            Some(device) if devices.contains(&device) => device,
            Some(device) => {
                warn!(device = %device, "Saved output device not available, using default");
                DEFAULT_DEVICE.to_string()
            }
            None => DEFAULT_DEVICE.to_string(),
        };

        let window =
            ScheduleWindow::from_strings(saved.schedule_enabled, &saved.start_time, &saved.stop_time)
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Saved schedule window invalid, schedule disabled");
                    ScheduleWindow::default()
                });

        let scheduler = Scheduler::new(Playlist::from_items(audios).into_shared(), backend, settings);
        scheduler.set_alert_enabled(saved.alert_enabled);
        scheduler.set_volume(saved.volume);

        info!(
            audios = scheduler.playlist_snapshot().len(),
            device = %selected_device,
            "Application ready"
        );

        Self {
            scheduler,
            store,
            settings: Mutex::new(AppSettings {
                selected_device,
                window,
            }),
            metrics_reporter: Mutex::new(MetricsReporter::new()),
        }
    }

    fn lock_settings(&self) -> MutexGuard<'_, AppSettings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &PlaylistStore {
        &self.store
    }

    pub fn status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    pub fn playlist(&self) -> Playlist {
        self.scheduler.playlist_snapshot()
    }

    pub fn selected_device(&self) -> String {
        self.lock_settings().selected_device.clone()
    }

    pub fn schedule_window(&self) -> ScheduleWindow {
        self.lock_settings().window.clone()
    }

    pub fn output_devices(&self) -> Vec<String> {
        self.scheduler.backend().output_devices()
    }

    /// Everything that would be written by [`SchedulerApp::save`]
    pub fn saved_state(&self) -> SavedState {
        let options = self.scheduler.options();
        let settings = self.lock_settings();
        SavedState {
            audios: self.scheduler.playlist_snapshot().items().to_vec(),
            settings: SavedSettings {
                selected_device: Some(settings.selected_device.clone()),
                volume: options.volume,
                alert_enabled: options.alert_enabled,
                schedule_enabled: settings.window.enabled,
                start_time: settings.window.start_string(),
                stop_time: settings.window.stop_string(),
            },
        }
    }

    pub fn save(&self) -> ConfigResult<()> {
        self.store.save(&self.saved_state())
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!(path = %self.store.path().display(), error = %e, "Failed to save settings");
        }
    }

    /// Append an audio file. The file must exist when it is added.
    pub fn add_item(&self, path: impl Into<PathBuf>, interval: u32) -> Result<usize> {
        let item = AudioItem::new(path, interval)?;
        if !item.is_playable() {
            warn!(path = %item.path.display(), "Selected audio file does not exist");
            return Err(LoadError::NotFound(item.path).into());
        }

        let name = item.display_name();
        let index = self.scheduler.add_item(item);
        info!(index, file = %name, interval, "Audio added");
        self.persist();
        Ok(index)
    }

    /// Remove an item; the one playing is refused while running
    pub fn remove_item(&self, index: usize) -> Result<AudioItem> {
        let removed = self.scheduler.remove_item(index)?;
        info!(index, file = %removed.display_name(), "Audio removed");
        self.persist();
        Ok(removed)
    }

    /// Change an item's interval; a wait in progress keeps its old length
    pub fn edit_interval(&self, index: usize, interval: u32) -> Result<()> {
        self.scheduler.set_interval(index, interval)?;
        info!(index, interval, "Interval updated");
        self.persist();
        Ok(())
    }

    pub fn move_item(&self, index: usize, direction: MoveDirection) -> Result<usize> {
        let target = self.scheduler.move_item(index, direction)?;
        if target != index {
            self.persist();
        }
        Ok(target)
    }

    pub fn start(&self) -> Result<usize> {
        Ok(self.scheduler.start()?)
    }

    pub fn stop(&self) -> StopOutcome {
        self.scheduler.stop()
    }

    /// Play `index` now, tearing down any run in progress
    pub fn jump_to(&self, index: usize) -> Result<usize> {
        Ok(self.scheduler.jump_to(index)?)
    }

    /// Play the alert sound, or a test tone when it is missing.
    /// Blocks the calling thread until playback ends.
    pub fn test_playback(&self) -> Result<()> {
        let alert = &self.scheduler.settings().alert_sound;
        let volume = self.scheduler.options().volume;
        let backend = self.scheduler.backend();

        if alert.exists() {
            info!(path = %alert.display(), "Testing audio with alert sound");
            backend.play(alert, volume)?;
        } else {
            info!(frequency_hz = TEST_TONE_HZ, "Alert sound missing, testing audio with tone");
            backend.play_tone(TEST_TONE_HZ, TEST_TONE_DURATION, volume)?;
        }
        Ok(())
    }

    pub fn set_alert_enabled(&self, enabled: bool) {
        self.scheduler.set_alert_enabled(enabled);
        info!(enabled, "Alert sound toggled");
        self.persist();
    }

    /// Returns the volume actually applied
    pub fn set_volume(&self, volume: f32) -> f32 {
        let volume = self.scheduler.set_volume(volume);
        self.persist();
        volume
    }

    pub fn select_device(&self, name: &str) -> Result<()> {
        if !self.output_devices().iter().any(|d| d == name) {
            return Err(AppError::UnknownDevice(name.to_string()));
        }

        self.lock_settings().selected_device = name.to_string();
        info!(device = name, "Output device selected");
        if name != DEFAULT_DEVICE {
            info!("Device change applies after restart");
        }
        self.persist();
        Ok(())
    }

    /// Set the daily window from "HH:MM" strings; empty means unset
    pub fn configure_schedule(&self, enabled: bool, start: &str, stop: &str) -> Result<()> {
        let window = ScheduleWindow::from_strings(enabled, start, stop)?;
        info!(
            enabled,
            start = %window.start_string(),
            stop = %window.stop_string(),
            "Schedule window updated"
        );
        self.lock_settings().window = window;
        self.persist();
        Ok(())
    }

    /// Emit the periodic metrics summary when one is due
    pub fn log_metrics(&self) {
        let cache = self.scheduler.backend().cache_metrics();
        self.metrics_reporter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .maybe_log_summary(self.scheduler.metrics(), cache);
    }

    /// Stop playback, save and release loaded sounds
    pub fn shutdown(&self) -> StopOutcome {
        let outcome = self.scheduler.stop();
        if outcome == StopOutcome::TimedOut {
            warn!("Playback worker still running at shutdown");
        }
        self.persist();
        self.scheduler.backend().clear_cache();
        info!("Application shut down");
        outcome
    }
}

impl StatusSource for SchedulerApp {
    fn status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    fn playlist_len(&self) -> usize {
        self.scheduler.playlist_snapshot().len()
    }

    fn schedule_window(&self) -> ScheduleWindow {
        SchedulerApp::schedule_window(self)
    }

    fn apply_schedule(&self, action: ScheduleAction) {
        match action {
            ScheduleAction::Start => {
                if let Err(e) = self.start() {
                    warn!(error = %e, "Scheduled start rejected");
                }
            }
            ScheduleAction::Stop => {
                self.stop();
            }
        }
    }
}
