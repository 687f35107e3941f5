//! Audio Scheduler Library
//!
//! Plays a playlist of audio clips in order, each followed by its own
//! repeat interval, on a single background worker. Exposes the scheduler,
//! the sound cache and backends, persistence, the status projection and
//! the optional license gate.

pub mod app;
pub mod audio;
pub mod config;
pub mod error;
pub mod license;
pub mod metrics;
pub mod playlist;
pub mod schedule;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod timer;

// Re-export commonly used types
pub use app::SchedulerApp;
pub use audio::{DefaultBackend, SoundBackend, SoundCache};
pub use config::{Config, LicenseConfig};
pub use error::{AppError, ConfigError, LicenseError, LoadError, PlaybackError, SchedulerError};
pub use license::{BaserowClient, LicenseEvent, LicenseManager, LicenseMonitor, LicenseServer};
pub use metrics::{CacheMetrics, PlaybackMetrics};
pub use playlist::{AudioItem, MoveDirection, Playlist};
pub use schedule::{ScheduleAction, ScheduleWindow};
pub use scheduler::{Phase, Scheduler, SchedulerSettings, SchedulerStatus, StopOutcome};
pub use status::{StatusReport, StatusReporter, StatusTicker};
pub use store::{PlaylistStore, SavedSettings, SavedState};
pub use timer::PreciseTimer;
