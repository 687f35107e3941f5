// Error types for the audio scheduler
//
// Errors are grouped by how the system reacts to them: load and playback
// failures are logged and the loop moves on, config failures fall back to
// defaults, scheduler errors are synchronous rejections of a user command.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Main error type for application commands
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Scheduler rejected request: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Failed to load sound: {0}")]
    Load(#[from] LoadError),

    #[error("Playback failed: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("License error: {0}")]
    License(#[from] LicenseError),

    #[error("Unknown output device: {0}")]
    UnknownDevice(String),
}

/// A sound file could not be turned into a playable handle
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Sound file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed sound file {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
}

/// The backend failed to play a clip
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Output stream error: {0}")]
    Stream(String),

    #[error("Output device error: {0}")]
    Device(String),

    #[error("Audio system not available")]
    NotAvailable,
}

/// Configuration and persisted state errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse saved state: {0}")]
    StateError(#[from] serde_json::Error),

    #[error("Config directory not found")]
    NoConfigDir,

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Requests the scheduler refuses to carry out
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Playback sequence is already running")]
    AlreadyRunning,

    #[error("Playlist is empty")]
    EmptyPlaylist,

    #[error("No item in the playlist points to an existing file")]
    NoPlayableItems,

    #[error("Cannot remove item {0} while it is playing")]
    RemoveActiveItem(usize),

    #[error("Index {index} is out of range for a playlist of {len} items")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Interval must be at least one minute")]
    InvalidInterval,

    #[error("Failed to spawn playback worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// License verification and update check errors
#[derive(Error, Debug)]
pub enum LicenseError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("License file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid license data: {0}")]
    Parse(String),

    #[error("Software is not activated")]
    NotActivated,

    #[error("License expired on {0}")]
    Expired(NaiveDate),

    #[error("License has been deactivated on the server")]
    Revoked,

    #[error("Activation code is invalid or deactivated")]
    InvalidCode,

    #[error("License has no expiry date")]
    MissingExpiry,

    #[error("License server is not configured")]
    NotConfigured,
}

impl From<serde_json::Error> for LicenseError {
    fn from(e: serde_json::Error) -> Self {
        LicenseError::Parse(e.to_string())
    }
}

// Convenience type aliases for common Result types
pub type Result<T> = std::result::Result<T, AppError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
pub type PlaybackResult<T> = std::result::Result<T, PlaybackError>;
pub type LicenseResult<T> = std::result::Result<T, LicenseError>;
