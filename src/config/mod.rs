// Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::audio::DEFAULT_CACHE_CAPACITY;
use crate::error::{ConfigError, ConfigResult};
use crate::scheduler::SchedulerSettings;

const APP_DIR: &str = "audio-scheduler";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Playlist and settings file
    pub state_file: PathBuf,

    /// Sound played before each clip
    pub alert_sound: PathBuf,

    /// Granularity of the interruptible wait in milliseconds
    pub poll_interval_ms: u64,

    /// Bound on how long stop waits for the worker
    pub stop_timeout_secs: u64,

    /// Seconds per interval minute
    pub interval_unit_secs: u64,

    /// Status refresh cadence in milliseconds
    pub status_cadence_ms: u64,

    /// Decoded sounds kept in memory
    pub cache_capacity: usize,

    /// tracing filter used when RUST_LOG is unset
    pub log_filter: String,

    pub license: LicenseConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Gate startup on a valid license
    pub enabled: bool,

    /// Baserow API root, e.g. "https://api.baserow.io"
    pub api_url: String,

    pub token: String,

    pub license_table_id: u64,

    pub update_table_id: u64,

    pub license_file: PathBuf,

    /// Hours between online re-verifications
    pub check_interval_hours: u64,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.baserow.io".to_string(),
            token: String::new(),
            license_table_id: 0,
            update_table_id: 0,
            license_file: PathBuf::from("license.json"),
            check_interval_hours: 12,
        }
    }
}

impl LicenseConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_hours.saturating_mul(3600))
    }

    /// Whether the server side can be reached at all
    pub fn has_server(&self) -> bool {
        !self.api_url.is_empty() && !self.token.is_empty() && self.license_table_id != 0
    }
}

impl Default for Config {
    fn default() -> Self {
        let state_file = Self::config_dir()
            .map(|dir| dir.join("audio_list.json"))
            .unwrap_or_else(|_| PathBuf::from("audio_list.json"));

        Self {
            state_file,
            alert_sound: PathBuf::from("alert.wav"),
            poll_interval_ms: 100,
            stop_timeout_secs: 3,
            interval_unit_secs: 60,
            status_cadence_ms: 1000,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            log_filter: "info".to_string(),
            license: LicenseConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            info!(path = %config_path.display(), "Creating default config");
            let config = Self::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.stop_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "stop_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.status_cadence_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "status_cadence_ms must be greater than zero".to_string(),
            ));
        }
        if self.interval_unit_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "interval_unit_secs must be greater than zero".to_string(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Timing knobs for the scheduler
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
            interval_unit: Duration::from_secs(self.interval_unit_secs),
            alert_sound: self.alert_sound.clone(),
        }
    }

    pub fn status_cadence(&self) -> Duration {
        Duration::from_millis(self.status_cadence_ms)
    }

    /// Directory holding the config, state and license files
    pub fn config_dir() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(APP_DIR))
    }

    /// Get the path to the configuration file
    pub fn config_path() -> ConfigResult<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.cache_capacity, 5);
        assert!(!config.license.enabled);
        assert_eq!(config.license.check_interval(), Duration::from_secs(12 * 3600));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            interval_unit_secs = 1

            [license]
            enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.interval_unit_secs, 1);
        assert_eq!(config.stop_timeout_secs, 3);
        assert!(config.license.enabled);
        assert_eq!(config.license.license_file, PathBuf::from("license.json"));
    }

    #[test]
    fn test_scheduler_settings_projection() {
        let config = Config {
            poll_interval_ms: 20,
            interval_unit_secs: 2,
            ..Config::default()
        };
        let settings = config.scheduler_settings();
        assert_eq!(settings.poll_interval, Duration::from_millis(20));
        assert_eq!(settings.interval_unit, Duration::from_secs(2));
        assert_eq!(settings.stop_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_load_from_rejects_zero_poll() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "poll_interval_ms = 0\n").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_load_from_rejects_zero_timings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        for line in ["stop_timeout_secs = 0\n", "status_cadence_ms = 0\n"] {
            std::fs::write(&path, line).unwrap();
            assert!(
                matches!(Config::load_from(&path), Err(ConfigError::InvalidValue(_))),
                "accepted {}",
                line.trim()
            );
        }
    }

    #[test]
    fn test_save_and_load_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            log_filter: "debug".to_string(),
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }
}
