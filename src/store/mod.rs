//! Persisted playlist and settings
//!
//! The state file is JSON. Key names match files written by earlier
//! releases, so existing saves keep loading.

mod migration;

pub use migration::parse_state;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audio::DEFAULT_VOLUME;
use crate::error::ConfigResult;
use crate::playlist::{AudioItem, Playlist};

/// Settings saved next to the playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavedSettings {
    pub selected_device: Option<String>,

    pub volume: f32,

    pub alert_enabled: bool,

    #[serde(rename = "agendamento_ativo")]
    pub schedule_enabled: bool,

    /// "HH:MM" or empty
    pub start_time: String,

    /// "HH:MM" or empty
    pub stop_time: String,
}

impl Default for SavedSettings {
    fn default() -> Self {
        Self {
            selected_device: None,
            volume: DEFAULT_VOLUME,
            alert_enabled: true,
            schedule_enabled: false,
            start_time: String::new(),
            stop_time: String::new(),
        }
    }
}

/// Everything written to the state file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SavedState {
    pub audios: Vec<AudioItem>,

    #[serde(flatten)]
    pub settings: SavedSettings,
}

impl SavedState {
    pub fn playlist(&self) -> Playlist {
        Playlist::from_items(self.audios.clone())
    }
}

/// Reads and writes the state file
#[derive(Debug, Clone)]
pub struct PlaylistStore {
    path: PathBuf,
}

impl PlaylistStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> ConfigResult<SavedState> {
        let content = std::fs::read_to_string(&self.path)?;
        parse_state(&content)
    }

    /// Load the saved state, falling back to defaults on any failure
    pub fn load_or_default(&self) -> SavedState {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No saved state, using defaults");
            return SavedState::default();
        }

        match self.load() {
            Ok(state) => {
                info!(
                    path = %self.path.display(),
                    audios = state.audios.len(),
                    "Loaded saved state"
                );
                state
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Saved state unreadable, using defaults"
                );
                SavedState::default()
            }
        }
    }

    pub fn save(&self, state: &SavedState) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), audios = state.audios.len(), "Saved state");
        Ok(())
    }
}
