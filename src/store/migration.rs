//! State file parsing and migration from the old format
//!
//! Early releases saved a bare JSON list of `{path, interval}` entries. The
//! current format is an object with an `audios` list plus settings. Both
//! load into [`SavedState`]; the old one picks up default settings.

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{SavedSettings, SavedState};
use crate::error::{ConfigError, ConfigResult};
use crate::playlist::AudioItem;

/// Entry as written on disk; the interval is checked before conversion
#[derive(Debug, Deserialize)]
struct RawEntry {
    path: String,
    interval: i64,
}

/// Parse either format into a [`SavedState`]
pub fn parse_state(content: &str) -> ConfigResult<SavedState> {
    let value: Value = serde_json::from_str(content)?;

    match value {
        Value::Array(entries) => {
            let audios = parse_entries(&entries);
            info!(audios = audios.len(), "Migrating from old playlist format");
            Ok(SavedState {
                audios,
                settings: SavedSettings::default(),
            })
        }
        Value::Object(mut map) => {
            let audios = match map.remove("audios") {
                Some(Value::Array(entries)) => parse_entries(&entries),
                Some(_) => {
                    warn!("'audios' is not a list, ignoring it");
                    Vec::new()
                }
                None => Vec::new(),
            };

            let settings = serde_json::from_value(Value::Object(map)).unwrap_or_else(|e| {
                warn!(error = %e, "Saved settings invalid, using defaults");
                SavedSettings::default()
            });

            Ok(SavedState { audios, settings })
        }
        _ => Err(ConfigError::InvalidValue(
            "state file must hold a list or an object".to_string(),
        )),
    }
}

fn parse_entries(entries: &[Value]) -> Vec<AudioItem> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(position, entry)| {
            let raw = match RawEntry::deserialize(entry) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(position, error = %e, "Skipping saved entry without path or interval");
                    return None;
                }
            };

            let interval = match u32::try_from(raw.interval) {
                Ok(interval) if interval > 0 => interval,
                _ => {
                    warn!(position, interval = raw.interval, "Skipping saved entry with invalid interval");
                    return None;
                }
            };

            AudioItem::new(raw.path, interval).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_legacy_list_gets_default_settings() {
        let state = parse_state(
            r#"[{"path": "a.wav", "interval": 5}, {"path": "b.wav", "interval": 10}]"#,
        )
        .unwrap();

        assert_eq!(state.audios.len(), 2);
        assert_eq!(state.audios[1].path, PathBuf::from("b.wav"));
        assert_eq!(state.settings, SavedSettings::default());
        assert_eq!(state.settings.volume, 0.5);
        assert!(state.settings.alert_enabled);
        assert!(!state.settings.schedule_enabled);
    }

    #[test]
    fn test_invalid_entries_skipped() {
        let state = parse_state(
            r#"{"audios": [
                {"path": "ok.wav", "interval": 3},
                {"path": "no-interval.wav"},
                {"interval": 4},
                {"path": "zero.wav", "interval": 0},
                {"path": "negative.wav", "interval": -2},
                "garbage"
            ]}"#,
        )
        .unwrap();

        assert_eq!(state.audios, vec![AudioItem::new("ok.wav", 3).unwrap()]);
    }

    #[test]
    fn test_missing_settings_use_defaults() {
        let state = parse_state(r#"{"audios": [], "volume": 0.9}"#).unwrap();
        assert_eq!(state.settings.volume, 0.9);
        assert!(state.settings.alert_enabled);
        assert_eq!(state.settings.start_time, "");
    }

    #[test]
    fn test_wrongly_typed_settings_fall_back() {
        let state = parse_state(
            r#"{"audios": [{"path": "a.wav", "interval": 1}], "volume": "loud"}"#,
        )
        .unwrap();
        assert_eq!(state.audios.len(), 1);
        assert_eq!(state.settings, SavedSettings::default());
    }

    #[test]
    fn test_scalar_document_rejected() {
        assert!(matches!(parse_state("42"), Err(ConfigError::InvalidValue(_))));
        assert!(matches!(parse_state("nope"), Err(ConfigError::StateError(_))));
    }
}
