//! Daily start/stop window
//!
//! Times are wall-clock "HH:MM". A trigger fires at most once per matching
//! minute.

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use tracing::info;

use crate::error::ConfigError;

const TIME_FORMAT: &str = "%H:%M";

/// Request produced by the schedule window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleAction {
    Start,
    Stop,
}

/// Configured start and stop times
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub enabled: bool,
    pub start: Option<NaiveTime>,
    pub stop: Option<NaiveTime>,
}

impl ScheduleWindow {
    /// Build a window from "HH:MM" strings; empty strings mean unset
    pub fn from_strings(enabled: bool, start: &str, stop: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            enabled,
            start: parse_time(start)?,
            stop: parse_time(stop)?,
        })
    }

    pub fn start_string(&self) -> String {
        format_time(self.start)
    }

    pub fn stop_string(&self) -> String {
        format_time(self.stop)
    }
}

/// Parse "HH:MM", treating blank input as unset
pub fn parse_time(value: &str) -> Result<Option<NaiveTime>, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }

    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue(format!("'{}' is not a valid HH:MM time", value)))
}

fn format_time(time: Option<NaiveTime>) -> String {
    time.map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_default()
}

fn same_minute(time: NaiveTime, now: NaiveDateTime) -> bool {
    time.hour() == now.hour() && time.minute() == now.minute()
}

/// Debounced evaluation of a [`ScheduleWindow`]
#[derive(Debug, Default)]
pub struct ScheduleTrigger {
    last_fired: Option<NaiveDateTime>,
}

impl ScheduleTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether the window asks for a start or stop right now.
    ///
    /// Start only fires while idle, stop only while running. Once anything
    /// fires, the rest of that minute is ignored.
    pub fn evaluate(
        &mut self,
        window: &ScheduleWindow,
        now: NaiveDateTime,
        running: bool,
    ) -> Option<ScheduleAction> {
        if !window.enabled {
            return None;
        }

        let minute = now.with_second(0).and_then(|t| t.with_nanosecond(0))?;
        if self.last_fired == Some(minute) {
            return None;
        }

        let action = if !running && window.start.is_some_and(|t| same_minute(t, now)) {
            ScheduleAction::Start
        } else if running && window.stop.is_some_and(|t| same_minute(t, now)) {
            ScheduleAction::Stop
        } else {
            return None;
        };

        self.last_fired = Some(minute);
        info!(action = ?action, time = %now.format(TIME_FORMAT), "Scheduled time reached");
        Some(action)
    }
}
