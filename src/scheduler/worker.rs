//! The playback loop run by the worker thread
//!
//! One cycle is: resolve the current item (skipping missing files), play
//! the alert, play the clip, wait the item's interval, advance. Every
//! blocking step checks the run's shutdown signal first, and the wait polls
//! it at the configured granularity.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::signal::ShutdownSignal;
use super::{Phase, Shared};
use crate::playlist::AudioItem;
use crate::timer::PreciseTimer;

/// Pause after an unexpected failure inside a cycle
const ERROR_RETRY_DELAY: Duration = Duration::from_secs(1);

pub(super) fn run(shared: &Shared, signal: &ShutdownSignal) {
    info!("Playback worker started");

    while shared.is_running() && !signal.is_set() {
        let Some((index, item)) = resolve_current(shared) else {
            error!("No playable audio found, stopping sequence");
            break;
        };

        if signal.is_set() {
            break;
        }

        let cycle = panic::catch_unwind(AssertUnwindSafe(|| {
            run_cycle(shared, signal, index, &item);
        }));

        if cycle.is_err() {
            error!(
                index,
                retry_in_ms = ERROR_RETRY_DELAY.as_millis() as u64,
                "Playback cycle failed"
            );
            if signal.wait_timeout(ERROR_RETRY_DELAY) {
                break;
            }
        }

        advance(shared, signal);
    }

    shared.finish();
    info!("Playback worker stopped");
}

/// Find the item to play, starting at the cursor and skipping missing
/// files with wrap-around, at most one pass over the playlist
fn resolve_current(shared: &Shared) -> Option<(usize, AudioItem)> {
    let playlist = shared.read_playlist();
    let mut cursor = shared.lock_cursor();

    let len = playlist.len();
    if len == 0 {
        return None;
    }

    let mut index = cursor.current_index.unwrap_or(0);
    for _ in 0..len {
        if index >= len {
            index = 0;
        }

        let item = &playlist.items()[index];
        if item.is_playable() {
            cursor.current_index = Some(index);
            return Some((index, item.clone()));
        }

        warn!(
            index,
            path = %item.path.display(),
            "Skipping missing audio file"
        );
        shared.metrics.record_skip();
        index = (index + 1) % len;
    }

    cursor.current_index = Some(index);
    None
}

fn run_cycle(shared: &Shared, signal: &ShutdownSignal, index: usize, item: &AudioItem) {
    let wait = item.wait_duration(shared.settings.interval_unit);
    shared.begin_cycle(signal, wait);

    if shared.options().alert_enabled && !signal.is_set() {
        play_alert(shared, signal);
    }

    if !signal.is_set() {
        shared.set_live_phase(signal, Phase::Playing);
        info!(index, file = %item.display_name(), "Playing audio");
        if let Err(e) = shared.backend.play(&item.path, shared.options().volume) {
            error!(index, file = %item.display_name(), error = %e, "Playback failed");
            shared.metrics.record_failure();
        }
    }

    shared.metrics.record_cycle();
    if signal.is_set() {
        return;
    }

    let timer = Arc::new(PreciseTimer::with_callback(wait, move || {
        debug!(index, "Interval elapsed");
    }));
    shared.install_timer(Arc::clone(&timer));
    shared.set_live_phase(signal, Phase::Waiting);

    let poll = shared.settings.poll_interval;
    while shared.is_running() && !signal.is_set() {
        let remaining = timer.remaining();
        if remaining.is_zero() {
            break;
        }
        if signal.wait_timeout(remaining.min(poll)) {
            break;
        }
    }
}

fn play_alert(shared: &Shared, signal: &ShutdownSignal) {
    let alert = &shared.settings.alert_sound;
    if !alert.exists() {
        debug!(path = %alert.display(), "Alert sound not found, skipping");
        return;
    }

    shared.set_live_phase(signal, Phase::Alert);
    if let Err(e) = shared.backend.play(alert, shared.options().volume) {
        warn!(error = %e, "Alert sound failed");
        shared.metrics.record_failure();
    }
}

/// Move the cursor one step, wrapping. Skipped once shutdown is requested
/// so a stopping run leaves the cursor alone.
fn advance(shared: &Shared, signal: &ShutdownSignal) {
    let playlist = shared.read_playlist();
    let mut cursor = shared.lock_cursor();

    if signal.is_set() {
        return;
    }

    let len = playlist.len();
    if len == 0 {
        return;
    }

    cursor.current_index = Some(cursor.current_index.map_or(0, |i| (i + 1) % len));
}
