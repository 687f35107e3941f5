//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use audio_scheduler::error::PlaybackResult;
use audio_scheduler::scheduler::SchedulerSettings;
use audio_scheduler::SoundBackend;

/// Records every play call. Each clip "lasts" `clip` unless `stop_all`
/// interrupts it; with `ignore_stop` the clip always runs to the end.
pub struct RecordingBackend {
    clip: Duration,
    ignore_stop: bool,
    plays: Mutex<Vec<(PathBuf, Instant)>>,
    generation: Mutex<u64>,
    wake: Condvar,
    active: AtomicUsize,
    max_active: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl RecordingBackend {
    pub fn new(clip: Duration) -> Self {
        Self {
            clip,
            ignore_stop: false,
            plays: Mutex::new(Vec::new()),
            generation: Mutex::new(0),
            wake: Condvar::new(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }

    pub fn stubborn(clip: Duration) -> Self {
        Self {
            ignore_stop: true,
            ..Self::new(clip)
        }
    }

    pub fn plays(&self) -> Vec<(PathBuf, Instant)> {
        self.plays.lock().unwrap().clone()
    }

    pub fn played_paths(&self) -> Vec<PathBuf> {
        self.plays().into_iter().map(|(path, _)| path).collect()
    }

    pub fn play_count(&self) -> usize {
        self.plays.lock().unwrap().len()
    }

    /// Most clips ever playing at the same time
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    fn block_for_clip(&self) {
        let deadline = Instant::now() + self.clip;
        let mut generation = self.generation.lock().unwrap();
        let started = *generation;

        loop {
            let now = Instant::now();
            if now >= deadline || (!self.ignore_stop && *generation != started) {
                return;
            }
            generation = self.wake.wait_timeout(generation, deadline - now).unwrap().0;
        }
    }
}

impl SoundBackend for RecordingBackend {
    fn play(&self, path: &Path, _volume: f32) -> PlaybackResult<()> {
        self.plays
            .lock()
            .unwrap()
            .push((path.to_path_buf(), Instant::now()));

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.block_for_clip();
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn play_tone(&self, _frequency_hz: f32, _duration: Duration, _volume: f32) -> PlaybackResult<()> {
        Ok(())
    }

    fn stop_all(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        *self.generation.lock().unwrap() += 1;
        self.wake.notify_all();
    }
}

/// Scheduler settings where one interval minute lasts `unit`
pub fn fast_settings(dir: &Path, unit: Duration) -> SchedulerSettings {
    SchedulerSettings {
        poll_interval: Duration::from_millis(10),
        stop_timeout: Duration::from_secs(3),
        interval_unit: unit,
        alert_sound: dir.join("alert.wav"),
    }
}

/// Create a non-empty sound file in `dir`
pub fn sound_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"RIFF....WAVE").unwrap();
    path
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
