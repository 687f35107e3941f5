//! Audio playback for the scheduler
//!
//! The scheduler only needs a small capability: play a file and block until
//! it ends, stop everything, adjust volume. [`SoundBackend`] captures that.
//! With the `audio` feature the backend is rodio; without it a silent
//! backend validates files through the same cache and returns immediately.

pub mod cache;

#[cfg(feature = "audio")]
mod player;

#[cfg(feature = "audio")]
pub use player::RodioBackend as DefaultBackend;

#[cfg(not(feature = "audio"))]
mod stub;

#[cfg(not(feature = "audio"))]
pub use stub::SilentBackend as DefaultBackend;

pub use cache::{FileLoader, SoundCache, SoundData, SoundLoader, DEFAULT_CACHE_CAPACITY};

use std::path::Path;
use std::time::Duration;

use crate::error::PlaybackResult;
use crate::metrics::CacheMetrics;

/// Name of the output device entry that is always offered
pub const DEFAULT_DEVICE: &str = "System Default";

/// Frequency of the generated test tone (A4)
pub const TEST_TONE_HZ: f32 = 440.0;

/// Length of the generated test tone
pub const TEST_TONE_DURATION: Duration = Duration::from_millis(500);

/// Volume used until settings say otherwise
pub const DEFAULT_VOLUME: f32 = 0.5;

/// Clamp a volume level to 0.0..=1.0, mapping NaN to silence
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Something that can play sound files one at a time
pub trait SoundBackend: Send + Sync {
    /// Play a file and block until it finishes or [`SoundBackend::stop_all`]
    /// is called from another thread
    fn play(&self, path: &Path, volume: f32) -> PlaybackResult<()>;

    /// Play a generated sine tone, blocking until it ends
    fn play_tone(&self, frequency_hz: f32, duration: Duration, volume: f32) -> PlaybackResult<()>;

    /// Stop every sound that is currently playing
    fn stop_all(&self);

    /// Change the volume of the clip in flight
    fn set_volume(&self, _volume: f32) {}

    /// Output devices, best effort. Always starts with [`DEFAULT_DEVICE`].
    fn output_devices(&self) -> Vec<String> {
        vec![DEFAULT_DEVICE.to_string()]
    }

    /// Drop every loaded sound
    fn clear_cache(&self) {}

    /// Cache counters, if the backend caches
    fn cache_metrics(&self) -> CacheMetrics {
        CacheMetrics::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_volume() {
        assert_eq!(clamp_volume(0.7), 0.7);
        assert_eq!(clamp_volume(1.5), 1.0);
        assert_eq!(clamp_volume(-0.2), 0.0);
        assert_eq!(clamp_volume(f32::NAN), 0.0);
    }

    #[cfg(not(feature = "audio"))]
    #[test]
    fn test_default_backend_lists_default_device() {
        let backend = DefaultBackend::default();
        let devices = backend.output_devices();
        assert_eq!(devices.first().map(String::as_str), Some(DEFAULT_DEVICE));
    }
}
