//! Silent backend used when the `audio` feature is disabled

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::cache::{FileLoader, SoundCache};
use super::SoundBackend;
use crate::error::PlaybackResult;
use crate::metrics::CacheMetrics;

/// Loads files through the cache so missing or empty files still fail,
/// but produces no sound and never blocks
pub struct SilentBackend {
    cache: SoundCache<FileLoader>,
}

impl SilentBackend {
    pub fn new() -> Self {
        debug!("Audio feature not enabled, using silent backend");
        Self {
            cache: SoundCache::new(FileLoader),
        }
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            cache: SoundCache::with_capacity(FileLoader, capacity),
        }
    }

    /// Same shape as the rodio constructor; the device name is ignored
    pub fn open(device: Option<&str>, cache_capacity: usize) -> PlaybackResult<Self> {
        if let Some(device) = device {
            debug!(device, "Output device ignored by silent backend");
        }
        Ok(Self::with_cache_capacity(cache_capacity))
    }
}

impl Default for SilentBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundBackend for SilentBackend {
    fn play(&self, path: &Path, volume: f32) -> PlaybackResult<()> {
        let data = self.cache.get_or_load(path)?;
        debug!(
            path = %path.display(),
            bytes = data.len(),
            volume,
            "Playback skipped (audio feature not enabled)"
        );
        Ok(())
    }

    fn play_tone(&self, frequency_hz: f32, duration: Duration, _volume: f32) -> PlaybackResult<()> {
        debug!(
            frequency_hz,
            duration_ms = duration.as_millis() as u64,
            "Tone skipped (audio feature not enabled)"
        );
        Ok(())
    }

    fn stop_all(&self) {}

    fn clear_cache(&self) {
        self.cache.clear();
    }

    fn cache_metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LoadError, PlaybackError};

    #[test]
    fn test_missing_file_fails() {
        let backend = SilentBackend::new();
        let result = backend.play(Path::new("/no/such/clip.wav"), 0.5);
        assert!(matches!(
            result,
            Err(PlaybackError::Load(LoadError::NotFound(_)))
        ));
    }

    #[test]
    fn test_existing_file_goes_through_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, b"data").unwrap();

        let backend = SilentBackend::new();
        backend.play(&path, 0.5).unwrap();
        backend.play(&path, 0.5).unwrap();

        assert_eq!(backend.cache_metrics().misses(), 1);
        assert_eq!(backend.cache_metrics().hits(), 1);

        backend.clear_cache();
        backend.play(&path, 0.5).unwrap();
        assert_eq!(backend.cache_metrics().misses(), 2);
    }
}
