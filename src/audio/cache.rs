// Bounded sound cache shared by the playback worker and test playback

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::error::LoadError;
use crate::metrics::CacheMetrics;

/// Number of sounds kept loaded at once
pub const DEFAULT_CACHE_CAPACITY: usize = 5;

/// Turns a path into a playable handle
pub trait SoundLoader: Send + Sync {
    type Handle: Clone + Send;

    fn load(&self, path: &Path) -> Result<Self::Handle, LoadError>;
}

/// Raw bytes of a sound file, cheap to clone
#[derive(Debug, Clone)]
pub struct SoundData(Arc<[u8]>);

impl SoundData {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for SoundData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for SoundData {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

/// Reads the whole file into memory
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl SoundLoader for FileLoader {
    type Handle = SoundData;

    fn load(&self, path: &Path) -> Result<SoundData, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if bytes.is_empty() {
            return Err(LoadError::Malformed {
                path: path.to_path_buf(),
                reason: "file is empty".to_string(),
            });
        }

        Ok(SoundData::from(bytes))
    }
}

struct CacheInner<H> {
    entries: HashMap<PathBuf, H>,
    // insertion order, oldest first
    order: VecDeque<PathBuf>,
    metrics: CacheMetrics,
}

/// FIFO-bounded map from path to loaded sound.
///
/// When full, the entry inserted longest ago is evicted regardless of how
/// recently it was read. One mutex covers lookup, load, insert, eviction
/// and clear.
pub struct SoundCache<L: SoundLoader> {
    loader: L,
    capacity: usize,
    inner: Mutex<CacheInner<L::Handle>>,
}

impl<L: SoundLoader> SoundCache<L> {
    pub fn new(loader: L) -> Self {
        Self::with_capacity(loader, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(loader: L, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            loader,
            capacity,
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
                metrics: CacheMetrics::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<L::Handle>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the cached handle for `path`, loading it on a miss
    pub fn get_or_load(&self, path: &Path) -> Result<L::Handle, LoadError> {
        let mut inner = self.lock();

        if let Some(handle) = inner.entries.get(path) {
            let handle = handle.clone();
            inner.metrics.record_hit();
            return Ok(handle);
        }

        inner.metrics.record_miss();
        let handle = self.loader.load(path)?;

        if inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
                inner.metrics.record_eviction(1);
                debug!(evicted = %oldest.display(), "Evicted oldest sound from cache");
            }
        }

        inner.order.push_back(path.to_path_buf());
        inner.entries.insert(path.to_path_buf(), handle.clone());
        Ok(handle)
    }

    /// Evict every entry
    pub fn clear(&self) {
        let mut inner = self.lock();
        let evicted = inner.entries.len() as u64;
        inner.entries.clear();
        inner.order.clear();
        inner.metrics.record_eviction(evicted);
        debug!(evicted, "Cleared sound cache");
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get current cache metrics
    pub fn metrics(&self) -> CacheMetrics {
        self.lock().metrics
    }
}
