//! Sound backend implementation using rodio

use std::io::Cursor;
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use tracing::{debug, info, warn};

use super::cache::{FileLoader, SoundCache, SoundData, SoundLoader};
use super::{clamp_volume, SoundBackend, DEFAULT_DEVICE};
use crate::error::{LoadError, PlaybackError, PlaybackResult};
use crate::metrics::CacheMetrics;

/// How often a blocking play checks whether its sink has drained
const COMPLETION_POLL: Duration = Duration::from_millis(10);

/// Reads the file and checks that rodio can decode it
struct DecodingLoader;

impl SoundLoader for DecodingLoader {
    type Handle = SoundData;

    fn load(&self, path: &Path) -> Result<SoundData, LoadError> {
        let data = FileLoader.load(path)?;
        Decoder::new(Cursor::new(data.clone())).map_err(|e| LoadError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(data)
    }
}

/// Keeps the output stream alive on its own thread.
///
/// `OutputStream` cannot cross threads, so it is created and dropped on a
/// dedicated one; only the handle is shared.
struct StreamGuard {
    close: Option<mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        drop(self.close.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Rodio-backed player. One clip plays at a time per caller; `stop_all`
/// interrupts every clip in flight.
pub struct RodioBackend {
    stream_handle: OutputStreamHandle,
    cache: SoundCache<DecodingLoader>,
    active: Mutex<Vec<Arc<Sink>>>,
    _stream: StreamGuard,
}

impl RodioBackend {
    /// Open the system default output
    pub fn new() -> PlaybackResult<Self> {
        Self::open(None, super::DEFAULT_CACHE_CAPACITY)
    }

    /// Open a named output device, or the default one when `device` is
    /// `None` or [`DEFAULT_DEVICE`]
    pub fn open(device: Option<&str>, cache_capacity: usize) -> PlaybackResult<Self> {
        let device = device
            .filter(|name| *name != DEFAULT_DEVICE)
            .map(str::to_string);
        let (stream_handle, guard) = spawn_stream(device.clone())?;

        info!(
            device = device.as_deref().unwrap_or(DEFAULT_DEVICE),
            "Audio backend initialized"
        );

        Ok(Self {
            stream_handle,
            cache: SoundCache::with_capacity(DecodingLoader, cache_capacity),
            active: Mutex::new(Vec::new()),
            _stream: guard,
        })
    }

    fn active(&self) -> MutexGuard<'_, Vec<Arc<Sink>>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn new_sink(&self, volume: f32) -> PlaybackResult<Sink> {
        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;
        sink.set_volume(clamp_volume(volume));
        Ok(sink)
    }

    /// Block until the sink drains, which also happens after `stop_all`
    fn wait_for(&self, sink: Sink) {
        let sink = Arc::new(sink);
        self.active().push(Arc::clone(&sink));

        while !sink.empty() {
            thread::sleep(COMPLETION_POLL);
        }

        self.active().retain(|s| !Arc::ptr_eq(s, &sink));
    }
}

impl SoundBackend for RodioBackend {
    fn play(&self, path: &Path, volume: f32) -> PlaybackResult<()> {
        debug!(path = %path.display(), "Playing sound file");

        let data = self.cache.get_or_load(path)?;
        let source = Decoder::new(Cursor::new(data)).map_err(|e| LoadError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let sink = self.new_sink(volume)?;
        sink.append(source);
        self.wait_for(sink);
        Ok(())
    }

    fn play_tone(&self, frequency_hz: f32, duration: Duration, volume: f32) -> PlaybackResult<()> {
        debug!(frequency_hz, duration_ms = duration.as_millis() as u64, "Playing test tone");

        let sink = self.new_sink(volume)?;
        sink.append(SamplesSource::tone(frequency_hz, duration, 44100));
        self.wait_for(sink);
        Ok(())
    }

    fn stop_all(&self) {
        let sinks: Vec<_> = self.active().drain(..).collect();
        if !sinks.is_empty() {
            debug!(count = sinks.len(), "Stopping active sounds");
        }
        for sink in sinks {
            sink.stop();
        }
    }

    fn set_volume(&self, volume: f32) {
        let volume = clamp_volume(volume);
        for sink in self.active().iter() {
            sink.set_volume(volume);
        }
    }

    fn output_devices(&self) -> Vec<String> {
        let mut devices = vec![DEFAULT_DEVICE.to_string()];
        match rodio::cpal::default_host().output_devices() {
            Ok(found) => devices.extend(found.filter_map(|d| d.name().ok())),
            Err(e) => warn!(error = %e, "Output device enumeration unavailable"),
        }
        devices
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }

    fn cache_metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }
}

fn spawn_stream(device: Option<String>) -> PlaybackResult<(OutputStreamHandle, StreamGuard)> {
    let (ready_tx, ready_rx) = mpsc::channel();
    let (close_tx, close_rx) = mpsc::channel::<()>();

    let thread = thread::Builder::new()
        .name("audio-output".to_string())
        .spawn(move || match open_output(device.as_deref()) {
            Ok((stream, handle)) => {
                if ready_tx.send(Ok(handle)).is_err() {
                    return;
                }
                // Parked until the guard drops its sender
                let _ = close_rx.recv();
                drop(stream);
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        })
        .map_err(|e| PlaybackError::Stream(e.to_string()))?;

    let handle = ready_rx.recv().map_err(|_| PlaybackError::NotAvailable)??;

    Ok((
        handle,
        StreamGuard {
            close: Some(close_tx),
            thread: Some(thread),
        },
    ))
}

fn open_output(device: Option<&str>) -> PlaybackResult<(OutputStream, OutputStreamHandle)> {
    let Some(name) = device else {
        return OutputStream::try_default().map_err(|e| PlaybackError::Stream(e.to_string()));
    };

    let devices = rodio::cpal::default_host()
        .output_devices()
        .map_err(|e| PlaybackError::Device(e.to_string()))?;

    for candidate in devices {
        if candidate.name().map(|n| n == name).unwrap_or(false) {
            return OutputStream::try_from_device(&candidate)
                .map_err(|e| PlaybackError::Device(e.to_string()));
        }
    }

    Err(PlaybackError::Device(format!("output device not found: {}", name)))
}

/// Simple samples-based audio source for generated tones
struct SamplesSource {
    samples: Vec<f32>,
    position: usize,
    sample_rate: u32,
}

impl SamplesSource {
    /// Sine tone with a short fade in and fade out
    fn tone(frequency: f32, duration: Duration, sample_rate: u32) -> Self {
        let secs = duration.as_secs_f32();
        let count = (sample_rate as f32 * secs) as usize;
        let samples = (0..count)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                let envelope = if t < 0.01 {
                    t / 0.01
                } else if t > secs - 0.05 {
                    ((secs - t) / 0.05).max(0.0)
                } else {
                    1.0
                };
                (t * frequency * 2.0 * std::f32::consts::PI).sin() * envelope * 0.3
            })
            .collect();

        Self {
            samples,
            position: 0,
            sample_rate,
        }
    }
}

impl Iterator for SamplesSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = self.samples.get(self.position).copied();
        if sample.is_some() {
            self.position += 1;
        }
        sample
    }
}

impl Source for SamplesSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.samples.len() - self.position)
    }

    fn channels(&self) -> u16 {
        1 // Mono
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        let samples_remaining = self.samples.len() - self.position;
        Some(Duration::from_secs_f32(
            samples_remaining as f32 / self.sample_rate as f32,
        ))
    }
}
