//! Mock hardware encoder
//!
//! Writes a small placeholder file to the profile's output path so the
//! recording handoff has something real to move around.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use camera_capture::{FrameSink, RawFrame};
use tracing::debug;

use super::encoder::{Encoder, EncoderErrorHook, EncoderFactory, EncoderProfile};
use crate::error::EncoderError;

/// Counters shared by a mock encoder factory and its encoders
#[derive(Debug, Default)]
pub struct MockEncoderStats {
    prepares: AtomicUsize,
    stops: AtomicUsize,
    frames: AtomicU64,
    started_at: Mutex<Vec<Instant>>,
    stopped_at: Mutex<Vec<Instant>>,
    last_profile: Mutex<Option<EncoderProfile>>,
}

impl MockEncoderStats {
    pub fn prepares(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.started_at.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Frames written to encoder surfaces
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn started_at(&self) -> Vec<Instant> {
        self.started_at.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn stopped_at(&self) -> Vec<Instant> {
        self.stopped_at.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_profile(&self) -> Option<EncoderProfile> {
        self.last_profile.lock().ok().and_then(|p| p.clone())
    }
}

#[derive(Debug, Default)]
struct Behaviour {
    empty_output: bool,
    start_error: Option<EncoderError>,
    stop_error: Option<EncoderError>,
}

/// Factory producing file-writing mock encoders
#[derive(Clone, Default)]
pub struct MockEncoderFactory {
    stats: Arc<MockEncoderStats>,
    behaviour: Arc<Mutex<Behaviour>>,
    amplitude: Arc<AtomicU32>,
    hook: Arc<Mutex<Option<EncoderErrorHook>>>,
}

impl MockEncoderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave the output file empty on stop
    pub fn with_empty_output(self) -> Self {
        if let Ok(mut behaviour) = self.behaviour.lock() {
            behaviour.empty_output = true;
        }
        self
    }

    /// Fail every `start` with `error`
    pub fn with_start_error(self, error: EncoderError) -> Self {
        if let Ok(mut behaviour) = self.behaviour.lock() {
            behaviour.start_error = Some(error);
        }
        self
    }

    /// Fail every `stop` with `error`, leaving a partial output file
    pub fn with_stop_error(self, error: EncoderError) -> Self {
        if let Ok(mut behaviour) = self.behaviour.lock() {
            behaviour.stop_error = Some(error);
        }
        self
    }

    /// Amplitude reported by `max_amplitude`
    pub fn set_amplitude(&self, amplitude: u32) {
        self.amplitude.store(amplitude, Ordering::SeqCst);
    }

    /// Raise an asynchronous error on the most recently prepared encoder
    pub fn fail_active(&self, message: &str) -> bool {
        let hook = self.hook.lock().ok().and_then(|h| h.clone());
        match hook {
            Some(hook) => {
                hook(EncoderError::Failed(message.to_string()));
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> Arc<MockEncoderStats> {
        Arc::clone(&self.stats)
    }
}

impl EncoderFactory for MockEncoderFactory {
    fn prepare(
        &self,
        profile: &EncoderProfile,
        on_error: EncoderErrorHook,
    ) -> Result<Box<dyn Encoder>, EncoderError> {
        if profile.bitrate == 0 {
            return Err(EncoderError::Configure("zero bitrate".to_string()));
        }
        self.stats.prepares.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.stats.last_profile.lock() {
            *last = Some(profile.clone());
        }
        if let Ok(mut hook) = self.hook.lock() {
            *hook = Some(on_error);
        }

        let (empty_output, start_error, stop_error) = self
            .behaviour
            .lock()
            .map(|b| (b.empty_output, b.start_error.clone(), b.stop_error.clone()))
            .unwrap_or_default();

        Ok(Box::new(MockEncoder {
            output: profile.output.clone(),
            surface: Arc::new(MockEncoderSurface {
                stats: Arc::clone(&self.stats),
            }),
            stats: Arc::clone(&self.stats),
            amplitude: Arc::clone(&self.amplitude),
            empty_output,
            start_error,
            stop_error,
            started_frames: None,
        }))
    }
}

struct MockEncoderSurface {
    stats: Arc<MockEncoderStats>,
}

impl FrameSink for MockEncoderSurface {
    fn push(&self, _frame: &RawFrame) -> bool {
        self.stats.frames.fetch_add(1, Ordering::Relaxed);
        true
    }
}

struct MockEncoder {
    output: PathBuf,
    surface: Arc<MockEncoderSurface>,
    stats: Arc<MockEncoderStats>,
    amplitude: Arc<AtomicU32>,
    empty_output: bool,
    start_error: Option<EncoderError>,
    stop_error: Option<EncoderError>,
    /// Surface frame count when recording began
    started_frames: Option<u64>,
}

impl Encoder for MockEncoder {
    fn surface(&self) -> Arc<dyn FrameSink> {
        self.surface.clone()
    }

    fn start(&mut self) -> Result<(), EncoderError> {
        if let Some(err) = &self.start_error {
            return Err(err.clone());
        }
        fs::File::create(&self.output).map_err(|e| EncoderError::Failed(e.to_string()))?;
        self.started_frames = Some(self.stats.frames());
        if let Ok(mut started) = self.stats.started_at.lock() {
            started.push(Instant::now());
        }
        debug!("Mock encoder writing to {:?}", self.output);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EncoderError> {
        let first = self.started_frames.take().ok_or(EncoderError::NotPrepared)?;
        self.stats.stops.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut stopped) = self.stats.stopped_at.lock() {
            stopped.push(Instant::now());
        }
        if self.empty_output {
            return Ok(());
        }
        if let Some(err) = &self.stop_error {
            // Header cut short
            fs::write(&self.output, b"\0\0\0").map_err(|e| EncoderError::Failed(e.to_string()))?;
            return Err(err.clone());
        }

        let frames = self.stats.frames().saturating_sub(first);
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&self.output)
            .map_err(|e| EncoderError::Failed(e.to_string()))?;
        file.write_all(b"\0\0\0\x18ftypmp42")
            .and_then(|_| file.write_all(&frames.to_be_bytes()))
            .map_err(|e| EncoderError::Failed(e.to_string()))
    }

    fn max_amplitude(&self) -> u32 {
        self.amplitude.load(Ordering::SeqCst)
    }
}
