//! Session and recorder configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use camera_capture::{Facing, SelectionPolicy};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Name of the scratch file the encoder writes to
pub const VIDEO_TEMP_FILE: &str = "camera_video_temp.mp4";

/// Capture session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Preferred lens facing
    pub facing: Facing,

    /// Size and fps selection thresholds
    pub selection: SelectionPolicy,

    /// Analysis reader pool depth
    pub reader_max_images: usize,

    /// Bound on waiting for the exclusive device lock (milliseconds)
    pub lock_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            facing: Facing::Front,
            selection: SelectionPolicy::default(),
            reader_max_images: 1,
            lock_timeout_ms: 2000,
        }
    }
}

impl SessionSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Recorder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    /// Encoder frame rate, independent of the preview rate
    pub frame_rate: u32,

    /// Shortest recording the encoder is allowed to finish (milliseconds)
    pub min_duration_ms: u64,

    /// Interval between preview-readiness checks when starting (milliseconds)
    pub start_poll_ms: u64,

    /// Scratch file written by the encoder
    pub temp_file: PathBuf,

    /// Amplitude treated as 0 dB
    pub audio_baseline: f64,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        let cache = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            frame_rate: 16,
            min_duration_ms: 1000,
            start_poll_ms: 500,
            temp_file: cache.join(VIDEO_TEMP_FILE),
            audio_baseline: 10.0,
        }
    }
}

impl RecorderSettings {
    pub fn min_duration(&self) -> Duration {
        Duration::from_millis(self.min_duration_ms)
    }

    pub fn start_poll(&self) -> Duration {
        Duration::from_millis(self.start_poll_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.audio_baseline.is_finite() && self.audio_baseline > 0.0) {
            return Err(ConfigError::Message(format!(
                "recorder.audio_baseline must be a positive number, got {}",
                self.audio_baseline
            )));
        }
        Ok(())
    }
}

/// Complete camera configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub session: SessionSettings,
    pub recorder: RecorderSettings,
}

impl CameraSettings {
    /// Load settings from an optional file, then `CAMERA__*` environment
    /// variables (e.g. `CAMERA__RECORDER__FRAME_RATE=24`). Missing keys keep
    /// their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(
                Environment::with_prefix("CAMERA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()
            .and_then(|settings| {
                settings.recorder.validate()?;
                Ok(settings)
            })
    }
}
