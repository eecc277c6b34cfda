//! Camera Helper
//!
//! Runs a preview and recording session end to end against the mock camera
//! and encoder. Useful for exercising the session layer without hardware.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camera_capture::mock::MockBackend;
use camera_capture::VideoFrame;
use camera_session::{
    CameraSettings, CaptureSessionManager, HeadlessScreen, LifecycleAdapter, LifecycleEvent,
    MockEncoderFactory, PreviewObserver, RecorderController, RecordingError, RecordingListener,
    SessionError,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Helper error types
#[derive(Error, Debug)]
pub enum HelperError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` level.
pub fn init_logging(json: bool) -> Result<(), HelperError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.map_err(|e| HelperError::Logging(e.to_string()))
}

/// Timestamped clip name in the current directory
pub fn default_output() -> PathBuf {
    PathBuf::from(chrono::Local::now().format("clip_%Y%m%d_%H%M%S.mp4").to_string())
}

/// Logs every 30th preview frame
#[derive(Debug, Default)]
pub struct FrameLogger {
    frames: AtomicU64,
}

impl FrameLogger {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl PreviewObserver for FrameLogger {
    fn on_preview_frame(&self, frame: VideoFrame) {
        let count = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if count % 30 == 1 {
            debug!(
                "Preview frame #{} {}x{} seq={}",
                count, frame.width, frame.height, frame.sequence
            );
        }
    }

    fn on_session_error(&self, error: &SessionError) {
        error!("Camera session error: {}", error);
    }
}

/// Logs the outcome of a recording
#[derive(Debug, Default)]
pub struct LogListener;

impl RecordingListener for LogListener {
    fn on_saved(&self, path: &Path) {
        info!("Recording saved: {}", path.display());
    }

    fn on_error(&self, error: RecordingError) {
        error!("Recording failed: {}", error);
    }
}

/// Record `duration` of video to `output` with the mock hardware.
/// Returns whether the clip was saved.
pub async fn record_clip(
    settings: &CameraSettings,
    duration: Duration,
    output: &Path,
) -> Result<bool, HelperError> {
    let backend = Arc::new(MockBackend::with_default_cameras());
    let manager = CaptureSessionManager::builder(backend, Arc::new(HeadlessScreen::new()))
        .settings(settings.session.clone())
        .encoder(Arc::new(MockEncoderFactory::new()), settings.recorder.clone())
        .build();
    let frames = Arc::new(FrameLogger::default());
    manager.set_preview_observer(frames.clone());

    let recorder = RecorderController::new(manager.clone());
    let lifecycle = LifecycleAdapter::new(manager, recorder.clone());

    lifecycle.handle(LifecycleEvent::Visible).await?;
    recorder.start_record(Arc::new(LogListener));
    info!("Recording {:?} to {}", duration, output.display());
    tokio::time::sleep(duration).await;
    debug!("Audio level {:.1} dB", recorder.audio_volume());

    let saved = recorder.stop_record(output).await;
    if !saved {
        warn!("No clip written to {}", output.display());
    }
    lifecycle.handle(LifecycleEvent::Destroyed).await?;
    info!("Session done, {} preview frames", frames.frames());
    Ok(saved)
}
