//! Recorder controller
//!
//! Recording rides on the preview session: the encoder surface is already a
//! target of every session, so starting a recording only means starting the
//! encoder once the preview is confirmed running. Stopping tears the preview
//! down, moves the temp file to its destination and brings the preview back.

pub mod encoder;
pub mod handoff;
pub mod mock;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::RecorderSettings;
use crate::error::RecordingError;
use crate::manager::CaptureSessionManager;
use encoder::EncoderSlot;

/// Outcome of a recording
pub trait RecordingListener: Send + Sync {
    fn on_saved(&self, path: &Path);

    fn on_error(&self, error: RecordingError);
}

#[derive(Default)]
struct RecordingState {
    is_recording: bool,
    pending_start: Option<JoinHandle<()>>,
}

/// Starts and stops recordings on top of a [`CaptureSessionManager`]
#[derive(Clone)]
pub struct RecorderController {
    manager: CaptureSessionManager,
    slot: Arc<EncoderSlot>,
    state: Arc<Mutex<RecordingState>>,
}

impl RecorderController {
    pub fn new(manager: CaptureSessionManager) -> Self {
        let slot = manager.encoder_slot();
        let state = Arc::new(Mutex::new(RecordingState::default()));

        // A failed encoder ends the recording; the caller decides whether to retry
        let latch = Arc::downgrade(&state);
        slot.set_failure_hook(Arc::new(move || {
            if let Some(state) = latch.upgrade() {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(task) = state.pending_start.take() {
                    task.abort();
                }
                state.is_recording = false;
            }
        }));

        Self {
            slot,
            manager,
            state,
        }
    }

    fn settings(&self) -> &RecorderSettings {
        self.slot.settings()
    }

    fn state(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_recording(&self) -> bool {
        self.state().is_recording
    }

    /// Begin recording as soon as the preview is running.
    ///
    /// Must be called from within a Tokio runtime. Ignored while a recording
    /// is already latched.
    pub fn start_record(&self, listener: Arc<dyn RecordingListener>) {
        let mut state = self.state();
        if state.is_recording {
            debug!("start_record ignored, already recording");
            return;
        }
        state.is_recording = true;
        self.slot.set_listener(Arc::clone(&listener));

        let manager = self.manager.clone();
        let slot = Arc::clone(&self.slot);
        let recording = Arc::clone(&self.state);
        let poll = self.settings().start_poll();
        state.pending_start = Some(tokio::spawn(async move {
            while !manager.is_previewing() {
                debug!("Preview not ready, retrying encoder start in {:?}", poll);
                tokio::time::sleep(poll).await;
            }
            match slot.start() {
                Ok(_) => info!("Recording started"),
                Err(e) => {
                    error!("Failed to start recording: {}", e);
                    if let Ok(mut state) = recording.lock() {
                        state.is_recording = false;
                    }
                    listener.on_error(RecordingError::from(e));
                }
            }
        }));
    }

    /// Finish the recording and move it to `dest`.
    ///
    /// Returns false without side effects when nothing is recording. Otherwise
    /// the preview is restarted whatever the outcome, and the listener hears
    /// exactly once.
    pub async fn stop_record(&self, dest: impl AsRef<Path>) -> bool {
        let dest = dest.as_ref().to_path_buf();
        {
            let mut state = self.state();
            if let Some(task) = state.pending_start.take() {
                task.abort();
            }
            if !state.is_recording {
                debug!("stop_record ignored, not recording");
                return false;
            }
            state.is_recording = false;
        }

        if let Some(started) = self.slot.started_at() {
            let remaining = self.settings().min_duration().saturating_sub(started.elapsed());
            if !remaining.is_zero() {
                debug!("Holding recording open for another {:?}", remaining);
                tokio::time::sleep(remaining).await;
            }
        }
        let stopped = self.slot.stop();

        if let Err(e) = self.manager.stop_preview().await {
            warn!("Failed to stop preview after recording: {}", e);
        }

        let listener = self.slot.take_listener();
        let outcome = match stopped {
            Ok(()) => finish(self.settings().temp_file.clone(), dest.clone()).await,
            // Whatever the encoder left behind is not a finished recording
            Err(e) => Err(RecordingError::from(e)),
        };
        let saved = match outcome {
            Ok(()) => {
                if let Some(listener) = &listener {
                    listener.on_saved(&dest);
                }
                true
            }
            Err(e) => {
                error!("Failed to save recording: {}", e);
                if let Some(listener) = &listener {
                    listener.on_error(e);
                }
                false
            }
        };

        if let Err(e) = self.manager.start_preview().await {
            warn!("Failed to restart preview after recording: {}", e);
        }
        saved
    }

    /// Drop a latched or pending recording without saving anything
    pub fn interrupt(&self) {
        let mut state = self.state();
        if let Some(task) = state.pending_start.take() {
            task.abort();
        }
        if state.is_recording {
            info!("Recording interrupted");
        }
        state.is_recording = false;
    }

    /// Microphone level in dB above the baseline amplitude
    pub fn audio_volume(&self) -> f64 {
        let Some(amplitude) = self.slot.max_amplitude() else {
            return 0.0;
        };
        let baseline = self.settings().audio_baseline;
        if baseline <= 0.0 {
            return 0.0;
        }
        let ratio = amplitude as f64 / baseline;
        if ratio > 1.0 {
            20.0 * ratio.log10()
        } else {
            0.0
        }
    }
}

async fn finish(temp: PathBuf, dest: PathBuf) -> Result<(), RecordingError> {
    tokio::task::spawn_blocking(move || handoff::hand_off(&temp, &dest))
        .await
        .map_err(|e| RecordingError::Copy(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::HeadlessScreen;
    use camera_capture::mock::MockBackend;
    use super::mock::MockEncoderFactory;

    fn recorder(factory: &MockEncoderFactory, dir: &Path) -> RecorderController {
        let mut settings = RecorderSettings::default();
        settings.temp_file = dir.join("temp.mp4");
        let manager = CaptureSessionManager::builder(
            Arc::new(MockBackend::with_default_cameras()),
            Arc::new(HeadlessScreen::new()),
        )
        .encoder(Arc::new(factory.clone()), settings)
        .build();
        RecorderController::new(manager)
    }

    #[tokio::test]
    async fn test_audio_volume() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockEncoderFactory::new();
        let recorder = recorder(&factory, dir.path());
        // Nothing prepared yet
        assert_eq!(recorder.audio_volume(), 0.0);

        let config = crate::manager::SessionConfig {
            preview_size: camera_capture::Size::new(480, 480),
            video_size: camera_capture::Size::new(480, 480),
            fps_range: None,
            orientation_hint: None,
        };
        recorder.slot.prepare(&config).unwrap();

        factory.set_amplitude(5);
        assert_eq!(recorder.audio_volume(), 0.0);
        factory.set_amplitude(10);
        assert_eq!(recorder.audio_volume(), 0.0);
        factory.set_amplitude(1000);
        assert!((recorder.audio_volume() - 40.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stop_without_recording_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockEncoderFactory::new();
        let recorder = recorder(&factory, dir.path());

        assert!(!recorder.stop_record(dir.path().join("clip.mp4")).await);
        assert_eq!(recorder.manager.state(), crate::state::SessionState::Idle);
        assert_eq!(factory.stats().starts(), 0);
    }

    #[tokio::test]
    async fn test_interrupt_clears_latch() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockEncoderFactory::new();
        let recorder = recorder(&factory, dir.path());

        struct Ignore;
        impl RecordingListener for Ignore {
            fn on_saved(&self, _: &Path) {}
            fn on_error(&self, _: RecordingError) {}
        }

        recorder.start_record(Arc::new(Ignore));
        assert!(recorder.is_recording());
        recorder.interrupt();
        assert!(!recorder.is_recording());
        assert!(!recorder.stop_record(dir.path().join("clip.mp4")).await);
    }
}
