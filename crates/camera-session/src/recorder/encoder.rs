//! Hardware encoder abstraction and the shared encoder slot
//!
//! The capture session manager prepares the encoder whenever a device opens
//! so its input surface can join the session; the recorder starts and stops
//! it. Both go through one [`EncoderSlot`].

use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use camera_capture::{FrameSink, OutputTarget, Rotation, Size, TargetKind};
use tracing::{debug, error, info, warn};

use super::RecordingListener;
use crate::config::RecorderSettings;
use crate::error::{EncoderError, RecordingError};
use crate::manager::SessionConfig;

/// Sensor mounted at 90 degrees: display rotation to hint
pub const DEFAULT_ORIENTATIONS: [u32; 4] = [90, 0, 270, 180];

/// Sensor mounted at 270 degrees: display rotation to hint
pub const INVERSE_ORIENTATIONS: [u32; 4] = [270, 180, 90, 0];

fn table_index(rotation: Rotation) -> usize {
    match rotation {
        Rotation::Deg0 => 0,
        Rotation::Deg90 => 1,
        Rotation::Deg180 => 2,
        Rotation::Deg270 => 3,
    }
}

pub fn default_orientation(rotation: Rotation) -> u32 {
    DEFAULT_ORIENTATIONS[table_index(rotation)]
}

pub fn inverse_orientation(rotation: Rotation) -> u32 {
    INVERSE_ORIENTATIONS[table_index(rotation)]
}

/// Playback orientation hint for a sensor orientation under a display rotation.
/// Only 90 and 270 degree sensors get a hint.
pub fn orientation_hint(sensor_orientation: u32, rotation: Rotation) -> Option<u32> {
    match sensor_orientation {
        90 => Some(default_orientation(rotation)),
        270 => Some(inverse_orientation(rotation)),
        _ => None,
    }
}

/// Bits per second for a video size
pub fn bitrate_for(size: Size) -> u32 {
    let bits = size.area() * 2 / 3;
    u32::try_from(bits).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSource {
    Microphone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSource {
    Surface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Mpeg4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Aac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
}

/// Everything an encoder needs to be prepared
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderProfile {
    pub audio_source: AudioSource,
    pub video_source: VideoSource,
    pub container: ContainerFormat,
    pub audio_codec: AudioCodec,
    pub video_codec: VideoCodec,
    pub video_size: Size,
    pub bitrate: u32,
    pub frame_rate: u32,
    pub orientation_hint: Option<u32>,
    pub output: PathBuf,
}

impl EncoderProfile {
    pub fn new(config: &SessionConfig, settings: &RecorderSettings) -> Self {
        Self {
            audio_source: AudioSource::Microphone,
            video_source: VideoSource::Surface,
            container: ContainerFormat::Mpeg4,
            audio_codec: AudioCodec::Aac,
            video_codec: VideoCodec::H264,
            video_size: config.video_size,
            bitrate: bitrate_for(config.video_size),
            frame_rate: settings.frame_rate,
            orientation_hint: config.orientation_hint,
            output: settings.temp_file.clone(),
        }
    }
}

/// Callback for failures the encoder reports after it was started.
///
/// Must not be invoked from inside [`Encoder::start`] or [`Encoder::stop`].
pub type EncoderErrorHook = Arc<dyn Fn(EncoderError) + Send + Sync>;

/// A prepared hardware encoder
pub trait Encoder: Send {
    /// Input surface the capture session writes frames into
    fn surface(&self) -> Arc<dyn FrameSink>;

    fn start(&mut self) -> Result<(), EncoderError>;

    /// Finish the output file
    fn stop(&mut self) -> Result<(), EncoderError>;

    /// Peak audio amplitude since the previous call
    fn max_amplitude(&self) -> u32;
}

/// Creates prepared encoders
pub trait EncoderFactory: Send + Sync {
    fn prepare(
        &self,
        profile: &EncoderProfile,
        on_error: EncoderErrorHook,
    ) -> Result<Box<dyn Encoder>, EncoderError>;
}

#[derive(Default)]
struct SlotState {
    encoder: Option<Box<dyn Encoder>>,
    started_at: Option<Instant>,
    listener: Option<Arc<dyn RecordingListener>>,
    on_failure: Option<FailureHook>,
}

/// Notified after a running encoder failed and was stopped
pub type FailureHook = Arc<dyn Fn() + Send + Sync>;

/// The one encoder of a camera pipeline, shared by the session manager and
/// the recorder
pub struct EncoderSlot {
    factory: Option<Arc<dyn EncoderFactory>>,
    settings: RecorderSettings,
    state: Mutex<SlotState>,
    this: Weak<EncoderSlot>,
}

impl EncoderSlot {
    pub fn new(factory: Option<Arc<dyn EncoderFactory>>, settings: RecorderSettings) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            factory,
            settings,
            state: Mutex::new(SlotState::default()),
            this: this.clone(),
        })
    }

    /// A slot that never prepares an encoder
    pub fn disabled() -> Arc<Self> {
        Self::new(None, RecorderSettings::default())
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    /// Prepare a fresh encoder for `config`, deleting any stale temp file.
    /// Returns the encoder's output target, or `None` when there is no
    /// factory or preparation failed.
    pub fn prepare(&self, config: &SessionConfig) -> Option<OutputTarget> {
        let factory = self.factory.as_ref()?;
        let profile = EncoderProfile::new(config, &self.settings);

        if profile.output.exists() {
            if let Err(e) = std::fs::remove_file(&profile.output) {
                warn!("Failed to delete stale temp file {:?}: {}", profile.output, e);
            }
        }

        let this = self.this.clone();
        let hook: EncoderErrorHook = Arc::new(move |err| {
            if let Some(slot) = this.upgrade() {
                slot.report(err);
            }
        });

        let encoder = match factory.prepare(&profile, hook) {
            Ok(encoder) => encoder,
            Err(e) => {
                error!("Encoder prepare failed: {}", e);
                return None;
            }
        };
        debug!(
            "Encoder prepared: {} @ {} bps, hint {:?}",
            profile.video_size, profile.bitrate, profile.orientation_hint
        );

        let target = OutputTarget::new(TargetKind::Encoder, encoder.surface());
        let mut state = self.state.lock().ok()?;
        if let Some(mut old) = state.encoder.replace(encoder) {
            if state.started_at.take().is_some() {
                let _ = old.stop();
            }
        }
        Some(target)
    }

    pub fn is_prepared(&self) -> bool {
        self.state.lock().map(|s| s.encoder.is_some()).unwrap_or(false)
    }

    /// Start the prepared encoder and remember when
    pub fn start(&self) -> Result<Instant, EncoderError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| EncoderError::Failed("encoder slot poisoned".to_string()))?;
        let encoder = state.encoder.as_mut().ok_or(EncoderError::NotPrepared)?;
        encoder.start()?;
        let now = Instant::now();
        state.started_at = Some(now);
        info!("Encoder started");
        Ok(now)
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.state.lock().ok().and_then(|s| s.started_at)
    }

    /// Stop the encoder if it was started
    pub fn stop(&self) -> Result<(), EncoderError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| EncoderError::Failed("encoder slot poisoned".to_string()))?;
        if state.started_at.take().is_none() {
            return Ok(());
        }
        match state.encoder.as_mut() {
            Some(encoder) => {
                encoder.stop()?;
                info!("Encoder stopped");
                Ok(())
            }
            None => Err(EncoderError::NotPrepared),
        }
    }

    /// Drop the encoder, stopping it first if it is running
    pub fn release(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Some(mut encoder) = state.encoder.take() {
            if state.started_at.take().is_some() {
                if let Err(e) = encoder.stop() {
                    warn!("Encoder stop on release failed: {}", e);
                }
            }
            debug!("Encoder released");
        }
    }

    /// Peak amplitude, or `None` when nothing is prepared
    pub fn max_amplitude(&self) -> Option<u32> {
        let state = self.state.lock().ok()?;
        state.encoder.as_ref().map(|e| e.max_amplitude())
    }

    pub fn set_listener(&self, listener: Arc<dyn RecordingListener>) {
        if let Ok(mut state) = self.state.lock() {
            state.listener = Some(listener);
        }
    }

    pub fn take_listener(&self) -> Option<Arc<dyn RecordingListener>> {
        self.state.lock().ok().and_then(|mut s| s.listener.take())
    }

    pub fn set_failure_hook(&self, hook: FailureHook) {
        if let Ok(mut state) = self.state.lock() {
            state.on_failure = Some(hook);
        }
    }

    /// Stop the failed encoder and hand the error to the listener once.
    /// The encoder stays prepared so a new recording can start on it.
    fn report(&self, err: EncoderError) {
        error!("Encoder reported an error: {}", err);
        let (listener, on_failure) = match self.state.lock() {
            Ok(mut state) => {
                if state.started_at.take().is_some() {
                    if let Some(encoder) = state.encoder.as_mut() {
                        if let Err(e) = encoder.stop() {
                            debug!("Stopping failed encoder: {}", e);
                        }
                    }
                }
                (state.listener.take(), state.on_failure.clone())
            }
            Err(_) => (None, None),
        };
        // Hooks run outside the slot lock
        if let Some(on_failure) = on_failure {
            on_failure();
        }
        if let Some(listener) = listener {
            listener.on_error(RecordingError::from(err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::mock::MockEncoderFactory;

    fn session_config() -> SessionConfig {
        SessionConfig {
            preview_size: Size::new(640, 480),
            video_size: Size::new(480, 480),
            fps_range: None,
            orientation_hint: Some(270),
        }
    }

    #[test]
    fn test_orientation_tables() {
        assert_eq!(default_orientation(Rotation::Deg0), 90);
        assert_eq!(default_orientation(Rotation::Deg90), 0);
        assert_eq!(default_orientation(Rotation::Deg180), 270);
        assert_eq!(default_orientation(Rotation::Deg270), 180);
        assert_eq!(inverse_orientation(Rotation::Deg0), 270);
        assert_eq!(inverse_orientation(Rotation::Deg90), 180);
        assert_eq!(inverse_orientation(Rotation::Deg180), 90);
        assert_eq!(inverse_orientation(Rotation::Deg270), 0);
    }

    #[test]
    fn test_hint_only_for_sideways_sensors() {
        assert_eq!(orientation_hint(90, Rotation::Deg0), Some(90));
        assert_eq!(orientation_hint(270, Rotation::Deg0), Some(270));
        assert_eq!(orientation_hint(0, Rotation::Deg0), None);
        assert_eq!(orientation_hint(180, Rotation::Deg90), None);
    }

    #[test]
    fn test_profile() {
        let mut settings = RecorderSettings::default();
        settings.temp_file = PathBuf::from("/tmp/out.mp4");
        let profile = EncoderProfile::new(&session_config(), &settings);
        assert_eq!(profile.bitrate, 480 * 480 * 2 / 3);
        assert_eq!(profile.frame_rate, 16);
        assert_eq!(profile.container, ContainerFormat::Mpeg4);
        assert_eq!(profile.video_codec, VideoCodec::H264);
        assert_eq!(profile.audio_codec, AudioCodec::Aac);
        assert_eq!(profile.orientation_hint, Some(270));
        assert_eq!(profile.output, PathBuf::from("/tmp/out.mp4"));
    }

    #[test]
    fn test_prepare_deletes_stale_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = RecorderSettings::default();
        settings.temp_file = dir.path().join("temp.mp4");
        std::fs::write(&settings.temp_file, b"stale").unwrap();

        let factory = MockEncoderFactory::new();
        let slot = EncoderSlot::new(Some(Arc::new(factory.clone())), settings.clone());
        let target = slot.prepare(&session_config()).unwrap();

        assert_eq!(target.kind(), TargetKind::Encoder);
        assert!(!settings.temp_file.exists());
        assert_eq!(factory.stats().prepares(), 1);
    }

    #[test]
    fn test_start_stop_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = RecorderSettings::default();
        settings.temp_file = dir.path().join("temp.mp4");
        let factory = MockEncoderFactory::new();
        let slot = EncoderSlot::new(Some(Arc::new(factory.clone())), settings);

        assert_eq!(slot.start(), Err(EncoderError::NotPrepared));
        assert_eq!(slot.max_amplitude(), None);

        slot.prepare(&session_config()).unwrap();
        slot.start().unwrap();
        assert!(slot.started_at().is_some());
        slot.stop().unwrap();
        assert!(slot.started_at().is_none());
        // A second stop is a no-op
        slot.stop().unwrap();

        slot.release();
        assert!(!slot.is_prepared());
        assert_eq!(factory.stats().starts(), 1);
        assert_eq!(factory.stats().stops(), 1);
    }

    #[test]
    fn test_async_failure_stops_encoder_and_notifies_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Count(AtomicUsize);
        impl RecordingListener for Count {
            fn on_saved(&self, _: &std::path::Path) {}
            fn on_error(&self, _: RecordingError) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let mut settings = RecorderSettings::default();
        settings.temp_file = dir.path().join("temp.mp4");
        let factory = MockEncoderFactory::new();
        let slot = EncoderSlot::new(Some(Arc::new(factory.clone())), settings);
        let failures = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&failures);
        slot.set_failure_hook(Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        let listener = Arc::new(Count(AtomicUsize::new(0)));
        slot.set_listener(listener.clone());

        slot.prepare(&session_config()).unwrap();
        slot.start().unwrap();
        assert!(factory.fail_active("disk full"));
        assert!(factory.fail_active("disk full"));

        assert!(slot.started_at().is_none());
        assert!(slot.is_prepared());
        assert_eq!(factory.stats().stops(), 1);
        assert_eq!(failures.load(Ordering::SeqCst), 2);
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);

        // Still usable for the next recording
        slot.start().unwrap();
        assert_eq!(factory.stats().starts(), 2);
    }

    #[test]
    fn test_disabled_slot_prepares_nothing() {
        let slot = EncoderSlot::disabled();
        assert!(slot.prepare(&session_config()).is_none());
        assert!(!slot.is_prepared());
    }
}
