//! Camera Session Library
//!
//! Preview, recording and lifecycle on top of `camera-capture`:
//! - Capture session manager and its state machine
//! - Worker thread the hardware callbacks are funnelled into
//! - Recorder with deferred encoder start and temp-file handoff
//! - Display transform for the preview surface
//! - Lifecycle adapter and settings

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod recorder;
pub mod state;
pub mod surface;
pub mod transform;
pub mod worker;

pub use config::{CameraSettings, RecorderSettings, SessionSettings, VIDEO_TEMP_FILE};
pub use error::{EncoderError, RecordingError, SessionError};
pub use lifecycle::{LifecycleAdapter, LifecycleEvent};
pub use manager::{CaptureSessionManager, CaptureSessionManagerBuilder, SessionConfig};
pub use recorder::encoder::{Encoder, EncoderFactory, EncoderProfile, EncoderSlot};
pub use recorder::mock::MockEncoderFactory;
pub use recorder::{RecorderController, RecordingListener};
pub use state::SessionState;
pub use surface::{HeadlessScreen, PreviewObserver, ScreenSurface};
pub use transform::DisplayTransform;
