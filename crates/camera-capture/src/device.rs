//! Backend traits for camera hardware
//!
//! Opening a device and configuring a session are asynchronous: the backend
//! reports completion through the callback traits below, on whatever thread
//! it likes. Callers are expected to turn each callback into a message for
//! their own event loop rather than doing work inside it.

use std::fmt;
use std::sync::Arc;

use crate::frame::RawFrame;
use crate::types::{Capabilities, FpsRange, Rotation};
use crate::CameraError;

/// Consumer of frames produced by a repeating request
pub trait FrameSink: Send + Sync {
    /// Offer a frame to the sink. Returns false when the frame was dropped.
    fn push(&self, frame: &RawFrame) -> bool;
}

/// Which consumer an output target feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// On-screen preview surface
    Screen,
    /// Hardware encoder input surface
    Encoder,
    /// Frame-analysis reader
    Reader,
}

/// One output of a capture session
#[derive(Clone)]
pub struct OutputTarget {
    kind: TargetKind,
    sink: Arc<dyn FrameSink>,
}

impl OutputTarget {
    pub fn new(kind: TargetKind, sink: Arc<dyn FrameSink>) -> Self {
        Self { kind, sink }
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Hand a frame to the underlying sink
    pub fn deliver(&self, frame: &RawFrame) -> bool {
        self.sink.push(frame)
    }
}

impl fmt::Debug for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputTarget").field("kind", &self.kind).finish()
    }
}

/// Request template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTemplate {
    Preview,
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureIntent {
    Preview,
    VideoRecord,
    VideoSnapshot,
}

/// 3A master switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Off,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfMode {
    Off,
    Auto,
    ContinuousVideo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfTrigger {
    Idle,
    Start,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeMode {
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwbMode {
    Off,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMode {
    Off,
    Fast,
    HighQuality,
}

/// Capture settings plus the targets each captured frame is written to
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub intent: CaptureIntent,
    pub control_mode: ControlMode,
    pub af_mode: AfMode,
    pub af_trigger: AfTrigger,
    pub ae_mode: AeMode,
    pub awb_mode: AwbMode,
    pub edge_mode: EdgeMode,
    /// Auto-exposure fps range; the driver picks one when absent
    pub fps_range: Option<FpsRange>,
    targets: Vec<OutputTarget>,
}

impl CaptureRequest {
    /// Record-template request with full 3A and high quality edges
    pub fn record() -> Self {
        Self {
            template: RequestTemplate::Record,
            intent: CaptureIntent::VideoSnapshot,
            control_mode: ControlMode::Auto,
            af_mode: AfMode::Auto,
            af_trigger: AfTrigger::Idle,
            ae_mode: AeMode::On,
            awb_mode: AwbMode::Auto,
            edge_mode: EdgeMode::HighQuality,
            fps_range: None,
            targets: Vec::new(),
        }
    }

    pub fn with_fps_range(mut self, fps_range: Option<FpsRange>) -> Self {
        self.fps_range = fps_range;
        self
    }

    pub fn add_target(&mut self, target: OutputTarget) {
        self.targets.push(target);
    }

    pub fn targets(&self) -> &[OutputTarget] {
        &self.targets
    }

    /// Whether a target of the given kind is attached
    pub fn has_target(&self, kind: TargetKind) -> bool {
        self.targets.iter().any(|t| t.kind() == kind)
    }
}

/// Device open/close notifications
pub trait DeviceStateCallback: Send + Sync {
    fn on_opened(&self, device: Box<dyn CameraDevice>);

    /// The device went away. Ownership is handed back so it can be closed.
    fn on_disconnected(&self, device: Box<dyn CameraDevice>);

    fn on_error(&self, device: Box<dyn CameraDevice>, code: i32);
}

/// Session configuration notifications
pub trait SessionStateCallback: Send + Sync {
    fn on_configured(&self, session: Box<dyn CaptureSession>);

    fn on_configure_failed(&self);
}

/// An opened camera
pub trait CameraDevice: Send {
    fn id(&self) -> &str;

    /// Start building a session over the given targets.
    /// The outcome arrives through `callback`.
    fn create_capture_session(
        &mut self,
        targets: Vec<OutputTarget>,
        callback: Arc<dyn SessionStateCallback>,
    ) -> Result<(), CameraError>;

    fn close(self: Box<Self>);
}

/// A configured capture pipeline
pub trait CaptureSession: Send {
    /// Submit a request the driver repeats until the session closes
    fn set_repeating_request(&mut self, request: CaptureRequest) -> Result<(), CameraError>;

    fn close(self: Box<Self>);
}

/// Entry point to a camera subsystem
pub trait CameraBackend: Send + Sync {
    /// Whether camera, microphone and storage access are granted
    fn has_permission(&self) -> bool;

    fn camera_ids(&self) -> Result<Vec<String>, CameraError>;

    fn characteristics(&self, id: &str) -> Result<Capabilities, CameraError>;

    /// Begin opening a device. The outcome arrives through `callback`.
    fn open_camera(
        &self,
        id: &str,
        callback: Arc<dyn DeviceStateCallback>,
    ) -> Result<(), CameraError>;

    /// Current display rotation
    fn display_rotation(&self) -> Rotation;
}
