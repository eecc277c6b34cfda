//! Camera Capture Library
//!
//! Hardware-facing half of the camera stack:
//! - Backend traits for devices, capture sessions and output targets
//! - Device enumeration and facing-based selection
//! - Output size and frame-rate selection policy
//! - Raw frames, the bounded frame reader and the frame transform
//! - A mock backend for running without a sensor

pub mod device;
pub mod enumerator;
pub mod frame;
pub mod mock;
pub mod reader;
pub mod selector;
pub mod types;

pub use device::{
    CameraBackend, CameraDevice, CaptureRequest, CaptureSession, DeviceStateCallback, FrameSink,
    OutputTarget, SessionStateCallback, TargetKind,
};
pub use enumerator::DeviceEnumerator;
pub use frame::{FrameTransform, PixelFormat, RawFrame, RotatingTransform, VideoFrame};
pub use reader::{FrameLease, FrameReader};
pub use selector::{choose_fps_range, choose_video_size, SelectionPolicy};
pub use types::{CameraIdentity, Capabilities, Facing, FpsRange, Rotation, Size};

use thiserror::Error;

/// Camera error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera permission not granted")]
    PermissionDenied,

    #[error("No camera device available")]
    Unavailable,

    #[error("Cannot access camera: {0}")]
    Access(String),

    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Camera disconnected")]
    Disconnected,

    #[error("Camera device error {0}")]
    Device(i32),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),
}
