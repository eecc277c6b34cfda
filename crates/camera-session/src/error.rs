//! Session and recording error types

use std::io;
use std::path::PathBuf;

use camera_capture::CameraError;
use thiserror::Error;

/// Errors raised by the capture session manager
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Camera/microphone/storage access not granted; the host has to ask again
    #[error("Camera permission denied")]
    PermissionDenied,

    /// Enumeration found no usable device
    #[error("No camera device available")]
    DeviceUnavailable,

    /// Transient open or characteristics failure
    #[error("Camera access failed: {0}")]
    DeviceAccess(String),

    /// The opened device reported an error or disconnected
    #[error("Camera device error: {0}")]
    Device(String),

    #[error("Capture session could not be configured")]
    SessionConfigureFailed,

    /// Exclusive device permit not acquired in time
    #[error("Timed out after {0}ms waiting for the camera lock")]
    LockTimeout(u64),

    #[error("Interrupted while waiting for the camera lock")]
    LockInterrupted,
}

impl From<CameraError> for SessionError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::PermissionDenied => SessionError::PermissionDenied,
            CameraError::Unavailable => SessionError::DeviceUnavailable,
            CameraError::Disconnected => SessionError::Device("disconnected".to_string()),
            CameraError::Device(code) => SessionError::Device(format!("code {}", code)),
            other => SessionError::DeviceAccess(other.to_string()),
        }
    }
}

/// Errors reported to a recording listener
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No camera device available")]
    DeviceUnavailable,

    #[error("Capture session could not be configured")]
    SessionConfigureFailed,

    /// The hardware encoder failed; recording is not restarted automatically
    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Recording produced no file at {0}")]
    MissingTempFile(PathBuf),

    #[error("Recording produced an empty file at {0}")]
    EmptyTempFile(PathBuf),

    #[error("Destination {0} missing after copy")]
    DestinationMissing(PathBuf),

    #[error("Failed to copy recording: {0}")]
    Copy(#[from] io::Error),

    #[error("Camera session error: {0}")]
    Session(SessionError),
}

impl From<SessionError> for RecordingError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::PermissionDenied => RecordingError::PermissionDenied,
            SessionError::DeviceUnavailable => RecordingError::DeviceUnavailable,
            SessionError::SessionConfigureFailed => RecordingError::SessionConfigureFailed,
            other => RecordingError::Session(other),
        }
    }
}

/// Errors raised by an encoder implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncoderError {
    #[error("Encoder not prepared")]
    NotPrepared,

    #[error("Encoder configuration rejected: {0}")]
    Configure(String),

    #[error("Encoder failed: {0}")]
    Failed(String),
}

impl From<EncoderError> for RecordingError {
    fn from(err: EncoderError) -> Self {
        RecordingError::Encoder(err.to_string())
    }
}
