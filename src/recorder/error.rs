//! Recording session errors

use super::state::SessionState;
use crate::capture::traits::CaptureError;
use thiserror::Error;

/// Errors surfaced by a recording session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    #[error("Recording is currently in progress")]
    AlreadyRecording,

    #[error("A recording has not been started yet")]
    NotRecording,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No microphone with ID {0} found")]
    DeviceNotFound(String),

    #[error("Capture source selection was cancelled")]
    AcquisitionAborted,

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

impl RecordingError {
    /// Stable code for the frontend
    pub fn code(&self) -> &'static str {
        match self {
            RecordingError::AlreadyRecording => "ALREADY_RECORDING",
            RecordingError::NotRecording => "NOT_RECORDING",
            RecordingError::PermissionDenied(_) => "PERMISSION_DENIED",
            RecordingError::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            RecordingError::AcquisitionAborted => "ACQUISITION_ABORTED",
            RecordingError::Capture(_) => "CAPTURE_ERROR",
            RecordingError::InvalidTransition { .. } => "INVALID_STATE",
        }
    }
}

impl From<CaptureError> for RecordingError {
    fn from(error: CaptureError) -> Self {
        match error {
            CaptureError::PermissionDenied(msg) => RecordingError::PermissionDenied(msg),
            CaptureError::NotFound(id) => RecordingError::DeviceNotFound(id),
            CaptureError::Aborted => RecordingError::AcquisitionAborted,
            other => RecordingError::Capture(other.to_string()),
        }
    }
}

/// Result type alias using RecordingError
pub type RecordingResult<T> = Result<T, RecordingError>;
