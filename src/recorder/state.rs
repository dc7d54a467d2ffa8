//! Recording state management
//!
//! Defines the session state machine and the values that flow through it.

pub use crate::capture::traits::EncodingProfile;

use crate::capture::traits::{DeviceKind, MediaDeviceInfo};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Current state of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No recording in progress
    Idle,
    /// Acquiring devices and starting the encoder
    Acquiring,
    /// Currently recording
    Recording,
    /// Waiting for the encoder's final chunk
    Stopping,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl SessionState {
    /// Whether `next` is a legal successor of this state.
    ///
    /// The only cycle is Idle -> Acquiring -> Recording -> Stopping -> Idle,
    /// plus Acquiring -> Idle when acquisition fails.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Acquiring)
                | (Acquiring, Recording)
                | (Acquiring, Idle)
                | (Recording, Stopping)
                | (Stopping, Idle)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Acquiring => "acquiring",
            SessionState::Recording => "recording",
            SessionState::Stopping => "stopping",
        }
    }
}

/// Shared, read-mostly view of a session's state.
///
/// Cloned out of the session so the state can be observed while an async
/// operation holds the session mutably.
#[derive(Debug, Clone, Default)]
pub struct StateHandle(Arc<RwLock<SessionState>>);

impl StateHandle {
    pub fn get(&self) -> SessionState {
        *self.0.read()
    }

    pub(crate) fn set(&self, next: SessionState) -> SessionState {
        std::mem::replace(&mut *self.0.write(), next)
    }
}

/// An audio-input device the user can pick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// Opaque platform device ID
    pub id: String,

    /// Human-readable label
    pub label: String,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    /// Convert an enumerated device, keeping only audio inputs
    pub fn from_audio_input(info: &MediaDeviceInfo) -> Option<Self> {
        (info.kind == DeviceKind::AudioInput)
            .then(|| Self::new(info.device_id.clone(), info.label.clone()))
    }
}

/// A finished recording.
///
/// `data` is the exact concatenation of every chunk the encoder delivered
/// during the session, in delivery order.
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    pub id: Uuid,

    /// Container MIME type of `data`
    pub mime_type: String,

    pub data: Bytes,

    /// Number of chunks that were concatenated
    pub chunk_count: usize,

    pub has_video: bool,

    pub has_audio: bool,

    pub created_at: DateTime<Utc>,

    /// Wall-clock time between recording start and stop
    pub duration_ms: f64,
}

impl RecordingArtifact {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// File extension derived from the MIME subtype (`video/webm` -> `webm`)
    pub fn file_extension(&self) -> &str {
        self.mime_type
            .split(';')
            .next()
            .and_then(|essence| essence.split('/').nth(1))
            .map(str::trim)
            .filter(|ext| !ext.is_empty())
            .unwrap_or("bin")
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}
