//! Recording commands
//!
//! Request handlers a UI shell calls into. Errors come back as
//! [`ErrorResponse`] so the shell only has to render `code`/`message`.

use crate::recorder::session::{RecordingEvent, RecordingSession};
use crate::recorder::state::{DeviceDescriptor, RecordingArtifact, SessionState, StateHandle};
use crate::utils::error::ErrorResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

/// Application state for recording
pub struct RecorderState {
    pub session: Arc<Mutex<RecordingSession>>,
    state: StateHandle,
}

impl RecorderState {
    pub fn new(session: RecordingSession) -> Self {
        let state = session.state_handle();
        Self {
            session: Arc::new(Mutex::new(session)),
            state,
        }
    }

    /// Subscribe to recording events
    pub async fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.session.lock().await.subscribe()
    }
}

/// Serializable description of a finished recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub id: Uuid,
    pub mime_type: String,
    pub size: usize,
    pub chunk_count: usize,
    pub has_video: bool,
    pub has_audio: bool,
    pub created_at: DateTime<Utc>,
    pub duration_ms: f64,
}

impl From<&RecordingArtifact> for RecordingSummary {
    fn from(artifact: &RecordingArtifact) -> Self {
        Self {
            id: artifact.id,
            mime_type: artifact.mime_type.clone(),
            size: artifact.size(),
            chunk_count: artifact.chunk_count,
            has_video: artifact.has_video,
            has_audio: artifact.has_audio,
            created_at: artifact.created_at,
            duration_ms: artifact.duration_ms,
        }
    }
}

/// Get list of available microphones
pub async fn get_microphones(state: &RecorderState) -> Result<Vec<DeviceDescriptor>, ErrorResponse> {
    let mut session = state.session.lock().await;
    Ok(session.list_microphones().await?)
}

/// Select a microphone, or `None` to record video only
pub async fn select_microphone(
    state: &RecorderState,
    device_id: Option<String>,
) -> Result<(), ErrorResponse> {
    let mut session = state.session.lock().await;
    Ok(session.select_microphone(device_id.as_deref())?)
}

/// Start recording
pub async fn start_recording(state: &RecorderState) -> Result<(), ErrorResponse> {
    let mut session = state.session.lock().await;
    Ok(session.start().await?)
}

/// Stop recording
pub async fn stop_recording(state: &RecorderState) -> Result<RecordingArtifact, ErrorResponse> {
    let mut session = state.session.lock().await;
    Ok(session.stop().await?)
}

/// Get current recording state without waiting on an in-flight request
pub fn get_recording_state(state: &RecorderState) -> SessionState {
    state.state.get()
}
