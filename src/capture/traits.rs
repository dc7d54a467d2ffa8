//! Capture trait definitions
//!
//! Platform-agnostic traits for capture sources: device enumeration,
//! user/display media acquisition, live tracks, the media encoder and the
//! preview surface the session writes to.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by the capture platform
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Requested device not found: {0}")]
    NotFound(String),

    #[error("Capture aborted by user")]
    Aborted,

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Platform error: {0}")]
    Platform(String),
}

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Kind of an enumerated media device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
    VideoInput,
}

/// Information about a media device, as reported by enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDeviceInfo {
    /// Opaque device ID
    pub device_id: String,

    /// Human-readable label (may be empty before permission is granted)
    pub label: String,

    /// Device kind
    pub kind: DeviceKind,
}

/// A live media track handed out by the platform.
///
/// Tracks are shared between the stream that acquired them and the
/// composed stream fed to the encoder, so they are held behind `Arc`.
pub trait MediaTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn kind(&self) -> TrackKind;

    fn label(&self) -> &str;

    /// Stop the track and release the underlying device. Must be idempotent.
    fn stop(&self);

    fn is_live(&self) -> bool;
}

/// An ordered set of tracks treated as one logical stream
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl MediaStream {
    /// Compose a stream from existing tracks, preserving their order
    pub fn new(tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks_of(TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks_of(TrackKind::Video)
    }

    fn tracks_of(&self, kind: TrackKind) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn has_audio(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == TrackKind::Audio)
    }

    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == TrackKind::Video)
    }

    /// Stop every track in this stream
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Audio constraints for a user-media request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConstraints {
    /// Exact device to capture from; `None` lets the platform choose
    pub device_id: Option<String>,
    pub noise_suppression: Option<bool>,
    pub echo_cancellation: Option<bool>,
    pub auto_gain_control: Option<bool>,
}

/// Constraints for a user-media (microphone/camera) request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMediaConstraints {
    pub audio: Option<AudioConstraints>,
    pub video: bool,
}

impl UserMediaConstraints {
    /// Audio-only request
    pub fn audio_only(audio: AudioConstraints) -> Self {
        Self {
            audio: Some(audio),
            video: false,
        }
    }
}

/// Constraints for a display-capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMediaConstraints {
    pub video: bool,
    /// Best-effort system audio
    pub audio: bool,
}

/// Encoder settings chosen for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingProfile {
    /// Container MIME type without codec parameters (e.g. `video/webm`)
    pub container: String,

    pub video_codec: String,

    /// Present only when the composed stream carries audio
    pub audio_codec: Option<String>,
}

impl EncodingProfile {
    /// Full encoder MIME type, e.g. `video/webm; codecs=vp8,opus`
    pub fn mime_type(&self) -> String {
        match &self.audio_codec {
            Some(audio) => format!("{}; codecs={},{}", self.container, self.video_codec, audio),
            None => format!("{}; codecs={}", self.container, self.video_codec),
        }
    }
}

/// Destination for encoder output
pub trait ChunkSink: Send + Sync {
    /// Append a chunk. Returns `false` if the chunk was not accepted.
    fn deliver(&self, chunk: Bytes) -> bool;
}

/// Platform media capabilities
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Enumerate every media device visible to the application
    async fn enumerate_devices(&self) -> CaptureResult<Vec<MediaDeviceInfo>>;

    /// Acquire a microphone/camera stream. May prompt for permission.
    async fn get_user_media(&self, constraints: &UserMediaConstraints) -> CaptureResult<MediaStream>;

    /// Acquire a display-capture stream. Shows the platform's source picker.
    async fn get_display_media(
        &self,
        constraints: &DisplayMediaConstraints,
    ) -> CaptureResult<MediaStream>;

    /// Create an encoder bound to `stream`
    fn create_encoder(
        &self,
        stream: &MediaStream,
        profile: &EncodingProfile,
    ) -> CaptureResult<Box<dyn MediaEncoder>>;
}

/// A media encoder consuming a live stream and emitting container chunks
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    /// Start encoding. Chunks go to `sink` in production order; with a
    /// timeslice they are emitted roughly every `timeslice`, otherwise only
    /// when the encoder stops.
    async fn start(
        &mut self,
        sink: Arc<dyn ChunkSink>,
        timeslice: Option<Duration>,
    ) -> CaptureResult<()>;

    /// Flush the final chunk into the sink and halt. No chunk may be
    /// delivered once this resolves.
    async fn stop(&mut self) -> CaptureResult<()>;
}

/// A borrowed preview target (e.g. a video element) the session binds a
/// stream to while recording
pub trait PreviewSurface: Send + Sync {
    fn attach(&self, stream: &MediaStream);

    fn detach(&self);
}
