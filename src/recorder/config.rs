//! Recorder configuration

use crate::capture::traits::{
    AudioConstraints, DisplayMediaConstraints, EncodingProfile, UserMediaConstraints,
};
use crate::utils::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for recording sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Container MIME type of the finished artifact
    pub container: String,

    pub video_codec: String,

    /// Used only when a microphone track is recorded
    pub audio_codec: String,

    /// Encoder timeslice in milliseconds. `None` yields a single chunk at stop.
    pub timeslice_ms: Option<u64>,

    pub noise_suppression: bool,

    pub echo_cancellation: bool,

    pub auto_gain_control: bool,

    /// Ask the display picker for system audio
    pub request_system_audio: bool,

    /// Compose the display stream's audio track when no microphone is
    /// selected. A selected microphone always wins.
    pub include_system_audio: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            container: "video/webm".to_string(),
            video_codec: "vp8".to_string(),
            audio_codec: "opus".to_string(),
            timeslice_ms: None,
            noise_suppression: false,
            echo_cancellation: false,
            auto_gain_control: false,
            request_system_audio: true,
            include_system_audio: false,
        }
    }
}

impl RecorderConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> AppResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;
        tracing::debug!("Loaded recorder config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if !self.container.contains('/') {
            return Err(AppError::Config(format!(
                "container must be a MIME type, got {:?}",
                self.container
            )));
        }
        if self.video_codec.trim().is_empty() || self.audio_codec.trim().is_empty() {
            return Err(AppError::Config("codec names must not be empty".to_string()));
        }
        if self.timeslice_ms == Some(0) {
            return Err(AppError::Config("timesliceMs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn timeslice(&self) -> Option<Duration> {
        self.timeslice_ms.map(Duration::from_millis)
    }

    /// Audio-only request scoped to one microphone
    pub fn microphone_constraints(&self, device_id: &str) -> UserMediaConstraints {
        UserMediaConstraints::audio_only(AudioConstraints {
            device_id: Some(device_id.to_string()),
            noise_suppression: Some(self.noise_suppression),
            echo_cancellation: Some(self.echo_cancellation),
            auto_gain_control: Some(self.auto_gain_control),
        })
    }

    pub fn display_constraints(&self) -> DisplayMediaConstraints {
        DisplayMediaConstraints {
            video: true,
            audio: self.request_system_audio,
        }
    }

    /// Encoder profile for a composed stream; the audio codec is only
    /// named when the stream carries audio
    pub fn encoding_profile(&self, has_audio: bool) -> EncodingProfile {
        EncodingProfile {
            container: self.container.clone(),
            video_codec: self.video_codec.clone(),
            audio_codec: has_audio.then(|| self.audio_codec.clone()),
        }
    }
}
