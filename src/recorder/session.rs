//! Recording session
//!
//! Owns microphone enumeration/selection, stream acquisition and
//! composition, the encoder lifecycle and artifact assembly for one
//! recording at a time.

use super::buffer::BufferedSink;
use super::config::RecorderConfig;
use super::error::{RecordingError, RecordingResult};
use super::state::{DeviceDescriptor, RecordingArtifact, SessionState, StateHandle};
use crate::capture::traits::{
    AudioConstraints, MediaDevices, MediaEncoder, MediaStream, PreviewSurface,
    UserMediaConstraints,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted during recording
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// Encoder is running; precedes every `DataAvailable` of the session
    Started,
    /// A chunk was appended to the buffer
    DataAvailable { sequence: usize, size: usize },
    /// Recording finished; carries the assembled artifact
    Stopped(RecordingArtifact),
}

/// Streams acquired for one session. Dropping releases every track.
#[derive(Default)]
struct AcquiredStreams {
    microphone: Option<MediaStream>,
    display: Option<MediaStream>,
}

impl AcquiredStreams {
    fn release(&mut self) {
        for stream in self.microphone.take().into_iter().chain(self.display.take()) {
            tracing::debug!("Releasing stream {} ({} tracks)", stream.id(), stream.tracks().len());
            stream.stop_all();
        }
    }
}

impl Drop for AcquiredStreams {
    fn drop(&mut self) {
        self.release();
    }
}

/// Resources owned by a running session, built once acquisition succeeds
/// and dropped as a unit at teardown
struct ActiveCapture {
    encoder: Box<dyn MediaEncoder>,
    sink: BufferedSink,
    composed: MediaStream,
    started_at: Instant,
    // Declared last so the encoder is discarded before its tracks stop.
    streams: AcquiredStreams,
}

/// Returns the session to IDLE if a `start` or `stop` future is dropped
/// while suspended in a transient state
struct ResetOnDrop {
    state: StateHandle,
    sink: Option<BufferedSink>,
    preview: Option<Arc<dyn PreviewSurface>>,
    armed: bool,
}

impl ResetOnDrop {
    fn new(state: &StateHandle) -> Self {
        Self {
            state: state.clone(),
            sink: None,
            preview: None,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ResetOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.seal();
        }
        if let Some(preview) = &self.preview {
            preview.detach();
        }
        let abandoned = self.state.set(SessionState::Idle);
        tracing::warn!("Session abandoned while {}; reset to idle", abandoned.as_str());
    }
}

/// A single-recording-at-a-time capture session
pub struct RecordingSession {
    devices: Arc<dyn MediaDevices>,

    config: RecorderConfig,

    state: StateHandle,

    /// Populated once by `list_microphones`, replaced only by `refresh_microphones`
    available_mics: Option<Vec<DeviceDescriptor>>,

    /// Persists across sessions
    microphone: Option<DeviceDescriptor>,

    preview: Option<Arc<dyn PreviewSurface>>,

    active: Option<ActiveCapture>,

    event_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingSession {
    /// Create a new idle session
    pub fn new(devices: Arc<dyn MediaDevices>, config: RecorderConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            devices,
            config,
            state: StateHandle::default(),
            available_mics: None,
            microphone: None,
            preview: None,
            active: None,
            event_tx,
        }
    }

    /// Bind a live preview surface; it shows the display stream while recording
    pub fn with_preview(mut self, preview: Arc<dyn PreviewSurface>) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Get the current session state
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    pub fn is_recording(&self) -> bool {
        self.state() == SessionState::Recording
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    pub fn selected_microphone(&self) -> Option<&DeviceDescriptor> {
        self.microphone.as_ref()
    }

    fn transition(&self, next: SessionState) -> RecordingResult<()> {
        let current = self.state.get();
        if !current.can_transition_to(next) {
            return Err(RecordingError::InvalidTransition { from: current, to: next });
        }
        self.state.set(next);
        tracing::debug!("Session state: {} -> {}", current.as_str(), next.as_str());
        Ok(())
    }

    fn ensure_idle(&self) -> RecordingResult<()> {
        match self.state() {
            SessionState::Idle => Ok(()),
            _ => Err(RecordingError::AlreadyRecording),
        }
    }

    /// List audio-input devices, enumerating once on first call
    pub async fn list_microphones(&mut self) -> RecordingResult<Vec<DeviceDescriptor>> {
        self.ensure_idle()?;

        if let Some(mics) = &self.available_mics {
            return Ok(mics.clone());
        }

        let mics = self.enumerate_microphones().await?;
        self.available_mics = Some(mics.clone());
        Ok(mics)
    }

    /// Drop the cached device list and enumerate again
    pub async fn refresh_microphones(&mut self) -> RecordingResult<Vec<DeviceDescriptor>> {
        self.ensure_idle()?;

        let mics = self.enumerate_microphones().await?;
        if let Some(selected) = &self.microphone {
            if !mics.iter().any(|m| m.id == selected.id) {
                tracing::warn!("Selected microphone {} disappeared; clearing selection", selected.id);
                self.microphone = None;
            }
        }
        self.available_mics = Some(mics.clone());
        Ok(mics)
    }

    async fn enumerate_microphones(&self) -> RecordingResult<Vec<DeviceDescriptor>> {
        // Labels are only exposed once audio-input permission is granted.
        let probe = self
            .devices
            .get_user_media(&UserMediaConstraints::audio_only(AudioConstraints::default()))
            .await?;
        probe.stop_all();

        let mics: Vec<_> = self
            .devices
            .enumerate_devices()
            .await?
            .iter()
            .filter_map(DeviceDescriptor::from_audio_input)
            .collect();

        tracing::debug!("Found {} microphones", mics.len());
        Ok(mics)
    }

    /// Select a microphone from the cached list, or `None` for video only
    pub fn select_microphone(&mut self, device_id: Option<&str>) -> RecordingResult<()> {
        self.ensure_idle()?;

        let Some(device_id) = device_id else {
            tracing::info!("Microphone cleared");
            self.microphone = None;
            return Ok(());
        };

        let mic = self
            .available_mics
            .as_ref()
            .and_then(|mics| mics.iter().find(|m| m.id == device_id))
            .cloned()
            .ok_or_else(|| RecordingError::DeviceNotFound(device_id.to_string()))?;

        tracing::info!("Microphone selected: {} ({})", mic.label, mic.id);
        self.microphone = Some(mic);
        Ok(())
    }

    /// Start recording. Resolves once the encoder is running.
    pub async fn start(&mut self) -> RecordingResult<()> {
        self.ensure_idle()?;
        self.transition(SessionState::Acquiring)?;
        let reset = ResetOnDrop::new(&self.state);

        tracing::info!(
            "Starting recording (microphone: {})",
            self.microphone.as_ref().map(|m| m.label.as_str()).unwrap_or("none")
        );

        let acquired = self.acquire().await;
        reset.disarm();

        let active = match acquired {
            Ok(active) => active,
            Err(e) => {
                tracing::warn!("Acquisition failed: {}", e);
                self.transition(SessionState::Idle)?;
                return Err(e);
            }
        };

        self.transition(SessionState::Recording)?;
        if let (Some(preview), Some(display)) = (&self.preview, &active.streams.display) {
            preview.attach(display);
        }
        active.sink.announce_started();
        self.active = Some(active);

        tracing::info!("Recording started");
        Ok(())
    }

    async fn acquire(&self) -> RecordingResult<ActiveCapture> {
        let mut streams = AcquiredStreams::default();

        if let Some(mic) = &self.microphone {
            let constraints = self.config.microphone_constraints(&mic.id);
            streams.microphone = Some(self.devices.get_user_media(&constraints).await?);
        }

        let display = self
            .devices
            .get_display_media(&self.config.display_constraints())
            .await?;

        // Microphone audio first; display audio is composed only when no
        // microphone is selected and the config opts in.
        let mut tracks = Vec::new();
        if let Some(mic_stream) = &streams.microphone {
            tracks.extend(mic_stream.audio_tracks());
        }
        tracks.extend(display.video_tracks());
        if streams.microphone.is_none() && self.config.include_system_audio {
            tracks.extend(display.audio_tracks());
        }
        streams.display = Some(display);

        let composed = MediaStream::new(tracks);
        if !composed.has_video() {
            return Err(RecordingError::Capture(
                "display capture produced no video track".to_string(),
            ));
        }

        let profile = self.config.encoding_profile(composed.has_audio());
        tracing::debug!("Encoding profile: {}", profile.mime_type());

        let mut encoder = self.devices.create_encoder(&composed, &profile)?;
        let sink = BufferedSink::new(self.event_tx.clone());
        encoder
            .start(Arc::new(sink.clone()), self.config.timeslice())
            .await?;

        Ok(ActiveCapture {
            encoder,
            sink,
            composed,
            started_at: Instant::now(),
            streams,
        })
    }

    /// Stop recording. Resolves with the artifact once teardown completes.
    pub async fn stop(&mut self) -> RecordingResult<RecordingArtifact> {
        if self.state() != SessionState::Recording {
            return Err(RecordingError::NotRecording);
        }
        let Some(mut active) = self.active.take() else {
            return Err(RecordingError::NotRecording);
        };
        self.transition(SessionState::Stopping)?;
        let mut reset = ResetOnDrop::new(&self.state);
        reset.sink = Some(active.sink.clone());
        reset.preview = self.preview.clone();

        tracing::info!("Stopping recording");

        let stopped = active.encoder.stop().await;
        reset.disarm();
        let buffer = active.sink.seal();
        if let Some(preview) = &self.preview {
            preview.detach();
        }

        if let Err(e) = stopped {
            tracing::error!("Encoder failed to stop cleanly: {}", e);
            drop(active);
            self.transition(SessionState::Idle)?;
            return Err(e.into());
        }

        let chunk_count = buffer.len();
        let artifact = RecordingArtifact {
            id: Uuid::new_v4(),
            mime_type: self.config.container.clone(),
            data: buffer.assemble(),
            chunk_count,
            has_video: active.composed.has_video(),
            has_audio: active.composed.has_audio(),
            created_at: Utc::now(),
            duration_ms: active.started_at.elapsed().as_secs_f64() * 1000.0,
        };

        let _ = self.event_tx.send(RecordingEvent::Stopped(artifact.clone()));

        drop(active);
        self.transition(SessionState::Idle)?;

        tracing::info!(
            "Recording stopped. {} bytes in {} chunks, duration: {:.0}ms",
            artifact.size(),
            chunk_count,
            artifact.duration_ms
        );
        Ok(artifact)
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.active.is_some() {
            tracing::warn!("Recording session dropped while recording; releasing tracks");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::simulated::{
        DisplayOutcome, EncoderStop, SimulatedPlatform, SimulatedPreview,
    };
    use crate::capture::traits::{MediaTrack, TrackKind};
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn platform() -> SimulatedPlatform {
        SimulatedPlatform::new().with_microphone("m1", "Built-in Mic")
    }

    fn session(platform: &SimulatedPlatform) -> RecordingSession {
        RecordingSession::new(Arc::new(platform.clone()), RecorderConfig::default())
    }

    fn drain(rx: &mut broadcast::Receiver<RecordingEvent>) -> Vec<RecordingEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_microphone_recording_scenario() {
        let platform = platform();
        let mut session = session(&platform);
        let mut rx = session.subscribe();

        let mics = session.list_microphones().await.unwrap();
        assert_eq!(mics, vec![DeviceDescriptor::new("m1", "Built-in Mic")]);
        session.select_microphone(Some("m1")).unwrap();

        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Recording);

        let encoder = platform.last_encoder().unwrap();
        assert_eq!(encoder.mime_type(), "video/webm; codecs=vp8,opus");
        assert!(encoder.push(vec![1u8; 10]));
        assert!(encoder.push(vec![2u8; 20]));
        assert!(encoder.push(vec![3u8; 30]));

        let artifact = session.stop().await.unwrap();
        assert_eq!(artifact.size(), 60);
        assert_eq!(artifact.chunk_count, 3);
        assert!(artifact.has_audio);
        assert!(artifact.has_video);
        assert_eq!(artifact.mime_type, "video/webm");
        assert_eq!(session.state(), SessionState::Idle);

        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(RecordingEvent::Started)));
        match events.last() {
            Some(RecordingEvent::Stopped(stopped)) => assert_eq!(stopped.data, artifact.data),
            other => panic!("expected Stopped, got {:?}", other),
        }
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn test_artifact_is_ordered_concatenation() {
        let platform = platform();
        let mut session = session(&platform);
        session.start().await.unwrap();

        let encoder = platform.last_encoder().unwrap();
        encoder.set_final_chunk(Bytes::from_static(b"-end"));
        for chunk in ["alpha", "beta", "gamma"] {
            encoder.push(Bytes::from(chunk));
        }

        let artifact = session.stop().await.unwrap();
        assert_eq!(&artifact.data[..], b"alphabetagamma-end");
        assert_eq!(artifact.chunk_count, 4);
    }

    #[tokio::test]
    async fn test_video_only_recording_has_no_audio() {
        let platform = platform();
        let mut session = session(&platform);
        session.list_microphones().await.unwrap();
        session.select_microphone(None).unwrap();

        session.start().await.unwrap();
        let encoder = platform.last_encoder().unwrap();
        assert_eq!(encoder.mime_type(), "video/webm; codecs=vp8");
        assert_eq!(encoder.track_kinds(), vec![TrackKind::Video]);

        let artifact = session.stop().await.unwrap();
        assert!(artifact.has_video);
        assert!(!artifact.has_audio);
        // No microphone request beyond the enumeration probe
        assert_eq!(platform.user_media_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_microphone_audio_supersedes_system_audio() {
        let platform = platform();
        let mut session = session(&platform);
        session.list_microphones().await.unwrap();
        session.select_microphone(Some("m1")).unwrap();
        session.start().await.unwrap();

        let encoder = platform.last_encoder().unwrap();
        assert_eq!(encoder.track_kinds(), vec![TrackKind::Audio, TrackKind::Video]);
        let audio_labels = encoder.track_labels();
        assert_eq!(audio_labels[0], "Built-in Mic");

        let requests = platform.user_media_requests();
        let audio = requests.last().unwrap().audio.clone().unwrap();
        assert_eq!(audio.device_id.as_deref(), Some("m1"));
        assert_eq!(audio.noise_suppression, Some(false));
        assert_eq!(audio.echo_cancellation, Some(false));
        assert!(platform.display_requests()[0].audio);

        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_system_audio_composed_when_opted_in() {
        let platform = platform();
        let config = RecorderConfig {
            include_system_audio: true,
            ..RecorderConfig::default()
        };
        let mut session = RecordingSession::new(Arc::new(platform.clone()), config);
        session.start().await.unwrap();

        let encoder = platform.last_encoder().unwrap();
        assert_eq!(encoder.track_kinds(), vec![TrackKind::Video, TrackKind::Audio]);
        assert!(session.stop().await.unwrap().has_audio);
    }

    #[tokio::test]
    async fn test_stop_twice_yields_not_recording() {
        let platform = platform();
        let mut session = session(&platform);
        session.start().await.unwrap();

        assert!(session.stop().await.is_ok());
        assert_eq!(session.stop().await.unwrap_err(), RecordingError::NotRecording);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_rejected() {
        let platform = platform();
        let mut session = session(&platform);
        assert_eq!(session.stop().await.unwrap_err(), RecordingError::NotRecording);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_start_while_recording_is_rejected_without_teardown() {
        let platform = platform();
        let mut session = session(&platform);
        session.start().await.unwrap();

        assert_eq!(session.start().await.unwrap_err(), RecordingError::AlreadyRecording);
        assert_eq!(session.state(), SessionState::Recording);
        assert!(platform.tracks().iter().all(|t| t.is_live()));
        assert_eq!(platform.display_requests().len(), 1);

        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_permission_denied_returns_to_idle() {
        let platform = platform().deny_microphone();
        let mut session = session(&platform);

        assert!(matches!(
            session.list_microphones().await,
            Err(RecordingError::PermissionDenied(_))
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_display_denial_releases_microphone_and_allows_retry() {
        let platform = platform();
        let mut session = session(&platform);
        let mut rx = session.subscribe();
        session.list_microphones().await.unwrap();
        session.select_microphone(Some("m1")).unwrap();

        platform.set_display_outcome(crate::capture::simulated::DisplayOutcome::Deny);
        assert!(matches!(
            session.start().await,
            Err(RecordingError::PermissionDenied(_))
        ));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(platform.live_track_count(), 0);
        assert!(drain(&mut rx).is_empty());

        platform.set_display_outcome(crate::capture::simulated::DisplayOutcome::Grant);
        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Recording);
        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_picker_is_acquisition_aborted() {
        let platform = platform().cancel_display();
        let mut session = session(&platform);

        assert_eq!(session.start().await.unwrap_err(), RecordingError::AcquisitionAborted);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_encoder_start_failure_releases_tracks() {
        let platform = platform().fail_encoder("vp8 unsupported");
        let mut session = session(&platform);

        assert!(matches!(session.start().await, Err(RecordingError::Capture(_))));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!platform.tracks().is_empty());
        assert_eq!(platform.live_track_count(), 0);
    }

    #[tokio::test]
    async fn test_encoder_stop_failure_tears_down_without_artifact() {
        let platform = platform().fail_encoder_stop("muxer crashed");
        let mut session = session(&platform);
        let mut rx = session.subscribe();

        session.start().await.unwrap();
        assert!(platform.last_encoder().unwrap().push(vec![7u8; 12]));

        assert!(matches!(session.stop().await, Err(RecordingError::Capture(_))));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(platform.live_track_count(), 0);
        assert!(!drain(&mut rx)
            .iter()
            .any(|e| matches!(e, RecordingEvent::Stopped(_))));

        assert_eq!(session.stop().await.unwrap_err(), RecordingError::NotRecording);
    }

    #[tokio::test]
    async fn test_abandoned_start_returns_to_idle() {
        let platform = platform();
        let mut session = session(&platform);
        session.list_microphones().await.unwrap();
        session.select_microphone(Some("m1")).unwrap();
        platform.set_display_outcome(DisplayOutcome::Stall);

        let pending = tokio::time::timeout(Duration::from_millis(20), session.start()).await;
        assert!(pending.is_err());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(platform.live_track_count(), 0);
        session.select_microphone(None).unwrap();

        platform.set_display_outcome(DisplayOutcome::Grant);
        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Recording);
        session.stop().await.unwrap();
        assert_eq!(platform.live_track_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_stop_returns_to_idle() {
        let platform = platform();
        platform.set_encoder_stop(EncoderStop::Stall);
        let preview = Arc::new(SimulatedPreview::default());
        let mut session = session(&platform).with_preview(preview.clone());
        let mut rx = session.subscribe();

        session.start().await.unwrap();
        let encoder = platform.last_encoder().unwrap();
        assert!(encoder.push(vec![1u8; 4]));

        let pending = tokio::time::timeout(Duration::from_millis(20), session.stop()).await;
        assert!(pending.is_err());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(platform.live_track_count(), 0);
        assert!(preview.bound().is_none());
        assert!(!encoder.push(vec![2u8; 4]));
        assert!(!drain(&mut rx)
            .iter()
            .any(|e| matches!(e, RecordingEvent::Stopped(_))));

        platform.set_encoder_stop(EncoderStop::Complete);
        session.start().await.unwrap();
        platform.last_encoder().unwrap().push(vec![3u8; 4]);
        let artifact = session.stop().await.unwrap();
        assert_eq!(&artifact.data[..], &[3u8; 4][..]);
    }

    #[tokio::test]
    async fn test_teardown_releases_every_track_and_keeps_selection() {
        let platform = platform();
        let mut session = session(&platform);
        session.list_microphones().await.unwrap();
        session.select_microphone(Some("m1")).unwrap();

        session.start().await.unwrap();
        // mic probe + mic + display video + display system audio
        assert_eq!(platform.tracks().len(), 4);
        session.stop().await.unwrap();

        assert_eq!(platform.live_track_count(), 0);
        assert_eq!(session.selected_microphone().map(|m| m.id.as_str()), Some("m1"));
    }

    #[tokio::test]
    async fn test_microphone_selection_rules() {
        let platform = platform();
        let mut session = session(&platform);

        // Nothing cached yet
        assert_eq!(
            session.select_microphone(Some("m1")).unwrap_err(),
            RecordingError::DeviceNotFound("m1".to_string())
        );
        assert!(session.select_microphone(None).is_ok());

        session.list_microphones().await.unwrap();
        assert_eq!(
            session.select_microphone(Some("ghost")).unwrap_err(),
            RecordingError::DeviceNotFound("ghost".to_string())
        );
        assert!(session.selected_microphone().is_none());

        session.start().await.unwrap();
        assert_eq!(
            session.select_microphone(None).unwrap_err(),
            RecordingError::AlreadyRecording
        );
        assert_eq!(
            session.list_microphones().await.unwrap_err(),
            RecordingError::AlreadyRecording
        );
        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_device_list_is_enumerated_once() {
        let platform = platform();
        let mut session = session(&platform);

        session.list_microphones().await.unwrap();
        platform.add_microphone("m2", "USB Mic");
        let cached = session.list_microphones().await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(platform.enumeration_count(), 1);

        let refreshed = session.refresh_microphones().await.unwrap();
        assert_eq!(refreshed.len(), 2);
        session.select_microphone(Some("m2")).unwrap();
    }

    #[tokio::test]
    async fn test_refresh_clears_vanished_selection() {
        let platform = platform();
        let mut session = session(&platform);
        session.list_microphones().await.unwrap();
        session.select_microphone(Some("m1")).unwrap();

        platform.add_microphone("m2", "USB Mic");
        platform.remove_device("m1");
        let refreshed = session.refresh_microphones().await.unwrap();
        assert_eq!(refreshed, vec![DeviceDescriptor::new("m2", "USB Mic")]);
        assert!(session.selected_microphone().is_none());
    }

    #[tokio::test]
    async fn test_enumeration_probe_is_released() {
        let platform = platform();
        let mut session = session(&platform);
        session.list_microphones().await.unwrap();
        assert_eq!(platform.tracks().len(), 1);
        assert_eq!(platform.live_track_count(), 0);
    }

    #[tokio::test]
    async fn test_chunks_before_started_are_replayed_in_order() {
        let platform = platform().with_startup_chunk(Bytes::from_static(b"hdr"));
        let mut session = session(&platform);
        let mut rx = session.subscribe();

        session.start().await.unwrap();
        platform.last_encoder().unwrap().push(Bytes::from_static(b"body"));
        let artifact = session.stop().await.unwrap();
        assert_eq!(&artifact.data[..], b"hdrbody");

        let events = drain(&mut rx);
        assert!(matches!(events[0], RecordingEvent::Started));
        assert!(matches!(events[1], RecordingEvent::DataAvailable { sequence: 0, size: 3 }));
        assert!(matches!(events[2], RecordingEvent::DataAvailable { sequence: 1, size: 4 }));
        assert!(matches!(events[3], RecordingEvent::Stopped(_)));
    }

    #[tokio::test]
    async fn test_late_chunks_are_dropped() {
        let platform = platform();
        let mut session = session(&platform);
        session.start().await.unwrap();
        let encoder = platform.last_encoder().unwrap();
        encoder.push(Bytes::from_static(b"a"));
        session.stop().await.unwrap();

        assert!(!encoder.push(Bytes::from_static(b"late")));
    }

    #[tokio::test]
    async fn test_preview_shows_display_stream_only() {
        let platform = platform();
        let preview = Arc::new(SimulatedPreview::default());
        let mut session = session(&platform).with_preview(preview.clone());
        session.list_microphones().await.unwrap();
        session.select_microphone(Some("m1")).unwrap();

        session.start().await.unwrap();
        let bound = preview.bound().unwrap();
        assert_eq!(bound, vec![TrackKind::Video, TrackKind::Audio]);
        assert_eq!(platform.display_stream_ids(), vec![preview.bound_stream_id().unwrap()]);

        session.stop().await.unwrap();
        assert!(preview.bound().is_none());
    }

    #[tokio::test]
    async fn test_states_follow_the_cycle() {
        let platform = platform();
        let mut session = session(&platform);
        let seen = Arc::new(Mutex::new(Vec::new()));
        platform.observe_state(session.state_handle(), seen.clone());

        seen.lock().push(session.state());
        session.start().await.unwrap();
        seen.lock().push(session.state());
        session.stop().await.unwrap();
        seen.lock().push(session.state());

        let states = seen.lock().clone();
        assert_eq!(
            states,
            vec![
                SessionState::Idle,
                SessionState::Acquiring,
                SessionState::Acquiring,
                SessionState::Recording,
                SessionState::Stopping,
                SessionState::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn test_many_cycles_reset_state() {
        let platform = platform();
        let mut session = session(&platform);

        for round in 0..3u8 {
            session.start().await.unwrap();
            platform.last_encoder().unwrap().push(vec![round; 8]);
            let artifact = session.stop().await.unwrap();
            assert_eq!(&artifact.data[..], &[round; 8][..]);
        }
        assert_eq!(platform.live_track_count(), 0);
    }
}
