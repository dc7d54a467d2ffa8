//! In-memory capture platform
//!
//! Backs the demo binary and the test suite. Devices, permission prompts and
//! the display picker are scripted; every track handed out is kept in a
//! ledger so callers can check that it was released. Encoders are driven
//! through [`EncoderControl`] handles, or tick on their own when auto chunks
//! are enabled and a timeslice is given.

use super::traits::{
    CaptureError, CaptureResult, ChunkSink, DeviceKind, DisplayMediaConstraints,
    EncodingProfile, MediaDeviceInfo, MediaDevices, MediaEncoder, MediaStream, MediaTrack,
    PreviewSurface, TrackKind, UserMediaConstraints,
};
use crate::recorder::state::{SessionState, StateHandle};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// What the display picker does when asked for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayOutcome {
    Grant,
    Deny,
    Cancel,
    /// The picker stays open and the request never resolves
    Stall,
}

/// How encoders behave when asked to stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderStop {
    Complete,
    /// Halt without flushing and report a platform error
    Fail(String),
    /// Never resolve
    Stall,
}

/// A track in the simulated ledger
#[derive(Debug)]
pub struct SimulatedTrack {
    id: String,
    kind: TrackKind,
    label: String,
    live: AtomicBool,
}

impl MediaTrack for SimulatedTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            tracing::debug!("Track {} ({}) stopped", self.label, self.id);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Records the session state each time the platform is called into
#[derive(Clone)]
struct StateObserver {
    handle: StateHandle,
    log: Arc<Mutex<Vec<SessionState>>>,
}

impl StateObserver {
    fn record(&self) {
        self.log.lock().push(self.handle.get());
    }
}

struct PlatformInner {
    devices: Vec<MediaDeviceInfo>,
    microphone_permission: bool,
    display_outcome: DisplayOutcome,
    system_audio: bool,
    encoder_failure: Option<String>,
    encoder_stop: EncoderStop,
    startup_chunks: Vec<Bytes>,
    auto_chunk_size: Option<usize>,
    tracks: Vec<Arc<SimulatedTrack>>,
    user_media_requests: Vec<UserMediaConstraints>,
    display_requests: Vec<DisplayMediaConstraints>,
    display_stream_ids: Vec<String>,
    encoders: Vec<EncoderControl>,
    enumerations: usize,
    observer: Option<StateObserver>,
}

impl Default for PlatformInner {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            microphone_permission: true,
            display_outcome: DisplayOutcome::Grant,
            system_audio: true,
            encoder_failure: None,
            encoder_stop: EncoderStop::Complete,
            startup_chunks: Vec::new(),
            auto_chunk_size: None,
            tracks: Vec::new(),
            user_media_requests: Vec::new(),
            display_requests: Vec::new(),
            display_stream_ids: Vec::new(),
            encoders: Vec::new(),
            enumerations: 0,
            observer: None,
        }
    }
}

impl PlatformInner {
    fn new_track(&mut self, kind: TrackKind, label: &str) -> Arc<dyn MediaTrack> {
        let track = Arc::new(SimulatedTrack {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            label: label.to_string(),
            live: AtomicBool::new(true),
        });
        self.tracks.push(track.clone());
        track
    }

    fn observe(&self) {
        if let Some(observer) = &self.observer {
            observer.record();
        }
    }
}

/// Scripted capture platform
#[derive(Clone, Default)]
pub struct SimulatedPlatform {
    inner: Arc<Mutex<PlatformInner>>,
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_microphone(self, id: &str, label: &str) -> Self {
        self.add_microphone(id, label);
        self
    }

    /// Refuse audio-input permission
    pub fn deny_microphone(self) -> Self {
        self.inner.lock().microphone_permission = false;
        self
    }

    /// Make the display picker refuse permission
    pub fn deny_display(self) -> Self {
        self.set_display_outcome(DisplayOutcome::Deny);
        self
    }

    /// Make the user dismiss the display picker
    pub fn cancel_display(self) -> Self {
        self.set_display_outcome(DisplayOutcome::Cancel);
        self
    }

    /// Display capture yields no system audio track
    pub fn without_system_audio(self) -> Self {
        self.inner.lock().system_audio = false;
        self
    }

    /// Encoder creation fails with NotSupported
    pub fn fail_encoder(self, message: &str) -> Self {
        self.inner.lock().encoder_failure = Some(message.to_string());
        self
    }

    /// Encoders fail to stop with a platform error
    pub fn fail_encoder_stop(self, message: &str) -> Self {
        self.set_encoder_stop(EncoderStop::Fail(message.to_string()));
        self
    }

    /// Chunk every encoder delivers while it is starting
    pub fn with_startup_chunk(self, chunk: Bytes) -> Self {
        self.inner.lock().startup_chunks.push(chunk);
        self
    }

    /// Encoders emit a `size`-byte chunk every timeslice on their own
    pub fn with_auto_chunks(self, size: usize) -> Self {
        self.inner.lock().auto_chunk_size = Some(size);
        self
    }

    pub fn add_microphone(&self, id: &str, label: &str) {
        self.inner.lock().devices.push(MediaDeviceInfo {
            device_id: id.to_string(),
            label: label.to_string(),
            kind: DeviceKind::AudioInput,
        });
    }

    pub fn remove_device(&self, id: &str) {
        self.inner.lock().devices.retain(|d| d.device_id != id);
    }

    pub fn set_display_outcome(&self, outcome: DisplayOutcome) {
        self.inner.lock().display_outcome = outcome;
    }

    /// Applies to encoders created after this call
    pub fn set_encoder_stop(&self, behavior: EncoderStop) {
        self.inner.lock().encoder_stop = behavior;
    }

    /// Push the session state into `log` on every platform call
    pub fn observe_state(&self, handle: StateHandle, log: Arc<Mutex<Vec<SessionState>>>) {
        self.inner.lock().observer = Some(StateObserver { handle, log });
    }

    /// Every track ever handed out
    pub fn tracks(&self) -> Vec<Arc<SimulatedTrack>> {
        self.inner.lock().tracks.clone()
    }

    pub fn live_track_count(&self) -> usize {
        self.inner.lock().tracks.iter().filter(|t| t.is_live()).count()
    }

    pub fn user_media_requests(&self) -> Vec<UserMediaConstraints> {
        self.inner.lock().user_media_requests.clone()
    }

    pub fn display_requests(&self) -> Vec<DisplayMediaConstraints> {
        self.inner.lock().display_requests.clone()
    }

    pub fn display_stream_ids(&self) -> Vec<String> {
        self.inner.lock().display_stream_ids.clone()
    }

    pub fn enumeration_count(&self) -> usize {
        self.inner.lock().enumerations
    }

    /// Control handle of the most recently created encoder
    pub fn last_encoder(&self) -> Option<EncoderControl> {
        self.inner.lock().encoders.last().cloned()
    }
}

#[async_trait]
impl MediaDevices for SimulatedPlatform {
    async fn enumerate_devices(&self) -> CaptureResult<Vec<MediaDeviceInfo>> {
        let mut inner = self.inner.lock();
        inner.enumerations += 1;
        Ok(inner.devices.clone())
    }

    async fn get_user_media(&self, constraints: &UserMediaConstraints) -> CaptureResult<MediaStream> {
        let mut inner = self.inner.lock();
        inner.observe();
        inner.user_media_requests.push(constraints.clone());

        if constraints.video {
            return Err(CaptureError::NotSupported("camera capture".to_string()));
        }
        let Some(audio) = &constraints.audio else {
            return Err(CaptureError::NotSupported("empty constraints".to_string()));
        };
        if !inner.microphone_permission {
            return Err(CaptureError::PermissionDenied("microphone access denied".to_string()));
        }

        let label = inner
            .devices
            .iter()
            .filter(|d| d.kind == DeviceKind::AudioInput)
            .find(|d| audio.device_id.as_ref().map_or(true, |id| *id == d.device_id))
            .map(|d| d.label.clone())
            .ok_or_else(|| {
                CaptureError::NotFound(audio.device_id.clone().unwrap_or_else(|| "default".into()))
            })?;

        let track = inner.new_track(TrackKind::Audio, &label);
        Ok(MediaStream::new(vec![track]))
    }

    async fn get_display_media(
        &self,
        constraints: &DisplayMediaConstraints,
    ) -> CaptureResult<MediaStream> {
        let outcome = {
            let mut inner = self.inner.lock();
            inner.observe();
            inner.display_requests.push(*constraints);
            inner.display_outcome
        };

        match outcome {
            DisplayOutcome::Deny => {
                return Err(CaptureError::PermissionDenied("screen capture denied".to_string()))
            }
            DisplayOutcome::Cancel => return Err(CaptureError::Aborted),
            DisplayOutcome::Stall => std::future::pending::<()>().await,
            DisplayOutcome::Grant => {}
        }

        let mut inner = self.inner.lock();
        let mut tracks = Vec::new();
        if constraints.video {
            tracks.push(inner.new_track(TrackKind::Video, "Screen 1"));
        }
        if constraints.audio && inner.system_audio {
            tracks.push(inner.new_track(TrackKind::Audio, "System Audio"));
        }

        let stream = MediaStream::new(tracks);
        inner.display_stream_ids.push(stream.id().to_string());
        Ok(stream)
    }

    fn create_encoder(
        &self,
        stream: &MediaStream,
        profile: &EncodingProfile,
    ) -> CaptureResult<Box<dyn MediaEncoder>> {
        let mut inner = self.inner.lock();
        if let Some(message) = &inner.encoder_failure {
            return Err(CaptureError::NotSupported(message.clone()));
        }

        let control = EncoderControl::new(
            profile.mime_type(),
            stream
                .tracks()
                .iter()
                .map(|t| (t.kind(), t.label().to_string()))
                .collect(),
        );
        inner.encoders.push(control.clone());

        Ok(Box::new(SimulatedEncoder {
            control,
            startup_chunks: inner.startup_chunks.clone(),
            auto_chunk_size: inner.auto_chunk_size,
            stop_behavior: inner.encoder_stop.clone(),
            observer: inner.observer.clone(),
            ticker: None,
        }))
    }
}

struct EncoderShared {
    mime_type: String,
    tracks: Vec<(TrackKind, String)>,
    sink: Option<Arc<dyn ChunkSink>>,
    running: bool,
    final_chunk: Option<Bytes>,
}

/// Test-side handle to a simulated encoder
#[derive(Clone)]
pub struct EncoderControl {
    inner: Arc<Mutex<EncoderShared>>,
}

impl EncoderControl {
    fn new(mime_type: String, tracks: Vec<(TrackKind, String)>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EncoderShared {
                mime_type,
                tracks,
                sink: None,
                running: false,
                final_chunk: None,
            })),
        }
    }

    /// Deliver a chunk as the encoder. Returns `false` if it was not accepted.
    pub fn push(&self, chunk: impl Into<Bytes>) -> bool {
        let shared = self.inner.lock();
        match (&shared.sink, shared.running) {
            (Some(sink), true) => sink.deliver(chunk.into()),
            _ => false,
        }
    }

    /// Chunk flushed when the encoder stops
    pub fn set_final_chunk(&self, chunk: Bytes) {
        self.inner.lock().final_chunk = Some(chunk);
    }

    pub fn mime_type(&self) -> String {
        self.inner.lock().mime_type.clone()
    }

    /// Kinds of the tracks the encoder was built with, in order
    pub fn track_kinds(&self) -> Vec<TrackKind> {
        self.inner.lock().tracks.iter().map(|(kind, _)| *kind).collect()
    }

    pub fn track_labels(&self) -> Vec<String> {
        self.inner.lock().tracks.iter().map(|(_, label)| label.clone()).collect()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }
}

struct SimulatedEncoder {
    control: EncoderControl,
    startup_chunks: Vec<Bytes>,
    auto_chunk_size: Option<usize>,
    stop_behavior: EncoderStop,
    observer: Option<StateObserver>,
    ticker: Option<JoinHandle<()>>,
}

impl SimulatedEncoder {
    fn observe(&self) {
        if let Some(observer) = &self.observer {
            observer.record();
        }
    }

    /// Stop accepting chunks and cancel the ticker, returning the sink
    fn halt(&mut self) -> Option<Arc<dyn ChunkSink>> {
        let sink = {
            let mut shared = self.control.inner.lock();
            shared.running = false;
            shared.sink.take()
        };
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        sink
    }
}

#[async_trait]
impl MediaEncoder for SimulatedEncoder {
    async fn start(
        &mut self,
        sink: Arc<dyn ChunkSink>,
        timeslice: Option<Duration>,
    ) -> CaptureResult<()> {
        self.observe();
        {
            let mut shared = self.control.inner.lock();
            shared.sink = Some(sink);
            shared.running = true;
        }

        for chunk in self.startup_chunks.drain(..) {
            self.control.push(chunk);
        }

        if let (Some(period), Some(size)) = (timeslice, self.auto_chunk_size) {
            let control = self.control.clone();
            self.ticker = Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.tick().await;
                let mut fill: u8 = 0;
                loop {
                    interval.tick().await;
                    if !control.push(vec![fill; size]) {
                        break;
                    }
                    fill = fill.wrapping_add(1);
                }
            }));
        }
        Ok(())
    }

    async fn stop(&mut self) -> CaptureResult<()> {
        self.observe();
        match self.stop_behavior.clone() {
            EncoderStop::Stall => std::future::pending().await,
            EncoderStop::Fail(message) => {
                self.halt();
                Err(CaptureError::Platform(message))
            }
            EncoderStop::Complete => {
                let final_chunk = self.control.inner.lock().final_chunk.take();
                if let (Some(chunk), Some(sink)) = (final_chunk, self.halt()) {
                    sink.deliver(chunk);
                }
                Ok(())
            }
        }
    }
}

impl Drop for SimulatedEncoder {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

/// Preview surface that remembers what it shows
#[derive(Default)]
pub struct SimulatedPreview {
    bound: Mutex<Option<(String, Vec<TrackKind>)>>,
}

impl SimulatedPreview {
    /// Track kinds of the bound stream, if any
    pub fn bound(&self) -> Option<Vec<TrackKind>> {
        self.bound.lock().as_ref().map(|(_, kinds)| kinds.clone())
    }

    pub fn bound_stream_id(&self) -> Option<String> {
        self.bound.lock().as_ref().map(|(id, _)| id.clone())
    }
}

impl PreviewSurface for SimulatedPreview {
    fn attach(&self, stream: &MediaStream) {
        let kinds = stream.tracks().iter().map(|t| t.kind()).collect();
        *self.bound.lock() = Some((stream.id().to_string(), kinds));
    }

    fn detach(&self) {
        *self.bound.lock() = None;
    }
}
