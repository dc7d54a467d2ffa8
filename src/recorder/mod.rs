//! Recording system module
//!
//! This module implements the recording session:
//! - RecordingSession state machine driving acquisition and the encoder
//! - BufferedSink/ChunkBuffer collecting encoder output
//! - RecorderConfig for codec and constraint settings

pub mod buffer;
pub mod config;
pub mod error;
pub mod session;
pub mod state;

pub use buffer::{BufferedSink, ChunkBuffer};
pub use config::RecorderConfig;
pub use error::{RecordingError, RecordingResult};
pub use session::{RecordingEvent, RecordingSession};
pub use state::{DeviceDescriptor, EncodingProfile, RecordingArtifact, SessionState, StateHandle};
