//! Capture platform
//!
//! Traits the recorder drives, plus a scripted in-memory implementation.

pub mod simulated;
pub mod traits;

// Re-export traits
pub use traits::{
    AudioConstraints, CaptureError, CaptureResult, DeviceKind, DisplayMediaConstraints,
    MediaDeviceInfo, MediaDevices, MediaEncoder, MediaStream, MediaTrack, PreviewSurface,
    TrackKind, UserMediaConstraints,
};
