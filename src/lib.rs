//! Screen Recorder - screen and microphone recording sessions.
//!
//! This is the main library crate. It provides the recording session state
//! machine, the capture platform seam and the command layer a UI calls.

pub mod capture;
pub mod commands;
pub mod recorder;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screen_recorder=debug,screen_recorder_lib=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
