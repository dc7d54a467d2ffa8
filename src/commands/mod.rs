//! Command handlers
//!
//! This module contains the request handlers a UI shell calls into.

pub mod recording;
