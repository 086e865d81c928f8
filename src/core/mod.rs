//! Core abstractions for the control loop.
//!
//! - [`types`]: Commands, directives, snapshots and publish mode
//! - [`decoder`]: Command symbol decoding

pub mod decoder;
pub mod types;
