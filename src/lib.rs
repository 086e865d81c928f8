//! Rover bridge - command/telemetry bridge for a mobile rover
//!
//! Receives driving commands from a broker channel, applies them to the
//! drive, samples the onboard sensors and publishes one telemetry snapshot
//! per control cycle.
//!
//! ## Layout
//!
//! - [`connection`]: session lifecycle with bounded subscribe retries
//! - [`core::decoder`]: command symbol to directive mapping
//! - [`sensors`]: per-cycle snapshot aggregation
//! - [`control`]: the pull, apply, sample, publish loop
//! - [`link`]: channel trait plus TCP and loopback transports

pub mod app;
pub mod config;
pub mod connection;
pub mod control;
pub mod core;
pub mod devices;
pub mod drivers;
pub mod error;
pub mod link;
pub mod sensors;

// Re-export commonly used types
pub use config::{Config, ServiceUri};
pub use connection::{ConnectionError, ConnectionManager, ConnectionState};
pub use control::{ControlLoop, LoopStats};
pub use error::{Error, Result};
