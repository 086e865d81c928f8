//! Command/telemetry channel abstraction
//!
//! The bridge talks to the outside world through a single [`Channel`]: it
//! subscribes to the rover's driving topic, pulls at most one command per
//! control cycle and publishes one telemetry snapshot per cycle.
//!
//! # Topics
//!
//! | Topic | Direction | Payload |
//! |-------|-----------|---------|
//! | `rover/<id>/RoverDriving/control` | inbound | `{"command":"W","speed":50}` |
//! | `telemetry/<id>/RoverSensor` | outbound (redirected) | sensor snapshot JSON |
//! | `rover/<id>/RoverSensor/telemetry` | outbound (direct) | sensor snapshot JSON |
//!
//! # Implementations
//!
//! - [`TcpChannel`]: broker link over TCP with length-prefixed JSON frames
//! - [`LoopbackChannel`]: in-process channel for dry runs and tests

pub mod loopback;
pub mod tcp;
pub mod wire;

pub use loopback::{LoopbackBroker, LoopbackChannel, loopback};
pub use tcp::TcpChannel;

use crate::core::types::{PublishMode, RawCommand};
use serde::{Deserialize, Serialize};

/// Delivery guarantee requested from the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = String;

    fn try_from(level: u8) -> std::result::Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(format!("QoS level must be 0, 1 or 2, got {}", other)),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> u8 {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

/// Everything needed to open a broker session
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
}

impl Credentials {
    /// Broker address as `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Topic names for one rover
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub command: String,
    pub telemetry: String,
}

impl Topics {
    /// Resolve topic names; the telemetry topic follows the publish mode
    pub fn for_rover(rover_id: u32, mode: PublishMode) -> Self {
        let telemetry = match mode {
            PublishMode::Redirected => format!("telemetry/{}/RoverSensor", rover_id),
            PublishMode::Direct => format!("rover/{}/RoverSensor/telemetry", rover_id),
        };
        Self {
            command: format!("rover/{}/RoverDriving/control", rover_id),
            telemetry,
        }
    }
}

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Operation needs an open session
    #[error("Not connected")]
    NotConnected,

    /// Session was lost (reset, broken pipe, EOF)
    #[error("Connection lost")]
    Disconnected,

    /// Broker refused the request
    #[error("Refused by broker: {0}")]
    Refused(String),

    /// No acknowledgement within the configured wait
    #[error("Timed out waiting for broker")]
    Timeout,

    /// Malformed or unexpected frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// Whether the session has to be re-established
    pub fn is_link_loss(&self) -> bool {
        matches!(self, ChannelError::Disconnected | ChannelError::NotConnected)
    }
}

/// Bidirectional command/telemetry session.
///
/// Implementations perform the network I/O and framing; the connection
/// manager drives the lifecycle and the control loop pulls and publishes.
pub trait Channel: Send {
    /// Open a session with the broker
    fn connect(&mut self, credentials: &Credentials) -> Result<(), ChannelError>;

    /// Subscribe to a topic on the open session
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), ChannelError>;

    /// Pull the next pending command, if any, without blocking beyond the
    /// transport's poll bound
    fn try_recv(&mut self) -> Result<Option<RawCommand>, ChannelError>;

    /// Publish a payload on a topic
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), ChannelError>;

    /// Close the session (best effort)
    fn disconnect(&mut self);
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn connect(&mut self, credentials: &Credentials) -> Result<(), ChannelError> {
        (**self).connect(credentials)
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), ChannelError> {
        (**self).subscribe(topic, qos)
    }

    fn try_recv(&mut self) -> Result<Option<RawCommand>, ChannelError> {
        (**self).try_recv()
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), ChannelError> {
        (**self).publish(topic, payload, qos)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}
