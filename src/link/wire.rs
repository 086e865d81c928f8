//! Broker link framing
//!
//! Every frame on the TCP link is a JSON-encoded [`LinkMessage`] behind a
//! length prefix:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ JSON LinkMessage         │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! ## Session flow
//!
//! ```text
//! bridge                      broker
//!   │── Connect ────────────────▶│
//!   │◀──────────────── ConnAck ──│
//!   │── Subscribe ──────────────▶│
//!   │◀───────────────── SubAck ──│
//!   │◀──────── Publish (command) │   any time after SubAck
//!   │── Publish (telemetry) ────▶│   once per control cycle
//!   │── Disconnect ─────────────▶│
//! ```
//!
//! A length prefix over 1 MiB is a protocol error; [`crate::link::tcp`]
//! closes the link on it since no later frame boundary can be trusted.

use crate::link::{ChannelError, QoS};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Largest accepted frame payload
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Messages exchanged with the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LinkMessage {
    Connect {
        client_id: String,
        username: String,
        password: String,
    },
    ConnAck {
        accepted: bool,
        #[serde(default)]
        reason: Option<String>,
    },
    Subscribe {
        topic: String,
        qos: QoS,
    },
    SubAck {
        topic: String,
        granted: bool,
    },
    Publish {
        topic: String,
        qos: QoS,
        payload: serde_json::Value,
    },
    Disconnect,
}

/// Encode a message as one length-prefixed frame
pub fn encode_frame(msg: &LinkMessage) -> Result<Vec<u8>, ChannelError> {
    let body = serde_json::to_vec(msg).map_err(|e| ChannelError::Protocol(e.to_string()))?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(ChannelError::Protocol(format!(
            "Frame too large: {} bytes",
            body.len()
        )));
    }

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Write one frame and flush
pub fn write_frame<W: Write>(writer: &mut W, msg: &LinkMessage) -> Result<(), ChannelError> {
    let frame = encode_frame(msg)?;
    writer.write_all(&frame).map_err(map_io_error)?;
    writer.flush().map_err(map_io_error)?;
    Ok(())
}

/// Parse the 4-byte length prefix
pub fn frame_len(header: [u8; 4]) -> Result<usize, ChannelError> {
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ChannelError::Protocol(format!(
            "Frame too large: {} bytes",
            len
        )));
    }
    Ok(len)
}

/// Decode a complete frame body
pub fn decode_body(body: &[u8]) -> Result<LinkMessage, ChannelError> {
    serde_json::from_slice(body).map_err(|e| ChannelError::Protocol(e.to_string()))
}

/// Read a frame body of known length and decode it
pub fn read_body<R: Read>(reader: &mut R, len: usize) -> Result<LinkMessage, ChannelError> {
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).map_err(map_io_error)?;
    decode_body(&body)
}

/// Read one complete frame (blocking, subject to the reader's timeout)
pub fn read_frame<R: Read>(reader: &mut R) -> Result<LinkMessage, ChannelError> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).map_err(map_io_error)?;
    let len = frame_len(header)?;
    read_body(reader, len)
}

/// Map I/O failures onto channel errors, folding link loss into
/// [`ChannelError::Disconnected`]
pub fn map_io_error(e: std::io::Error) -> ChannelError {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::NotConnected => ChannelError::Disconnected,
        ErrorKind::WouldBlock | ErrorKind::TimedOut => ChannelError::Timeout,
        _ => ChannelError::Io(e),
    }
}
