//! TCP broker link
//!
//! Speaks the framed protocol from [`crate::link::wire`]. Bytes are read
//! into a receive buffer and frames are only taken off it once complete,
//! so a header or body split across polls (or cut by the ack timeout) is
//! resumed on the next read. An oversized length prefix closes the link.

use crate::core::types::RawCommand;
use crate::link::wire::{self, LinkMessage};
use crate::link::{Channel, ChannelError, Credentials, QoS};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Commands held between polls when the broker sends faster than we cycle
const MAX_PENDING_COMMANDS: usize = 64;

/// Bytes requested from the socket per read
const READ_CHUNK: usize = 4096;

/// Broker link over TCP
pub struct TcpChannel {
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    ack_timeout: Duration,
    poll_timeout: Duration,
    /// Topic commands are accepted from (set on subscribe)
    command_topic: Option<String>,
    /// Commands that arrived while waiting for an ack
    pending: VecDeque<RawCommand>,
    /// Received bytes not yet forming a complete frame
    rx: Vec<u8>,
}

impl TcpChannel {
    pub fn new(connect_timeout: Duration, ack_timeout: Duration, poll_timeout: Duration) -> Self {
        Self {
            stream: None,
            connect_timeout,
            ack_timeout,
            // Zero would disable the timeout entirely
            poll_timeout: poll_timeout.max(Duration::from_millis(1)),
            command_topic: None,
            pending: VecDeque::new(),
            rx: Vec::new(),
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream, ChannelError> {
        self.stream.as_mut().ok_or(ChannelError::NotConnected)
    }

    fn send(&mut self, msg: &LinkMessage) -> Result<(), ChannelError> {
        let result = wire::write_frame(self.stream()?, msg);
        self.drop_on_loss(result)
    }

    /// Forget the stream (and any partial frame) once the link is gone
    fn drop_on_loss<T>(&mut self, result: Result<T, ChannelError>) -> Result<T, ChannelError> {
        if let Err(ref e) = result
            && e.is_link_loss()
        {
            self.close_stream();
        }
        result
    }

    fn close_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.rx.clear();
    }

    /// Read whatever arrives within `timeout` into the receive buffer.
    ///
    /// Returns the number of bytes added (0 when the wait expired).
    fn fill(&mut self, timeout: Duration) -> Result<usize, ChannelError> {
        let stream = self.stream()?;
        stream.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;

        let mut chunk = [0u8; READ_CHUNK];
        match stream.read(&mut chunk) {
            Ok(0) => self.drop_on_loss(Err(ChannelError::Disconnected)),
            Ok(n) => {
                self.rx.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(0),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => self.drop_on_loss(Err(wire::map_io_error(e))),
        }
    }

    /// Take one complete frame off the receive buffer, if there is one.
    ///
    /// An oversized length prefix leaves no way to find the next frame
    /// boundary, so it closes the link.
    fn take_frame(&mut self) -> Result<Option<LinkMessage>, ChannelError> {
        let Some(header) = self.rx.first_chunk::<4>() else {
            return Ok(None);
        };

        let len = match wire::frame_len(*header) {
            Ok(len) => len,
            Err(e) => {
                log::warn!("Closing broker link: {}", e);
                return self.drop_on_loss(Err(ChannelError::Disconnected));
            }
        };
        if self.rx.len() < 4 + len {
            return Ok(None);
        }

        let frame: Vec<u8> = self.rx.drain(..4 + len).collect();
        // Boundaries stay intact, so an undecodable body only loses itself
        wire::decode_body(&frame[4..]).map(Some)
    }

    /// Read frames until `pick` accepts one or the ack timeout expires
    fn await_ack<T>(
        &mut self,
        mut pick: impl FnMut(&LinkMessage) -> Option<T>,
    ) -> Result<T, ChannelError> {
        let deadline = Instant::now() + self.ack_timeout;
        loop {
            match self.take_frame() {
                Ok(Some(msg)) => {
                    if let Some(result) = pick(&msg) {
                        return Ok(result);
                    }
                    self.absorb(msg);
                    continue;
                }
                Ok(None) => {}
                Err(ChannelError::Protocol(e)) => {
                    log::warn!("Skipping undecodable frame: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ChannelError::Timeout);
            }
            self.fill(remaining)?;
        }
    }

    /// Handle a frame that is not the one currently awaited
    fn absorb(&mut self, msg: LinkMessage) {
        match msg {
            LinkMessage::Publish { topic, payload, .. } => {
                if self.command_topic.as_deref() != Some(topic.as_str()) {
                    log::debug!("Ignoring publish on unsubscribed topic {}", topic);
                    return;
                }
                match serde_json::from_value::<RawCommand>(payload) {
                    Ok(cmd) => {
                        if self.pending.len() >= MAX_PENDING_COMMANDS {
                            log::warn!("Command backlog full, dropping oldest command");
                            self.pending.pop_front();
                        }
                        self.pending.push_back(cmd);
                    }
                    Err(e) => log::warn!("Dropping malformed command on {}: {}", topic, e),
                }
            }
            LinkMessage::Disconnect => {
                log::warn!("Broker closed the session");
                self.close_stream();
            }
            other => log::debug!("Unexpected frame: {:?}", other),
        }
    }

    /// Absorb every complete frame currently buffered
    fn drain_frames(&mut self) -> Result<(), ChannelError> {
        loop {
            match self.take_frame() {
                Ok(Some(msg)) => self.absorb(msg),
                Ok(None) => return Ok(()),
                Err(ChannelError::Protocol(e)) => log::warn!("Skipping undecodable frame: {}", e),
                Err(e) => return Err(e),
            }
        }
    }
}

impl Channel for TcpChannel {
    fn connect(&mut self, credentials: &Credentials) -> Result<(), ChannelError> {
        self.disconnect();

        let address = credentials.address();
        let addr = address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ChannelError::Protocol(format!("Cannot resolve {}", address)))?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        if let Err(e) = stream.set_nodelay(true) {
            log::warn!("Failed to set TCP_NODELAY: {}", e);
        }
        self.stream = Some(stream);

        self.send(&LinkMessage::Connect {
            client_id: credentials.client_id.clone(),
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        })?;

        let ack = self.await_ack(|msg| match msg {
            LinkMessage::ConnAck { accepted, reason } => Some((*accepted, reason.clone())),
            _ => None,
        });

        match ack {
            Ok((true, _)) => {
                log::debug!("Session open with {}", address);
                Ok(())
            }
            Ok((false, reason)) => {
                self.close_stream();
                Err(ChannelError::Refused(
                    reason.unwrap_or_else(|| "connection refused".to_string()),
                ))
            }
            Err(e) => {
                self.close_stream();
                Err(e)
            }
        }
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), ChannelError> {
        // Commands on this topic may arrive before the SubAck
        self.command_topic = Some(topic.to_string());

        self.send(&LinkMessage::Subscribe {
            topic: topic.to_string(),
            qos,
        })?;

        let granted = self.await_ack(|msg| match msg {
            LinkMessage::SubAck { topic: t, granted } if t == topic => Some(*granted),
            _ => None,
        })?;

        if granted {
            Ok(())
        } else {
            Err(ChannelError::Refused(format!("subscription to {}", topic)))
        }
    }

    fn try_recv(&mut self) -> Result<Option<RawCommand>, ChannelError> {
        if let Some(cmd) = self.pending.pop_front() {
            return Ok(Some(cmd));
        }

        self.stream()?;
        self.drain_frames()?;
        if self.pending.is_empty() && self.stream.is_some() {
            let poll_timeout = self.poll_timeout;
            self.fill(poll_timeout)?;
            self.drain_frames()?;
        }

        if self.stream.is_none() {
            return Err(ChannelError::Disconnected);
        }
        Ok(self.pending.pop_front())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), ChannelError> {
        let payload: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| ChannelError::Protocol(e.to_string()))?;

        self.send(&LinkMessage::Publish {
            topic: topic.to_string(),
            qos,
            payload,
        })
    }

    fn disconnect(&mut self) {
        if self.stream.is_some() {
            if let Err(e) = self.send(&LinkMessage::Disconnect) {
                log::debug!("Disconnect frame not sent: {}", e);
            }
        }
        self.close_stream();
        self.pending.clear();
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}
