//! In-process channel
//!
//! [`loopback`] returns a connected pair: the [`LoopbackChannel`] side is
//! handed to the bridge, the [`LoopbackBroker`] side injects commands,
//! scripts failures and collects published telemetry. Used by `--dry-run`
//! and by the connection and control loop tests.

use crate::core::types::RawCommand;
use crate::link::{Channel, ChannelError, Credentials, QoS};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::Arc;

/// A message published through the loopback channel
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

impl Published {
    /// Decode the payload as JSON
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.payload)
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    connected: bool,
    subscription: Option<String>,
    /// Remaining injected failures per operation
    connect_failures: u32,
    subscribe_failures: u32,
    publish_failures: u32,
    /// Next operation reports link loss
    link_dropped: bool,
    connect_calls: u32,
    subscribe_calls: u32,
    publish_calls: u32,
}

impl BrokerState {
    /// Consume a pending link drop
    fn take_link_drop(&mut self) -> bool {
        if self.link_dropped {
            self.link_dropped = false;
            self.connected = false;
            self.subscription = None;
            true
        } else {
            false
        }
    }
}

fn take_failure(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

/// Bridge side of the loopback pair
pub struct LoopbackChannel {
    state: Arc<Mutex<BrokerState>>,
    commands: Receiver<RawCommand>,
    published: Sender<Published>,
}

/// Broker side of the loopback pair
#[derive(Clone)]
pub struct LoopbackBroker {
    state: Arc<Mutex<BrokerState>>,
    commands: Sender<RawCommand>,
    published: Receiver<Published>,
}

/// Create a connected channel/broker pair
pub fn loopback() -> (LoopbackChannel, LoopbackBroker) {
    let state = Arc::new(Mutex::new(BrokerState::default()));
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let (pub_tx, pub_rx) = crossbeam_channel::unbounded();

    (
        LoopbackChannel {
            state: Arc::clone(&state),
            commands: cmd_rx,
            published: pub_tx,
        },
        LoopbackBroker {
            state,
            commands: cmd_tx,
            published: pub_rx,
        },
    )
}

impl LoopbackBroker {
    /// Queue a command for the bridge
    pub fn send_command(&self, command: RawCommand) {
        // The receiver lives as long as the channel side
        let _ = self.commands.send(command);
    }

    /// Fail the next `n` connect attempts (`u32::MAX` = always)
    pub fn fail_connects(&self, n: u32) {
        self.state.lock().connect_failures = n;
    }

    /// Refuse the next `n` subscriptions (`u32::MAX` = always)
    pub fn fail_subscribes(&self, n: u32) {
        self.state.lock().subscribe_failures = n;
    }

    /// Fail the next `n` publishes without dropping the session
    pub fn fail_publishes(&self, n: u32) {
        self.state.lock().publish_failures = n;
    }

    /// Drop the session; the next channel operation sees link loss
    pub fn drop_link(&self) {
        self.state.lock().link_dropped = true;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Topic the bridge is currently subscribed to
    pub fn subscription(&self) -> Option<String> {
        self.state.lock().subscription.clone()
    }

    pub fn connect_calls(&self) -> u32 {
        self.state.lock().connect_calls
    }

    pub fn subscribe_calls(&self) -> u32 {
        self.state.lock().subscribe_calls
    }

    pub fn publish_calls(&self) -> u32 {
        self.state.lock().publish_calls
    }

    /// Everything published since the last drain
    pub fn drain_published(&self) -> Vec<Published> {
        self.published.try_iter().collect()
    }

    /// Receiver for published messages (for forwarding threads)
    pub fn published(&self) -> &Receiver<Published> {
        &self.published
    }
}

impl Channel for LoopbackChannel {
    fn connect(&mut self, _credentials: &Credentials) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        state.connect_calls += 1;
        state.link_dropped = false;

        if take_failure(&mut state.connect_failures) {
            return Err(ChannelError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "loopback broker refused connection",
            )));
        }

        state.connected = true;
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, _qos: QoS) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        state.subscribe_calls += 1;

        if state.take_link_drop() {
            return Err(ChannelError::Disconnected);
        }
        if !state.connected {
            return Err(ChannelError::NotConnected);
        }
        if take_failure(&mut state.subscribe_failures) {
            return Err(ChannelError::Refused(format!("subscription to {}", topic)));
        }

        state.subscription = Some(topic.to_string());
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<RawCommand>, ChannelError> {
        {
            let mut state = self.state.lock();
            if state.take_link_drop() {
                return Err(ChannelError::Disconnected);
            }
            if !state.connected {
                return Err(ChannelError::NotConnected);
            }
            if state.subscription.is_none() {
                return Ok(None);
            }
        }

        match self.commands.try_recv() {
            Ok(cmd) => Ok(Some(cmd)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ChannelError::Disconnected),
        }
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), ChannelError> {
        {
            let mut state = self.state.lock();
            state.publish_calls += 1;

            if state.take_link_drop() {
                return Err(ChannelError::Disconnected);
            }
            if !state.connected {
                return Err(ChannelError::NotConnected);
            }
            if take_failure(&mut state.publish_failures) {
                return Err(ChannelError::Timeout);
            }
        }

        self.published
            .send(Published {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                qos,
            })
            .map_err(|_| ChannelError::Disconnected)
    }

    fn disconnect(&mut self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.subscription = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            host: "loopback".into(),
            port: 0,
            username: String::new(),
            password: String::new(),
            client_id: "test".into(),
        }
    }

    #[test]
    fn test_commands_require_subscription() {
        let (mut ch, broker) = loopback();
        broker.send_command(RawCommand::new('W', 10));

        assert!(matches!(ch.try_recv(), Err(ChannelError::NotConnected)));
        ch.connect(&creds()).unwrap();
        assert_eq!(ch.try_recv().unwrap(), None);

        ch.subscribe("cmd", QoS::AtMostOnce).unwrap();
        assert_eq!(broker.subscription().as_deref(), Some("cmd"));
        assert_eq!(ch.try_recv().unwrap(), Some(RawCommand::new('W', 10)));
        assert_eq!(ch.try_recv().unwrap(), None);
    }

    #[test]
    fn test_injected_failures_are_consumed() {
        let (mut ch, broker) = loopback();
        broker.fail_connects(2);

        assert!(ch.connect(&creds()).is_err());
        assert!(ch.connect(&creds()).is_err());
        assert!(ch.connect(&creds()).is_ok());
        assert_eq!(broker.connect_calls(), 3);

        broker.fail_subscribes(1);
        assert!(matches!(
            ch.subscribe("cmd", QoS::AtLeastOnce),
            Err(ChannelError::Refused(_))
        ));
        assert!(ch.subscribe("cmd", QoS::AtLeastOnce).is_ok());
        assert_eq!(broker.subscribe_calls(), 2);
    }

    #[test]
    fn test_link_drop() {
        let (mut ch, broker) = loopback();
        ch.connect(&creds()).unwrap();
        ch.subscribe("cmd", QoS::AtMostOnce).unwrap();

        broker.drop_link();
        assert!(matches!(
            ch.publish("t", b"{}", QoS::AtMostOnce),
            Err(ChannelError::Disconnected)
        ));
        assert!(!broker.is_connected());
        assert!(matches!(
            ch.publish("t", b"{}", QoS::AtMostOnce),
            Err(ChannelError::NotConnected)
        ));
    }

    #[test]
    fn test_published_messages_collected() {
        let (mut ch, broker) = loopback();
        ch.connect(&creds()).unwrap();

        broker.fail_publishes(1);
        assert!(matches!(
            ch.publish("t", b"{}", QoS::AtMostOnce),
            Err(ChannelError::Timeout)
        ));
        ch.publish("t", br#"{"a":1}"#, QoS::AtMostOnce).unwrap();

        let published = broker.drain_published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "t");
        assert_eq!(published[0].json().unwrap()["a"], 1);
        assert_eq!(broker.publish_calls(), 2);
    }
}
