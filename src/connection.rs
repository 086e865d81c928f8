//! Connection lifecycle
//!
//! [`ConnectionManager`] owns the command/telemetry channel and walks it
//! through the lifecycle:
//!
//! ```text
//! Disconnected ──connect ok──▶ Connecting ──▶ SubscriptionPending ──subscribe ok──▶ Ready
//!      ▲  │                                          │        ▲                       │
//!      │  └─connect failed (retry)                   └─failed─┘ (bounded)             │
//!      └──────────────────────────── link lost ◀───────────────────────────────────────┘
//! ```
//!
//! Connect failures are retried with `connect_backoff` (forever unless a
//! bound is configured). Subscribe failures are retried with
//! `subscribe_backoff` for exactly `subscribe_max_attempts` attempts, then
//! the manager gives up with [`ConnectionError::SubscriptionExhausted`].

use crate::config::LoopConfig;
use crate::core::types::RawCommand;
use crate::link::{Channel, ChannelError, Credentials, QoS};
use std::time::Duration;

/// Lifecycle state of the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Session open, subscription not yet attempted
    Connecting,
    /// Subscription requested, not yet confirmed
    SubscriptionPending,
    Ready,
}

/// Connection lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// One connect attempt failed (transient)
    #[error("Connect failed: {0}")]
    ConnectFailed(#[source] ChannelError),

    /// Configured connect bound reached
    #[error("Connect failed after {attempts} attempts: {last}")]
    ConnectExhausted {
        attempts: u32,
        #[source]
        last: ChannelError,
    },

    /// Subscription never confirmed within the attempt budget
    #[error("Subscription failed after {attempts} attempts: {last}")]
    SubscriptionExhausted {
        attempts: u32,
        #[source]
        last: ChannelError,
    },
}

/// Attempt counter with a fixed backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBudget {
    attempts_made: u32,
    /// `None` retries forever
    max_attempts: Option<u32>,
    backoff: Duration,
}

impl RetryBudget {
    /// Budget of exactly `max_attempts` attempts (at least one)
    pub fn bounded(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts_made: 0,
            max_attempts: Some(max_attempts.max(1)),
            backoff,
        }
    }

    pub fn unbounded(backoff: Duration) -> Self {
        Self {
            attempts_made: 0,
            max_attempts: None,
            backoff,
        }
    }

    /// Count one failed attempt
    pub fn record_failure(&mut self) {
        self.attempts_made = self.attempts_made.saturating_add(1);
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_attempts
            .is_some_and(|max| self.attempts_made >= max)
    }

    /// Human-readable `n/max` (or `n`) for the attempt about to be made
    fn describe_next(&self) -> String {
        match self.max_attempts {
            Some(max) => format!("{}/{}", self.attempts_made + 1, max),
            None => format!("{}", self.attempts_made + 1),
        }
    }

    fn wait(&self) {
        if !self.backoff.is_zero() {
            std::thread::sleep(self.backoff);
        }
    }
}

/// Retry bounds and delays for both lifecycle phases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub connect_max_attempts: Option<u32>,
    pub connect_backoff: Duration,
    pub subscribe_max_attempts: u32,
    pub subscribe_backoff: Duration,
}

impl RetryPolicy {
    pub fn connect_budget(&self) -> RetryBudget {
        match self.connect_max_attempts {
            Some(max) => RetryBudget::bounded(max, self.connect_backoff),
            None => RetryBudget::unbounded(self.connect_backoff),
        }
    }

    pub fn subscribe_budget(&self) -> RetryBudget {
        RetryBudget::bounded(self.subscribe_max_attempts, self.subscribe_backoff)
    }
}

impl From<&LoopConfig> for RetryPolicy {
    fn from(config: &LoopConfig) -> Self {
        Self {
            connect_max_attempts: config.connect_max_attempts,
            connect_backoff: Duration::from_millis(config.connect_backoff_ms),
            subscribe_max_attempts: config.subscribe_max_attempts,
            subscribe_backoff: Duration::from_millis(config.subscribe_backoff_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&LoopConfig::default())
    }
}

/// Owner of the command/telemetry channel
pub struct ConnectionManager<C: Channel> {
    channel: C,
    credentials: Credentials,
    command_topic: String,
    qos: QoS,
    policy: RetryPolicy,
    state: ConnectionState,
}

impl<C: Channel> ConnectionManager<C> {
    pub fn new(
        channel: C,
        credentials: Credentials,
        command_topic: impl Into<String>,
        qos: QoS,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            channel,
            credentials,
            command_topic: command_topic.into(),
            qos,
            policy,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn command_topic(&self) -> &str {
        &self.command_topic
    }

    /// Make a single connect attempt.
    ///
    /// Success moves to `Connecting`; failure leaves the state untouched.
    pub fn try_connect(&mut self) -> Result<(), ConnectionError> {
        match self.channel.connect(&self.credentials) {
            Ok(()) => {
                self.state = ConnectionState::Connecting;
                Ok(())
            }
            Err(e) => Err(ConnectionError::ConnectFailed(e)),
        }
    }

    /// Connect (if needed) and subscribe to the command topic.
    ///
    /// Returns immediately when already `Ready`. Each call starts from a
    /// fresh [`RetryBudget`] per phase.
    pub fn connect_and_subscribe(&mut self) -> Result<ChannelHandle<'_, C>, ConnectionError> {
        if self.state != ConnectionState::Ready {
            self.establish()?;
        }
        Ok(self.handle_unchecked())
    }

    /// Handle to the live session, if `Ready`
    pub fn handle(&mut self) -> Option<ChannelHandle<'_, C>> {
        if self.is_ready() {
            Some(self.handle_unchecked())
        } else {
            None
        }
    }

    /// Close the session
    pub fn shutdown(&mut self) {
        if self.state != ConnectionState::Disconnected {
            log::info!("Closing session with {}", self.credentials.address());
        }
        self.channel.disconnect();
        self.state = ConnectionState::Disconnected;
    }

    fn handle_unchecked(&mut self) -> ChannelHandle<'_, C> {
        ChannelHandle {
            channel: &mut self.channel,
            state: &mut self.state,
        }
    }

    fn establish(&mut self) -> Result<(), ConnectionError> {
        let mut connect_budget = self.policy.connect_budget();
        let mut subscribe_budget = self.policy.subscribe_budget();

        loop {
            if self.state == ConnectionState::Disconnected {
                self.connect_with_retry(&mut connect_budget)?;
            }

            self.state = ConnectionState::SubscriptionPending;
            log::info!(
                "Subscribing to {} (attempt {})",
                self.command_topic,
                subscribe_budget.describe_next()
            );

            let err = match self.channel.subscribe(&self.command_topic, self.qos) {
                Ok(()) => {
                    self.state = ConnectionState::Ready;
                    log::info!(
                        "Connection ready: {} subscribed on {}",
                        self.credentials.client_id,
                        self.credentials.address()
                    );
                    return Ok(());
                }
                Err(e) => e,
            };

            subscribe_budget.record_failure();
            log::warn!(
                "Subscribe to {} failed (attempt {}): {}",
                self.command_topic,
                subscribe_budget.attempts_made(),
                err
            );

            if subscribe_budget.is_exhausted() {
                log::error!(
                    "Giving up on {} after {} subscribe attempts",
                    self.command_topic,
                    subscribe_budget.attempts_made()
                );
                self.channel.disconnect();
                self.state = ConnectionState::Disconnected;
                return Err(ConnectionError::SubscriptionExhausted {
                    attempts: subscribe_budget.attempts_made(),
                    last: err,
                });
            }

            if err.is_link_loss() {
                // Session went away underneath the subscription
                self.state = ConnectionState::Disconnected;
            }
            subscribe_budget.wait();
        }
    }

    fn connect_with_retry(&mut self, budget: &mut RetryBudget) -> Result<(), ConnectionError> {
        loop {
            log::info!(
                "Connecting to {} as {} (attempt {})",
                self.credentials.address(),
                self.credentials.client_id,
                budget.describe_next()
            );

            match self.try_connect() {
                Ok(()) => {
                    log::info!("Connected to {}", self.credentials.address());
                    return Ok(());
                }
                Err(ConnectionError::ConnectFailed(last)) => {
                    budget.record_failure();
                    log::warn!("Connect to {} failed: {}", self.credentials.address(), last);

                    if budget.is_exhausted() {
                        log::error!(
                            "Giving up on {} after {} connect attempts",
                            self.credentials.address(),
                            budget.attempts_made()
                        );
                        return Err(ConnectionError::ConnectExhausted {
                            attempts: budget.attempts_made(),
                            last,
                        });
                    }
                    budget.wait();
                }
                Err(other) => return Err(other),
            }
        }
    }
}

/// Borrowed access to a `Ready` session.
///
/// Link loss observed through the handle moves the manager back to
/// `Disconnected`.
pub struct ChannelHandle<'a, C: Channel> {
    channel: &'a mut C,
    state: &'a mut ConnectionState,
}

impl<C: Channel> ChannelHandle<'_, C> {
    /// Pull the next pending command (bounded wait)
    pub fn next_command(&mut self) -> Result<Option<RawCommand>, ChannelError> {
        let result = self.channel.try_recv();
        self.observe(&result);
        result
    }

    pub fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), ChannelError> {
        let result = self.channel.publish(topic, payload, qos);
        self.observe(&result);
        result
    }

    /// Whether the session survived every operation so far
    pub fn is_live(&self) -> bool {
        *self.state == ConnectionState::Ready
    }

    fn observe<T>(&mut self, result: &Result<T, ChannelError>) {
        if let Err(e) = result
            && e.is_link_loss()
            && *self.state == ConnectionState::Ready
        {
            log::warn!("Link lost: {}", e);
            *self.state = ConnectionState::Disconnected;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LoopbackBroker, LoopbackChannel, loopback};

    fn credentials() -> Credentials {
        Credentials {
            host: "loopback".into(),
            port: 1883,
            username: "rover".into(),
            password: "secret".into(),
            client_id: "rover_1_bridge".into(),
        }
    }

    fn policy(subscribe_max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            connect_max_attempts: None,
            connect_backoff: Duration::ZERO,
            subscribe_max_attempts,
            subscribe_backoff: Duration::ZERO,
        }
    }

    fn manager(policy: RetryPolicy) -> (ConnectionManager<LoopbackChannel>, LoopbackBroker) {
        let (channel, broker) = loopback();
        let manager = ConnectionManager::new(
            channel,
            credentials(),
            "rover/1/RoverDriving/control",
            QoS::AtLeastOnce,
            policy,
        );
        (manager, broker)
    }

    #[test]
    fn test_budget_counts() {
        let mut budget = RetryBudget::bounded(3, Duration::ZERO);
        assert!(!budget.is_exhausted());
        budget.record_failure();
        budget.record_failure();
        assert!(!budget.is_exhausted());
        budget.record_failure();
        assert!(budget.is_exhausted());
        assert_eq!(budget.attempts_made(), 3);

        let mut forever = RetryBudget::unbounded(Duration::ZERO);
        for _ in 0..1000 {
            forever.record_failure();
        }
        assert!(!forever.is_exhausted());
    }

    #[test]
    fn test_zero_bound_still_allows_one_attempt() {
        assert_eq!(RetryBudget::bounded(0, Duration::ZERO).max_attempts(), Some(1));
    }

    #[test]
    fn test_policy_from_loop_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.subscribe_max_attempts, 100);
        assert_eq!(policy.subscribe_backoff, Duration::from_millis(1));
        assert_eq!(policy.connect_max_attempts, None);
        assert_eq!(policy.connect_budget().max_attempts(), None);
    }

    #[test]
    fn test_connect_and_subscribe() {
        let (mut manager, broker) = manager(policy(5));
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.connect_and_subscribe().unwrap();
        assert!(manager.is_ready());
        assert_eq!(
            broker.subscription().as_deref(),
            Some("rover/1/RoverDriving/control")
        );

        // Already ready: no further channel traffic
        manager.connect_and_subscribe().unwrap();
        assert_eq!(broker.connect_calls(), 1);
        assert_eq!(broker.subscribe_calls(), 1);
    }

    #[test]
    fn test_connect_failures_retried() {
        let (mut manager, broker) = manager(policy(5));
        broker.fail_connects(7);

        manager.connect_and_subscribe().unwrap();
        assert_eq!(broker.connect_calls(), 8);
        assert!(manager.is_ready());
    }

    #[test]
    fn test_failed_connect_leaves_state() {
        let (mut manager, broker) = manager(policy(5));
        broker.fail_connects(1);

        assert!(matches!(
            manager.try_connect(),
            Err(ConnectionError::ConnectFailed(_))
        ));
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.try_connect().unwrap();
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_connect_bound() {
        let mut p = policy(5);
        p.connect_max_attempts = Some(3);
        let (mut manager, broker) = manager(p);
        broker.fail_connects(u32::MAX);

        match manager.connect_and_subscribe() {
            Err(ConnectionError::ConnectExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("connect should not succeed"),
        }
        assert_eq!(broker.connect_calls(), 3);
    }

    #[test]
    fn test_subscribe_exhausted_after_exactly_n_attempts() {
        for n in [1, 2, 7, 100] {
            let (mut manager, broker) = manager(policy(n));
            broker.fail_subscribes(u32::MAX);

            match manager.connect_and_subscribe() {
                Err(ConnectionError::SubscriptionExhausted { attempts, .. }) => {
                    assert_eq!(attempts, n)
                }
                Err(other) => panic!("unexpected error: {}", other),
                Ok(_) => panic!("subscribe should not succeed"),
            }
            assert_eq!(broker.subscribe_calls(), n);
            // Subscription retries never reconnect
            assert_eq!(broker.connect_calls(), 1);
            assert_eq!(manager.state(), ConnectionState::Disconnected);
        }
    }

    #[test]
    fn test_subscribe_succeeds_on_last_attempt() {
        let (mut manager, broker) = manager(policy(4));
        broker.fail_subscribes(3);

        manager.connect_and_subscribe().unwrap();
        assert_eq!(broker.subscribe_calls(), 4);
        assert!(manager.is_ready());
    }

    #[test]
    fn test_link_loss_during_subscribe_reconnects() {
        let (mut manager, broker) = manager(policy(5));
        manager.try_connect().unwrap();
        broker.drop_link();

        manager.connect_and_subscribe().unwrap();
        assert_eq!(broker.connect_calls(), 2);
        assert_eq!(broker.subscribe_calls(), 2);
        assert!(manager.is_ready());
    }

    #[test]
    fn test_handle_marks_link_loss() {
        let (mut manager, broker) = manager(policy(5));
        {
            let mut handle = manager.connect_and_subscribe().unwrap();
            assert_eq!(handle.next_command().unwrap(), None);

            broker.drop_link();
            assert!(handle.publish("t", b"{}", QoS::AtMostOnce).is_err());
            assert!(!handle.is_live());
        }
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.handle().is_none());

        manager.connect_and_subscribe().unwrap();
        assert_eq!(broker.connect_calls(), 2);
    }

    #[test]
    fn test_non_fatal_publish_error_keeps_session() {
        let (mut manager, broker) = manager(policy(5));
        let mut handle = manager.connect_and_subscribe().unwrap();

        broker.fail_publishes(1);
        assert!(matches!(
            handle.publish("t", b"{}", QoS::AtMostOnce),
            Err(ChannelError::Timeout)
        ));
        assert!(handle.is_live());
    }
}
