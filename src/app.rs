//! Bridge assembly
//!
//! Turns a loaded [`Config`] into a running [`ControlLoop`]: resolves the
//! broker identity and topics, picks the transport and wires the devices.

use crate::config::{BrokerConfig, Config, LinkConfig, ServiceUri, TransportKind};
use crate::connection::{ConnectionManager, RetryPolicy};
use crate::control::ControlLoop;
use crate::devices::{create_actuator, create_sensor_suite};
use crate::error::Result;
use crate::link::{Channel, Credentials, LoopbackBroker, TcpChannel, Topics, loopback};
use std::time::Duration;

/// Broker session parameters for this rover
pub fn credentials(broker: &BrokerConfig, link: &LinkConfig) -> Credentials {
    Credentials {
        host: broker.host.clone(),
        port: broker.port,
        username: broker.username.clone(),
        password: broker.password.clone(),
        client_id: link
            .client_id
            .clone()
            .unwrap_or_else(|| format!("rover_{}_bridge", broker.rover_id)),
    }
}

/// Create the configured transport.
///
/// The loopback transport also returns its broker side so the caller can
/// observe telemetry and inject commands.
pub fn create_channel(link: &LinkConfig) -> (Box<dyn Channel>, Option<LoopbackBroker>) {
    match link.transport {
        TransportKind::Tcp => {
            let channel = TcpChannel::new(
                Duration::from_millis(link.connect_timeout_ms),
                Duration::from_millis(link.ack_timeout_ms),
                Duration::from_millis(link.poll_timeout_ms),
            );
            (Box::new(channel), None)
        }
        TransportKind::Loopback => {
            let (channel, broker) = loopback();
            (Box::new(channel), Some(broker))
        }
    }
}

/// Wire devices, connection and topics into a control loop
pub fn build_control_loop<C: Channel>(
    config: &Config,
    service: &ServiceUri,
    channel: C,
) -> Result<ControlLoop<C>> {
    let broker = config.broker()?;
    let topics = Topics::for_rover(broker.rover_id, broker.publish_mode);
    log::info!(
        "Rover {}: commands on {}, telemetry on {} ({:?})",
        broker.rover_id,
        topics.command,
        topics.telemetry,
        broker.publish_mode
    );

    let actuator = create_actuator(&config.device, service)?;
    let sensors = create_sensor_suite(&config.device, service)?;

    let connection = ConnectionManager::new(
        channel,
        credentials(&broker, &config.link),
        topics.command.clone(),
        broker.qos,
        RetryPolicy::from(&config.bridge),
    );

    Ok(ControlLoop::new(
        connection,
        actuator,
        sensors,
        &topics,
        broker.publish_mode,
        broker.qos,
        &config.bridge,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PublishMode;
    use crate::link::QoS;

    const CONFIG: &str = r#"
[settings]
MQTT_BROKER_C = "10.0.0.5"
MQTT_BROKER_PORT_C = 1883
MQTT_USERNAME_C = "rover"
MQTT_PASSWORD_C = "pw"
ROVER_IDENTITY_C = 12
ROVER_MQTT_QOS_C = 1
USE_REDIRECTED_TOPICS_C = true

[bridge]
cycle_interval_ms = 0

[device]
system_cores = false

[link]
transport = "loopback"
"#;

    #[test]
    fn test_default_client_id() {
        let config = Config::from_toml_str(CONFIG).unwrap();
        let creds = credentials(&config.broker().unwrap(), &config.link);
        assert_eq!(creds.client_id, "rover_12_bridge");
        assert_eq!(creds.address(), "10.0.0.5:1883");
    }

    #[test]
    fn test_build_loopback_bridge() {
        let config = Config::from_toml_str(CONFIG).unwrap();
        let (channel, broker) = create_channel(&config.link);
        let broker = broker.unwrap();

        let mut control =
            build_control_loop(&config, &ServiceUri::new(9000, "tok"), channel).unwrap();
        assert_eq!(control.publish_mode(), PublishMode::Redirected);

        control.run_cycle().unwrap();
        assert_eq!(
            broker.subscription().as_deref(),
            Some("rover/12/RoverDriving/control")
        );

        let published = broker.drain_published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "telemetry/12/RoverSensor");
        assert_eq!(published[0].qos, QoS::AtLeastOnce);
        assert_eq!(published[0].json().unwrap()["bearing"], 3.0);
    }
}
