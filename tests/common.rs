//! Shared fixtures for the bridge integration tests.

#![allow(dead_code)]

use rover_bridge::config::{LoopConfig, SamplingMode, ServiceUri};
use rover_bridge::connection::{ConnectionManager, RetryPolicy};
use rover_bridge::control::ControlLoop;
use rover_bridge::core::types::PublishMode;
use rover_bridge::devices::sim::{FixedSensors, SimDrive};
use rover_bridge::drivers::MagneticBearing;
use rover_bridge::link::{Credentials, LoopbackBroker, LoopbackChannel, QoS, Topics, loopback};
use rover_bridge::sensors::SensorSuite;
use std::time::Duration;

pub const ROVER_ID: u32 = 7;

/// A control loop on a loopback channel with a simulated drive
pub struct Harness {
    pub control: ControlLoop<LoopbackChannel>,
    pub broker: LoopbackBroker,
    pub drive: SimDrive,
    pub topics: Topics,
}

pub struct HarnessOptions {
    pub mode: PublishMode,
    pub subscribe_max_attempts: u32,
    pub sampling: SamplingMode,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            mode: PublishMode::Redirected,
            subscribe_max_attempts: 3,
            sampling: SamplingMode::Sequential,
        }
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        host: "loopback".into(),
        port: 1883,
        username: "rover".into(),
        password: "rover".into(),
        client_id: format!("rover_{}_bridge", ROVER_ID),
    }
}

pub fn fast_policy(subscribe_max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        connect_max_attempts: None,
        connect_backoff: Duration::ZERO,
        subscribe_max_attempts,
        subscribe_backoff: Duration::ZERO,
    }
}

/// Build a harness; `sensors` receives the drive so sources can observe it
pub fn harness_with(
    options: HarnessOptions,
    sensors: impl FnOnce(&SimDrive) -> SensorSuite,
) -> Harness {
    let (channel, broker) = loopback();
    let topics = Topics::for_rover(ROVER_ID, options.mode);
    let connection = ConnectionManager::new(
        channel,
        credentials(),
        topics.command.clone(),
        QoS::AtLeastOnce,
        fast_policy(options.subscribe_max_attempts),
    );

    let drive = SimDrive::new(&ServiceUri::new(8080, "test-token"));
    let suite = sensors(&drive);
    let config = LoopConfig {
        cycle_interval_ms: 0,
        stats_every: 0,
        ..LoopConfig::default()
    };

    let control = ControlLoop::new(
        connection,
        Box::new(drive.clone()),
        suite,
        &topics,
        options.mode,
        QoS::AtLeastOnce,
        &config,
    );

    Harness {
        control,
        broker,
        drive,
        topics,
    }
}

pub fn harness(options: HarnessOptions) -> Harness {
    let sampling = options.sampling;
    harness_with(options, |_| {
        SensorSuite::with_all(FixedSensors::new(), sampling)
    })
}

/// Bearing source that reports how many motions the drive has executed
pub struct MotionCounter(pub SimDrive);

impl MagneticBearing for MotionCounter {
    fn read_bearing(&mut self) -> rover_bridge::Result<f32> {
        Ok(self.0.motions() as f32)
    }
}

/// Bearing source that always fails
pub struct DeadCompass;

impl MagneticBearing for DeadCompass {
    fn read_bearing(&mut self) -> rover_bridge::Result<f32> {
        Err(rover_bridge::Error::SensorRead {
            source_name: "bearing",
            reason: "no response".into(),
        })
    }
}
