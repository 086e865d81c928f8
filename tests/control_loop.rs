//! Control loop integration tests over the loopback channel.

mod common;

use common::{DeadCompass, HarnessOptions, MotionCounter, ROVER_ID, harness, harness_with};
use rover_bridge::config::SamplingMode;
use rover_bridge::connection::{ConnectionError, ConnectionState};
use rover_bridge::core::types::{
    ControlDirective, DriveAction, PublishMode, RawCommand, SENSOR_UNSET, Speed,
};
use rover_bridge::devices::sim::FixedSensors;
use rover_bridge::sensors::SensorSuite;
use rover_bridge::Error;
use std::sync::atomic::AtomicBool;

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_apply_precedes_publish_for_100_cycles() {
    let mut h = harness_with(HarnessOptions::default(), |drive| {
        SensorSuite::with_all(FixedSensors::new(), SamplingMode::Sequential)
            .with_bearing(MotionCounter(drive.clone()))
    });

    for cycle in 1..=100u32 {
        let symbol = if cycle % 2 == 0 { 'W' } else { 'S' };
        h.broker.send_command(RawCommand::new(symbol, 30));

        let report = h.control.run_cycle().unwrap();
        assert!(report.applied, "cycle {cycle}");

        let published = h.broker.drain_published();
        assert_eq!(published.len(), 1, "cycle {cycle}");
        let bearing = published[0].json().unwrap()["bearing"].as_f64().unwrap();
        assert_eq!(
            bearing, cycle as f64,
            "snapshot of cycle {cycle} must reflect that cycle's command"
        );
    }

    let stats = h.control.stats();
    assert_eq!(stats.cycles, 100);
    assert_eq!(stats.directives_applied, 100);
    assert_eq!(stats.publish_ok, 100);
}

#[test]
fn test_decode_scenario_through_loop() {
    let mut h = harness(HarnessOptions::default());

    h.broker.send_command(RawCommand::new('W', 50));
    let first = h.control.run_cycle().unwrap();
    assert_eq!(h.drive.motion(), DriveAction::Forward);

    let second = h.control.run_cycle().unwrap();
    assert_eq!(h.drive.motion(), DriveAction::Forward, "no implicit stop");

    h.broker.send_command(RawCommand::new('Z', 10));
    let third = h.control.run_cycle().unwrap();
    assert_eq!(h.drive.motion(), DriveAction::Stop);

    assert_eq!(
        [first.directive, second.directive, third.directive],
        [
            ControlDirective::new(DriveAction::Forward, Speed::clamped(50)),
            ControlDirective::noop(),
            ControlDirective::new(DriveAction::Stop, Speed::clamped(10)),
        ]
    );
}

#[test]
fn test_explicit_noop_symbol_leaves_drive() {
    let mut h = harness(HarnessOptions::default());
    h.broker.send_command(RawCommand::new('J', 60));
    h.control.run_cycle().unwrap();

    h.broker.send_command(RawCommand::new('F', 90));
    let report = h.control.run_cycle().unwrap();
    assert!(report.directive.is_noop());
    assert_eq!(h.drive.motion(), DriveAction::TurnLeft);
    assert_eq!(h.drive.speed().get(), 60);
    assert_eq!(h.control.stats().commands_received, 2);
    assert_eq!(h.control.stats().directives_applied, 1);
}

// ============================================================================
// Publish path
// ============================================================================

fn published_topics(mode: PublishMode) -> Vec<String> {
    let mut h = harness(HarnessOptions {
        mode,
        ..HarnessOptions::default()
    });
    for _ in 0..20 {
        h.control.run_cycle().unwrap();
    }
    h.broker
        .drain_published()
        .into_iter()
        .map(|p| p.topic)
        .collect()
}

#[test]
fn test_redirected_mode_publishes_only_redirected() {
    let topics = published_topics(PublishMode::Redirected);
    assert_eq!(topics.len(), 20);
    let expected = format!("telemetry/{}/RoverSensor", ROVER_ID);
    assert!(topics.iter().all(|t| *t == expected));
}

#[test]
fn test_direct_mode_publishes_only_direct() {
    let topics = published_topics(PublishMode::Direct);
    assert_eq!(topics.len(), 20);
    let expected = format!("rover/{}/RoverSensor/telemetry", ROVER_ID);
    assert!(topics.iter().all(|t| *t == expected));
}

// ============================================================================
// Sensor failures
// ============================================================================

#[test]
fn test_failed_bearing_published_as_unset() {
    for sampling in [SamplingMode::Sequential, SamplingMode::Parallel] {
        let mut h = harness_with(
            HarnessOptions {
                sampling,
                ..HarnessOptions::default()
            },
            |_| SensorSuite::with_all(FixedSensors::new(), sampling).with_bearing(DeadCompass),
        );

        let report = h.control.run_cycle().unwrap();
        assert!(report.published);
        assert_eq!(report.failed_sensors, vec!["bearing"]);

        let payload = h.broker.drain_published()[0].json().unwrap();
        assert_eq!(payload["bearing"].as_f64().unwrap(), SENSOR_UNSET as f64);
        assert_eq!(payload["ultrasonic_front"], 1.0);
        assert_eq!(payload["infrared"][3], 7.0);
        assert_eq!(payload["angle_z"], 16.0);
        assert_eq!(payload["core"][0], 17.0);
    }
}

// ============================================================================
// Connection lifecycle
// ============================================================================

#[test]
fn test_reconnects_after_link_loss() {
    let mut h = harness(HarnessOptions::default());
    for _ in 0..3 {
        h.control.run_cycle().unwrap();
    }

    h.broker.drop_link();
    let lost = h.control.run_cycle().unwrap();
    assert!(!lost.published);
    assert_eq!(
        h.control.connection().state(),
        ConnectionState::Disconnected
    );

    let resumed = h.control.run_cycle().unwrap();
    assert!(resumed.published);
    assert_eq!(h.broker.connect_calls(), 2);
    assert_eq!(h.control.stats().reconnects, 1);
    assert_eq!(h.control.stats().publish_failures, 1);
}

#[test]
fn test_subscription_exhaustion_at_startup_is_fatal() {
    let mut h = harness(HarnessOptions {
        subscribe_max_attempts: 4,
        ..HarnessOptions::default()
    });
    h.broker.fail_subscribes(u32::MAX);

    let running = AtomicBool::new(true);
    let err = h.control.run(&running).unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::SubscriptionExhausted { attempts: 4, .. })
    ));
    assert_eq!(h.broker.subscribe_calls(), 4);
    assert!(h.broker.drain_published().is_empty());
}

#[test]
fn test_subscription_exhaustion_on_reconnect_is_fatal() {
    let mut h = harness(HarnessOptions::default());
    h.control.run_cycle().unwrap();

    h.broker.fail_subscribes(u32::MAX);
    h.broker.drop_link();
    h.control.run_cycle().unwrap();

    let err = h.control.run_cycle().unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::SubscriptionExhausted { attempts: 3, .. })
    ));
    assert_eq!(h.broker.subscribe_calls(), 1 + 3);
}

#[test]
fn test_transient_connect_failures_do_not_stop_loop() {
    let mut h = harness(HarnessOptions::default());
    h.broker.fail_connects(25);

    let report = h.control.run_cycle().unwrap();
    assert!(report.published);
    assert_eq!(h.broker.connect_calls(), 26);
    assert_eq!(h.broker.subscription(), Some(h.topics.command.clone()));
}
