//! Control loop
//!
//! One cycle: make sure the session is ready, pull at most one command,
//! decode it, apply it to the drive, sample the sensors and publish the
//! snapshot. Application always happens before sampling, and sampling
//! before publishing, so telemetry reflects the post-command state.
//!
//! Only connection exhaustion ends the loop with an error. Pull, actuator,
//! sensor and publish failures are logged and counted in [`LoopStats`].

use crate::config::LoopConfig;
use crate::connection::ConnectionManager;
use crate::core::decoder;
use crate::core::types::{ControlDirective, PublishMode};
use crate::drivers::DriveActuator;
use crate::error::Result;
use crate::link::{Channel, QoS, Topics};
use crate::sensors::SensorSuite;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Counters over the life of the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub commands_received: u64,
    pub directives_applied: u64,
    pub actuator_failures: u64,
    pub sensor_failures: u64,
    /// Cycles whose sensor sampling alone took longer than the cycle interval
    pub slow_samples: u64,
    pub publish_ok: u64,
    pub publish_failures: u64,
    pub reconnects: u64,
}

impl fmt::Display for LoopStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cycles, {} commands ({} applied, {} failed), {} sensor failures, \
             {} slow samples, published {}/{}, {} reconnects",
            self.cycles,
            self.commands_received,
            self.directives_applied,
            self.actuator_failures,
            self.sensor_failures,
            self.slow_samples,
            self.publish_ok,
            self.publish_ok + self.publish_failures,
            self.reconnects
        )
    }
}

/// What happened in one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub directive: ControlDirective,
    /// Directive reached the drive without error
    pub applied: bool,
    pub published: bool,
    /// Sensor sources that failed this cycle
    pub failed_sensors: Vec<&'static str>,
    /// Wall time spent sampling sensors
    pub sample_time: Duration,
}

/// Cyclic pull, apply, sample, publish driver
pub struct ControlLoop<C: Channel> {
    connection: ConnectionManager<C>,
    actuator: Box<dyn DriveActuator>,
    sensors: SensorSuite,
    publish_mode: PublishMode,
    telemetry_topic: String,
    qos: QoS,
    cycle_interval: Duration,
    stats_every: u64,
    stats: LoopStats,
    /// Session reached Ready at least once
    established: bool,
}

impl<C: Channel> ControlLoop<C> {
    pub fn new(
        connection: ConnectionManager<C>,
        actuator: Box<dyn DriveActuator>,
        sensors: SensorSuite,
        topics: &Topics,
        publish_mode: PublishMode,
        qos: QoS,
        config: &LoopConfig,
    ) -> Self {
        Self {
            connection,
            actuator,
            sensors,
            publish_mode,
            telemetry_topic: topics.telemetry.clone(),
            qos,
            cycle_interval: config.cycle_interval(),
            stats_every: config.stats_every,
            stats: LoopStats::default(),
            established: false,
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn publish_mode(&self) -> PublishMode {
        self.publish_mode
    }

    pub fn telemetry_topic(&self) -> &str {
        &self.telemetry_topic
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }

    /// Run one cycle (without the inter-cycle sleep)
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        self.stats.cycles += 1;

        let reconnecting = self.established && !self.connection.is_ready();
        if reconnecting {
            log::info!("Session lost, re-establishing");
        }
        let mut channel = self.connection.connect_and_subscribe()?;
        if reconnecting {
            self.stats.reconnects += 1;
        }
        self.established = true;

        let command = match channel.next_command() {
            Ok(command) => command,
            Err(e) => {
                log::warn!("Command pull failed: {}", e);
                None
            }
        };
        if command.is_some() {
            self.stats.commands_received += 1;
        }

        let directive = decoder::decode_pulled(command);
        let mut applied = false;
        if !directive.is_noop() {
            match self.actuator.apply(&directive) {
                Ok(()) => {
                    applied = true;
                    self.stats.directives_applied += 1;
                    log::debug!("Applied {}", directive);
                }
                Err(e) => {
                    self.stats.actuator_failures += 1;
                    log::warn!("Failed to apply {}: {}", directive, e);
                }
            }
        }

        let sample_start = Instant::now();
        let sample = self.sensors.sample();
        let sample_time = sample_start.elapsed();
        self.stats.sensor_failures += sample.failed.len() as u64;
        if !self.cycle_interval.is_zero() && sample_time > self.cycle_interval {
            self.stats.slow_samples += 1;
            log::warn!(
                "Sensor sampling took {:?}, longer than the {:?} cycle",
                sample_time,
                self.cycle_interval
            );
        }

        let published = if !channel.is_live() {
            log::warn!("Link down, dropping telemetry for this cycle");
            false
        } else {
            match sample.snapshot.to_json() {
                Ok(payload) => match channel.publish(&self.telemetry_topic, &payload, self.qos) {
                    Ok(()) => {
                        log::debug!(
                            "Published {} bytes to {}",
                            payload.len(),
                            self.telemetry_topic
                        );
                        true
                    }
                    Err(e) => {
                        log::warn!("Publish to {} failed: {}", self.telemetry_topic, e);
                        false
                    }
                },
                Err(e) => {
                    log::warn!("Failed to encode snapshot: {}", e);
                    false
                }
            }
        };

        if published {
            self.stats.publish_ok += 1;
        } else {
            self.stats.publish_failures += 1;
        }

        Ok(CycleReport {
            directive,
            applied,
            published,
            failed_sensors: sample.failed,
            sample_time,
        })
    }

    /// Cycle until `running` is cleared or the connection is exhausted
    pub fn run(&mut self, running: &AtomicBool) -> Result<()> {
        log::info!(
            "Control loop started: {:?} telemetry on {}, cycle {:?}",
            self.publish_mode,
            self.telemetry_topic,
            self.cycle_interval
        );

        while running.load(Ordering::Relaxed) {
            if let Err(e) = self.run_cycle() {
                log::error!("Control loop stopped: {}", e);
                return Err(e);
            }

            if self.stats_every > 0 && self.stats.cycles % self.stats_every == 0 {
                log::info!("Loop stats: {}", self.stats);
            }

            if !self.cycle_interval.is_zero() {
                std::thread::sleep(self.cycle_interval);
            }
        }

        self.connection.shutdown();
        log::info!("Control loop stopped: {}", self.stats);
        Ok(())
    }
}
