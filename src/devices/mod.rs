//! Device implementations

pub mod sim;
pub mod system;

use crate::config::{DeviceConfig, ServiceUri};
use crate::drivers::DriveActuator;
use crate::error::{Error, Result};
use crate::sensors::SensorSuite;
use sim::{FixedSensors, SimDrive};
use system::SystemCores;

/// Create the sensor sources based on configuration
pub fn create_sensor_suite(config: &DeviceConfig, service: &ServiceUri) -> Result<SensorSuite> {
    match config.kind.as_str() {
        "sim" => {
            let mut suite = SensorSuite::with_all(FixedSensors::new(), config.sampling);
            if config.system_cores {
                suite = suite.with_cores(SystemCores::new());
            }
            log::info!(
                "Sensor suite: {} sources for {} ({:?} sampling)",
                suite.source_count(),
                service,
                config.sampling
            );
            Ok(suite)
        }
        _ => Err(Error::UnknownDevice(config.kind.clone())),
    }
}

/// Create the drive actuator based on configuration
pub fn create_actuator(config: &DeviceConfig, service: &ServiceUri) -> Result<Box<dyn DriveActuator>> {
    match config.kind.as_str() {
        "sim" => Ok(Box::new(SimDrive::new(service))),
        _ => Err(Error::UnknownDevice(config.kind.clone())),
    }
}
