//! Simulation devices
//!
//! [`FixedSensors`] reports a constant placeholder value for every field so
//! the bridge can run without hardware. [`SimDrive`] accepts every motion
//! primitive and records the commanded state; clones share that state.

use crate::config::ServiceUri;
use crate::core::types::{DriveAction, InertialSample, Speed};
use crate::drivers::{
    CoreUtilization, DriveActuator, Inertial6Dof, InfraredPosition, InfraredProximity,
    MagneticBearing, UltrasonicPosition, UltrasonicRange,
};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Placeholder readings for every sensor capability
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSensors;

impl FixedSensors {
    pub fn new() -> Self {
        Self
    }
}

impl UltrasonicRange for FixedSensors {
    fn read_range(&mut self, position: UltrasonicPosition) -> Result<f32> {
        Ok(match position {
            UltrasonicPosition::Front => 1.0,
            UltrasonicPosition::Rear => 2.0,
        })
    }
}

impl MagneticBearing for FixedSensors {
    fn read_bearing(&mut self) -> Result<f32> {
        Ok(3.0)
    }
}

impl InfraredProximity for FixedSensors {
    fn read_proximity(&mut self, position: InfraredPosition) -> Result<f32> {
        Ok(4.0 + position.index() as f32)
    }
}

impl Inertial6Dof for FixedSensors {
    fn read_inertial(&mut self) -> Result<InertialSample> {
        Ok(InertialSample {
            accel: [8.0, 9.0, 10.0],
            gyro: [11.0, 12.0, 13.0],
            angle: [14.0, 15.0, 16.0],
        })
    }
}

impl CoreUtilization for FixedSensors {
    fn read_utilization(&mut self) -> Result<Vec<f32>> {
        Ok(vec![17.0, 18.0, 19.0, 20.0])
    }
}

#[derive(Debug)]
struct DriveState {
    speed: Speed,
    motion: DriveAction,
    /// Motion primitives executed (including stops)
    motions: u64,
    faulted: bool,
}

/// Simulated drive
#[derive(Debug, Clone)]
pub struct SimDrive {
    endpoint: String,
    state: Arc<Mutex<DriveState>>,
}

impl SimDrive {
    pub fn new(service: &ServiceUri) -> Self {
        Self {
            endpoint: service.to_string(),
            state: Arc::new(Mutex::new(DriveState {
                speed: Speed::ZERO,
                motion: DriveAction::Stop,
                motions: 0,
                faulted: false,
            })),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Speed last set
    pub fn speed(&self) -> Speed {
        self.state.lock().speed
    }

    /// Motion last executed
    pub fn motion(&self) -> DriveAction {
        self.state.lock().motion
    }

    /// Number of motion primitives executed so far
    pub fn motions(&self) -> u64 {
        self.state.lock().motions
    }

    /// Make every primitive fail until cleared
    pub fn set_fault(&self, faulted: bool) {
        self.state.lock().faulted = faulted;
    }

    fn execute(&mut self, motion: DriveAction) -> Result<()> {
        let mut state = self.state.lock();
        if state.faulted {
            return Err(Error::Other(format!("drive fault during {:?}", motion)));
        }
        state.motion = motion;
        state.motions += 1;
        log::trace!("Sim drive: {:?} at {}", motion, state.speed);
        Ok(())
    }
}

impl DriveActuator for SimDrive {
    fn set_speed(&mut self, speed: Speed) -> Result<()> {
        let mut state = self.state.lock();
        if state.faulted {
            return Err(Error::Other("drive fault while setting speed".to_string()));
        }
        state.speed = speed;
        Ok(())
    }

    fn forward(&mut self) -> Result<()> {
        self.execute(DriveAction::Forward)
    }

    fn backward(&mut self) -> Result<()> {
        self.execute(DriveAction::Backward)
    }

    fn turn_left(&mut self) -> Result<()> {
        self.execute(DriveAction::TurnLeft)
    }

    fn turn_right(&mut self) -> Result<()> {
        self.execute(DriveAction::TurnRight)
    }

    fn stop(&mut self) -> Result<()> {
        self.execute(DriveAction::Stop)
    }

    fn forward_left(&mut self) -> Result<()> {
        self.execute(DriveAction::DiagForwardLeft)
    }

    fn forward_right(&mut self) -> Result<()> {
        self.execute(DriveAction::DiagForwardRight)
    }

    fn backward_left(&mut self) -> Result<()> {
        self.execute(DriveAction::DiagBackwardLeft)
    }

    fn backward_right(&mut self) -> Result<()> {
        self.execute(DriveAction::DiagBackwardRight)
    }
}
