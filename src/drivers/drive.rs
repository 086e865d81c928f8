//! Drive actuator trait

use crate::core::types::{ControlDirective, DriveAction, Speed};
use crate::error::Result;

/// Drive actuator with the platform's motion primitives
pub trait DriveActuator: Send {
    /// Set the speed used by subsequent motion primitives
    fn set_speed(&mut self, speed: Speed) -> Result<()>;

    fn forward(&mut self) -> Result<()>;

    fn backward(&mut self) -> Result<()>;

    fn turn_left(&mut self) -> Result<()>;

    fn turn_right(&mut self) -> Result<()>;

    /// Stop all motors
    fn stop(&mut self) -> Result<()>;

    fn forward_left(&mut self) -> Result<()> {
        Err(crate::Error::NotSupported(
            "Diagonal forward-left not supported".to_string(),
        ))
    }

    fn forward_right(&mut self) -> Result<()> {
        Err(crate::Error::NotSupported(
            "Diagonal forward-right not supported".to_string(),
        ))
    }

    fn backward_left(&mut self) -> Result<()> {
        Err(crate::Error::NotSupported(
            "Diagonal backward-left not supported".to_string(),
        ))
    }

    fn backward_right(&mut self) -> Result<()> {
        Err(crate::Error::NotSupported(
            "Diagonal backward-right not supported".to_string(),
        ))
    }

    /// Apply a decoded directive.
    ///
    /// Motions set the speed first; `Stop` stops regardless of speed and
    /// `Noop` leaves the drive untouched.
    fn apply(&mut self, directive: &ControlDirective) -> Result<()> {
        let motion: fn(&mut Self) -> Result<()> = match directive.action() {
            DriveAction::Noop => return Ok(()),
            DriveAction::Stop => return self.stop(),
            DriveAction::Forward => Self::forward,
            DriveAction::Backward => Self::backward,
            DriveAction::TurnLeft => Self::turn_left,
            DriveAction::TurnRight => Self::turn_right,
            DriveAction::DiagForwardLeft => Self::forward_left,
            DriveAction::DiagForwardRight => Self::forward_right,
            DriveAction::DiagBackwardLeft => Self::backward_left,
            DriveAction::DiagBackwardRight => Self::backward_right,
        };

        self.set_speed(directive.speed())?;
        motion(self)
    }
}
