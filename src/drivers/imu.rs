//! IMU driver trait

use crate::core::types::InertialSample;
use crate::error::Result;

/// Six-axis inertial unit with integrated orientation angles
pub trait Inertial6Dof: Send {
    /// Read accelerometer, gyroscope and integrated angles in one sample
    fn read_inertial(&mut self) -> Result<InertialSample>;
}
