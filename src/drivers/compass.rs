//! Compass driver trait

use crate::error::Result;

/// Magnetic bearing sensor driver trait
pub trait MagneticBearing: Send {
    /// Read the heading in degrees
    fn read_bearing(&mut self) -> Result<f32>;
}
