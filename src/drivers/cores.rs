//! Core utilisation source trait

use crate::error::Result;

/// Per-core CPU utilisation source
pub trait CoreUtilization: Send {
    /// Utilisation of each core in percent, in core order
    fn read_utilization(&mut self) -> Result<Vec<f32>>;
}
