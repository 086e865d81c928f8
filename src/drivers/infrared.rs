//! Infrared proximity driver trait

use crate::error::Result;

/// Infrared sensor position, in snapshot index order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfraredPosition {
    FrontLeft = 0,
    FrontRight = 1,
    RearLeft = 2,
    RearRight = 3,
}

impl InfraredPosition {
    pub const ALL: [InfraredPosition; 4] = [
        InfraredPosition::FrontLeft,
        InfraredPosition::FrontRight,
        InfraredPosition::RearLeft,
        InfraredPosition::RearRight,
    ];

    /// Index into `SensorSnapshot::infrared`
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            InfraredPosition::FrontLeft => "infrared_front_left",
            InfraredPosition::FrontRight => "infrared_front_right",
            InfraredPosition::RearLeft => "infrared_rear_left",
            InfraredPosition::RearRight => "infrared_rear_right",
        }
    }
}

/// Infrared proximity sensor driver trait
pub trait InfraredProximity: Send {
    /// Read the proximity value at the given position
    fn read_proximity(&mut self, position: InfraredPosition) -> Result<f32>;
}
