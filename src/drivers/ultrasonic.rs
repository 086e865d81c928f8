//! Ultrasonic range driver trait

use crate::error::Result;

/// Mounting position of an ultrasonic ranger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UltrasonicPosition {
    Front,
    Rear,
}

impl UltrasonicPosition {
    pub const ALL: [UltrasonicPosition; 2] = [UltrasonicPosition::Front, UltrasonicPosition::Rear];

    pub fn name(self) -> &'static str {
        match self {
            UltrasonicPosition::Front => "ultrasonic_front",
            UltrasonicPosition::Rear => "ultrasonic_rear",
        }
    }
}

/// Ultrasonic range sensor driver trait
pub trait UltrasonicRange: Send {
    /// Read the range at the given position (centimeters)
    fn read_range(&mut self, position: UltrasonicPosition) -> Result<f32>;
}
