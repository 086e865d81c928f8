//! Core data types for commands, directives and telemetry.
//!
//! Key types:
//! - [`RawCommand`]: One command unit as pulled from the command channel
//! - [`ControlDirective`]: Decoded, ready-to-apply actuator instruction
//! - [`SensorSnapshot`]: All sensor readings assembled in one cycle
//! - [`PublishMode`]: Which telemetry sink variant the process uses

use serde::{Deserialize, Serialize};

/// Highest speed the drive accepts (percent of full drive power)
pub const MAX_SPEED: u8 = 100;

/// Value a snapshot field holds until its source reports successfully
pub const SENSOR_UNSET: f32 = -1.0;

/// Number of infrared proximity sensors
pub const INFRARED_COUNT: usize = 4;

/// Number of core-utilisation readings in a snapshot
pub const CORE_COUNT: usize = 4;

/// Raw command as received on the driving topic
///
/// Wire form: `{"command":"W","speed":50}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCommand {
    /// Direction symbol (single character)
    pub command: char,
    /// Requested speed, not yet range checked
    pub speed: i32,
}

impl RawCommand {
    pub fn new(command: char, speed: i32) -> Self {
        Self { command, speed }
    }

    /// Parse a command payload
    pub fn from_json(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

/// Motion requested by a directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriveAction {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    DiagForwardLeft,
    DiagForwardRight,
    DiagBackwardLeft,
    DiagBackwardRight,
    /// Leave the actuator at its last commanded state
    Noop,
    Stop,
}

/// Drive speed clamped to `[0, MAX_SPEED]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Speed(u8);

impl Speed {
    pub const ZERO: Speed = Speed(0);
    pub const MAX: Speed = Speed(MAX_SPEED);

    /// Clamp an arbitrary integer into the safe range
    pub fn clamped(raw: i32) -> Self {
        Speed(raw.clamp(0, MAX_SPEED as i32) as u8)
    }

    #[inline]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for Speed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One decoded actuator instruction for one control cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlDirective {
    action: DriveAction,
    speed: Speed,
}

impl ControlDirective {
    pub fn new(action: DriveAction, speed: Speed) -> Self {
        Self { action, speed }
    }

    /// Directive that leaves the actuator untouched
    pub fn noop() -> Self {
        Self::new(DriveAction::Noop, Speed::ZERO)
    }

    #[inline]
    pub fn action(&self) -> DriveAction {
        self.action
    }

    #[inline]
    pub fn speed(&self) -> Speed {
        self.speed
    }

    /// Whether the actuator has to be driven for this directive
    #[inline]
    pub fn is_noop(&self) -> bool {
        self.action == DriveAction::Noop
    }
}

impl std::fmt::Display for ControlDirective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}@{}", self.action, self.speed)
    }
}

/// Telemetry sink variant, fixed for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// Telemetry goes to the broker-side redirected topic
    Redirected,
    /// Telemetry goes straight to the rover's own topic
    Direct,
}

impl PublishMode {
    /// Interpret the integer configuration flag (nonzero = redirected)
    pub fn from_flag(flag: i64) -> Self {
        if flag != 0 {
            PublishMode::Redirected
        } else {
            PublishMode::Direct
        }
    }
}

/// Accelerometer, gyroscope and integrated angles from the inertial unit
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InertialSample {
    pub accel: [f32; 3],
    pub gyro: [f32; 3],
    pub angle: [f32; 3],
}

/// Complete set of sensor readings assembled once per control cycle.
///
/// Every field starts at [`SENSOR_UNSET`] and is only overwritten by a
/// successful read in the current cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub ultrasonic_front: f32,
    pub ultrasonic_rear: f32,
    /// Index order: front-left, front-right, rear-left, rear-right
    pub infrared: [f32; INFRARED_COUNT],
    pub bearing: f32,
    pub accel_x: f32,
    pub accel_y: f32,
    pub accel_z: f32,
    pub gyro_x: f32,
    pub gyro_y: f32,
    pub gyro_z: f32,
    pub angle_x: f32,
    pub angle_y: f32,
    pub angle_z: f32,
    pub core: [f32; CORE_COUNT],
}

impl SensorSnapshot {
    /// Snapshot with every field at the sentinel
    pub fn unset() -> Self {
        Self {
            ultrasonic_front: SENSOR_UNSET,
            ultrasonic_rear: SENSOR_UNSET,
            infrared: [SENSOR_UNSET; INFRARED_COUNT],
            bearing: SENSOR_UNSET,
            accel_x: SENSOR_UNSET,
            accel_y: SENSOR_UNSET,
            accel_z: SENSOR_UNSET,
            gyro_x: SENSOR_UNSET,
            gyro_y: SENSOR_UNSET,
            gyro_z: SENSOR_UNSET,
            angle_x: SENSOR_UNSET,
            angle_y: SENSOR_UNSET,
            angle_z: SENSOR_UNSET,
            core: [SENSOR_UNSET; CORE_COUNT],
        }
    }

    pub fn set_inertial(&mut self, sample: &InertialSample) {
        [self.accel_x, self.accel_y, self.accel_z] = sample.accel;
        [self.gyro_x, self.gyro_y, self.gyro_z] = sample.gyro;
        [self.angle_x, self.angle_y, self.angle_z] = sample.angle;
    }

    /// Copy up to [`CORE_COUNT`] readings, leaving missing cores unset
    pub fn set_cores(&mut self, cores: &[f32]) {
        for (slot, value) in self.core.iter_mut().zip(cores) {
            *slot = *value;
        }
    }

    /// Telemetry payload
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self::unset()
    }
}
