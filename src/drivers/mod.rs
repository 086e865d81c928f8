//! Device driver traits
//!
//! Each sensor capability is its own trait so a deployment can supply any
//! subset of sources. Implementations are opaque read primitives returning
//! typed values.

pub mod compass;
pub mod cores;
pub mod drive;
pub mod imu;
pub mod infrared;
pub mod ultrasonic;

pub use compass::MagneticBearing;
pub use cores::CoreUtilization;
pub use drive::DriveActuator;
pub use imu::Inertial6Dof;
pub use infrared::{InfraredPosition, InfraredProximity};
pub use ultrasonic::{UltrasonicPosition, UltrasonicRange};
