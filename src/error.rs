//! Error types for the rover bridge

use crate::connection::ConnectionError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Rover bridge error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Required configuration key is absent
    #[error("Missing setting: {0}")]
    MissingSetting(String),

    /// Configuration value could not be parsed
    #[error("Invalid setting {key}={value:?}: {reason}")]
    InvalidSetting {
        /// Settings key
        key: String,
        /// Raw value as loaded
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Malformed configuration file or section
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection lifecycle failure
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A single sensor source failed to report
    #[error("Sensor read failed ({source_name}): {reason}")]
    SensorRead {
        /// Source that failed (e.g. "bearing")
        source_name: &'static str,
        /// Driver-provided reason
        reason: String,
    },

    /// Device kind not known to this build
    #[error("Unknown device type: {0}")]
    UnknownDevice(String),

    /// Operation not supported by this driver
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures that must abort startup
    pub fn is_startup_config(&self) -> bool {
        matches!(
            self,
            Error::MissingSetting(_)
                | Error::InvalidSetting { .. }
                | Error::Config(_)
                | Error::UnknownDevice(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ChannelError;

    #[test]
    fn test_startup_config_errors() {
        assert!(Error::MissingSetting("rover_id".into()).is_startup_config());
        assert!(Error::UnknownDevice("lidar".into()).is_startup_config());
        assert!(!Error::NotSupported("forward_left".into()).is_startup_config());

        let exhausted = Error::from(ConnectionError::SubscriptionExhausted {
            attempts: 3,
            last: ChannelError::Timeout,
        });
        assert!(!exhausted.is_startup_config());
        assert!(exhausted.to_string().contains("3"));
    }
}
