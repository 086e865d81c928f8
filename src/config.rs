//! Configuration for the rover bridge
//!
//! The settings record is a flat string-keyed, string-valued table (the
//! `[settings]` section of the TOML file). Bridge tunables live in typed
//! sections with defaults, so a file that only carries `[settings]` is
//! complete:
//!
//! ```toml
//! [settings]
//! MQTT_BROKER_C = "192.168.1.20"
//! MQTT_BROKER_PORT_C = "1883"
//! MQTT_USERNAME_C = "rover"
//! MQTT_PASSWORD_C = "rover"
//! ROVER_IDENTITY_C = "7"
//! ROVER_MQTT_QOS_C = "1"
//! USE_REDIRECTED_TOPICS_C = "0"
//!
//! [bridge]
//! cycle_interval_ms = 200
//! subscribe_max_attempts = 100
//!
//! [device]
//! kind = "sim"
//! sampling = "parallel"
//!
//! [link]
//! transport = "tcp"
//! ```

use crate::core::types::PublishMode;
use crate::error::{Error, Result};
use crate::link::QoS;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const KEY_BROKER_HOST: &str = "MQTT_BROKER_C";
pub const KEY_BROKER_PORT: &str = "MQTT_BROKER_PORT_C";
pub const KEY_USERNAME: &str = "MQTT_USERNAME_C";
pub const KEY_PASSWORD: &str = "MQTT_PASSWORD_C";
pub const KEY_ROVER_ID: &str = "ROVER_IDENTITY_C";
pub const KEY_QOS: &str = "ROVER_MQTT_QOS_C";
pub const KEY_REDIRECTED: &str = "USE_REDIRECTED_TOPICS_C";

/// Local service endpoint built from the process arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUri {
    pub port: u16,
    pub token: String,
}

impl ServiceUri {
    pub fn new(port: u16, token: impl Into<String>) -> Self {
        Self {
            port,
            token: token.into(),
        }
    }
}

impl fmt::Display for ServiceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "127.0.0.1:{}/api?token={}", self.port, self.token)
    }
}

/// String-keyed, string-valued settings record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value of a required key
    pub fn get(&self, key: &str) -> Result<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| Error::MissingSetting(key.to_string()))
    }

    /// Parse a required key, trimming surrounding whitespace
    pub fn parse<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let raw = self.get(key)?;
        raw.trim().parse().map_err(|e: T::Err| Error::InvalidSetting {
            key: key.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        })
    }

    /// Build from a TOML table, stringifying scalar values
    fn from_table(table: BTreeMap<String, toml::Value>) -> Result<Self> {
        let mut settings = Settings::new();
        for (key, value) in table {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => (b as i32).to_string(),
                other => {
                    return Err(Error::Config(format!(
                        "setting {} must be a scalar, got {}",
                        key,
                        other.type_str()
                    )));
                }
            };
            settings.insert(key, text);
        }
        Ok(settings)
    }
}

/// Broker and rover identity, parsed from [`Settings`]
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub rover_id: u32,
    pub qos: QoS,
    pub publish_mode: PublishMode,
}

impl BrokerConfig {
    /// Parse the settings record.
    ///
    /// Missing keys and non-numeric values where numbers are expected are
    /// startup errors.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let qos_level: u8 = settings.parse(KEY_QOS)?;
        let qos = QoS::try_from(qos_level).map_err(|reason| Error::InvalidSetting {
            key: KEY_QOS.to_string(),
            value: qos_level.to_string(),
            reason,
        })?;

        Ok(Self {
            host: settings.get(KEY_BROKER_HOST)?.trim().to_string(),
            port: settings.parse(KEY_BROKER_PORT)?,
            username: settings.get(KEY_USERNAME)?.to_string(),
            password: settings.get(KEY_PASSWORD)?.to_string(),
            rover_id: settings.parse(KEY_ROVER_ID)?,
            qos,
            publish_mode: PublishMode::from_flag(settings.parse(KEY_REDIRECTED)?),
        })
    }
}

/// Control loop and retry tunables (`[bridge]`)
#[derive(Debug, Clone, Deserialize)]
pub struct LoopConfig {
    /// Sleep between control cycles (milliseconds)
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,

    /// Subscription attempts before startup is abandoned
    #[serde(default = "default_subscribe_max_attempts")]
    pub subscribe_max_attempts: u32,

    /// Delay between subscription attempts (milliseconds)
    #[serde(default = "default_subscribe_backoff_ms")]
    pub subscribe_backoff_ms: u64,

    /// Connect attempts before giving up (absent = retry forever)
    #[serde(default)]
    pub connect_max_attempts: Option<u32>,

    /// Delay between connect attempts (milliseconds)
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,

    /// Log loop statistics every N cycles (0 = never)
    #[serde(default = "default_stats_every")]
    pub stats_every: u64,
}

fn default_cycle_interval_ms() -> u64 {
    200
}
fn default_subscribe_max_attempts() -> u32 {
    100
}
fn default_subscribe_backoff_ms() -> u64 {
    1
}
fn default_connect_backoff_ms() -> u64 {
    250
}
fn default_stats_every() -> u64 {
    50
}

impl LoopConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: default_cycle_interval_ms(),
            subscribe_max_attempts: default_subscribe_max_attempts(),
            subscribe_backoff_ms: default_subscribe_backoff_ms(),
            connect_max_attempts: None,
            connect_backoff_ms: default_connect_backoff_ms(),
            stats_every: default_stats_every(),
        }
    }
}

/// How the aggregator samples its sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    /// One source after another on the loop thread
    #[default]
    Sequential,
    /// One scoped thread per source, joined before the snapshot is built
    Parallel,
}

/// Sensor and actuator wiring (`[device]`)
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Device type identifier
    #[serde(default = "default_device_kind")]
    pub kind: String,

    #[serde(default)]
    pub sampling: SamplingMode,

    /// Report host core utilisation instead of the placeholder values
    #[serde(default = "default_true")]
    pub system_cores: bool,
}

fn default_device_kind() -> String {
    "sim".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            kind: default_device_kind(),
            sampling: SamplingMode::default(),
            system_cores: true,
        }
    }
}

/// Transport used for the command/telemetry channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Framed broker link over TCP
    #[default]
    Tcp,
    /// In-process channel (dry runs)
    Loopback,
}

/// Channel transport settings (`[link]`)
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    #[serde(default)]
    pub transport: TransportKind,

    /// Client identifier presented to the broker (default `rover_<id>_bridge`)
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Wait for ConnAck/SubAck (milliseconds)
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Bounded wait for a pending command each cycle (milliseconds)
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    2000
}
fn default_ack_timeout_ms() -> u64 {
    2000
}
fn default_poll_timeout_ms() -> u64 {
    1
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            client_id: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

/// On-disk layout of the configuration file
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    settings: BTreeMap<String, toml::Value>,
    #[serde(default)]
    bridge: LoopConfig,
    #[serde(default)]
    device: DeviceConfig,
    #[serde(default)]
    link: LinkConfig,
}

/// Complete bridge configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    pub bridge: LoopConfig,
    pub device: DeviceConfig,
    pub link: LinkConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// The service URI is only recorded in the log; the file is the source
    /// of the settings record.
    pub fn load<P: AsRef<Path>>(path: P, service: &ServiceUri) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading settings for service {}", service);
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::info!(
            "Loaded {} settings from {}",
            config.settings.len(),
            path.display()
        );
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)?;
        Ok(Self {
            settings: Settings::from_table(file.settings)?,
            bridge: file.bridge,
            device: file.device,
            link: file.link,
        })
    }

    /// Typed broker configuration
    pub fn broker(&self) -> Result<BrokerConfig> {
        BrokerConfig::from_settings(&self.settings)
    }
}
