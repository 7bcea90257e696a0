//! Process configuration.
//!
//! Settings are read from a YAML file and may be overridden from the
//! environment (`MODBUS_TO_MQTT__FIELDBUS__SCAN_TIME=50`, ...).
//!
//! ```yaml
//! log_level: INFO
//! mqtt:
//!   address: 127.0.0.1
//!   port: 1883
//!   repeat_time: 60000
//!   main_topic: modbus-to-mqtt
//! fieldbus:
//!   address: 192.168.1.10
//!   scan_time: 100
//!   long_press_time: 1000
//!   read:
//!     - type: coil
//!       start: 0
//!       count: 8
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default locations searched when no path is given on the command line.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["config.yaml", "/modbus-to-mqtt/config.yaml"];

/// Environment prefix for overrides.
const ENV_PREFIX: &str = "MODBUS_TO_MQTT";

/// Maximum number of bits a single Modbus read request may cover.
pub const MAX_BITS_PER_READ: u16 = 2000;

/// Log verbosity as written in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
    Fatal,
}

impl LogLevel {
    /// The `tracing` filter directive for this level.
    ///
    /// `tracing` has no level above ERROR, so CRITICAL and FATAL collapse onto it.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Critical | LogLevel::Fatal => "error",
        }
    }
}

/// Which Modbus table a block is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Coil,
    DiscreteInput,
}

impl std::fmt::Display for InputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputKind::Coil => f.write_str("coil"),
            InputKind::DiscreteInput => f.write_str("discrete_input"),
        }
    }
}

/// One contiguous range of inputs to monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSettings {
    #[serde(rename = "type")]
    pub kind: InputKind,
    pub start: u16,
    pub count: u16,
}

/// Field device connection and scan timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldbusSettings {
    pub address: String,
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    pub read: Vec<BlockSettings>,
    /// Scan period in milliseconds.
    pub scan_time: u64,
    /// Long-press duration in milliseconds.
    pub long_press_time: u64,
    /// Per-block read timeout in milliseconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
}

/// Broker connection and topic layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSettings {
    pub address: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Status republish interval in milliseconds.
    pub repeat_time: u64,
    #[serde(default = "default_main_topic")]
    pub main_topic: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Keep-alive in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u64,
    /// Lower reconnect backoff bound in milliseconds.
    #[serde(default = "default_reconnect_min")]
    pub reconnect_min: u64,
    /// Upper reconnect backoff bound in milliseconds.
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max: u64,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,
    pub mqtt: MqttSettings,
    pub fieldbus: FieldbusSettings,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_read_timeout() -> u64 {
    1000
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_main_topic() -> String {
    "modbus-to-mqtt".to_string()
}

fn default_client_id() -> String {
    "modbus-to-mqtt".to_string()
}

fn default_keep_alive() -> u64 {
    30
}

fn default_reconnect_min() -> u64 {
    500
}

fn default_reconnect_max() -> u64 {
    30_000
}

impl Settings {
    /// Load from an explicit path, or from the first default location that exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::locate()?,
        };

        let settings: Settings = Config::builder()
            .add_source(File::from(path.as_path()))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn locate() -> Result<PathBuf, ConfigError> {
        let candidates: Vec<PathBuf> = DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect();
        candidates
            .iter()
            .find(|p| p.is_file())
            .cloned()
            .ok_or(ConfigError::NotFound(candidates))
    }

    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fb = &self.fieldbus;
        if fb.scan_time == 0 {
            return Err(invalid("fieldbus.scan_time must be greater than zero"));
        }
        if fb.long_press_time == 0 {
            return Err(invalid(
                "fieldbus.long_press_time must be greater than zero",
            ));
        }
        if fb.read_timeout == 0 {
            return Err(invalid("fieldbus.read_timeout must be greater than zero"));
        }
        if fb.read.is_empty() {
            return Err(invalid("fieldbus.read must list at least one block"));
        }
        for (i, block) in fb.read.iter().enumerate() {
            if block.count == 0 {
                return Err(invalid(format!(
                    "fieldbus.read[{i}].count must be greater than zero"
                )));
            }
            if block.count > MAX_BITS_PER_READ {
                return Err(invalid(format!(
                    "fieldbus.read[{i}].count exceeds the {MAX_BITS_PER_READ}-bit read limit"
                )));
            }
            if u32::from(block.start) + u32::from(block.count) > u32::from(u16::MAX) + 1 {
                return Err(invalid(format!(
                    "fieldbus.read[{i}] runs past the end of the address space"
                )));
            }
        }

        let mqtt = &self.mqtt;
        if mqtt.repeat_time == 0 {
            return Err(invalid("mqtt.repeat_time must be greater than zero"));
        }
        if mqtt.main_topic.trim_matches('/').is_empty() {
            return Err(invalid("mqtt.main_topic must not be empty"));
        }
        if mqtt.reconnect_min == 0 || mqtt.reconnect_min > mqtt.reconnect_max {
            return Err(invalid(
                "mqtt.reconnect_min must be positive and not exceed mqtt.reconnect_max",
            ));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

impl FieldbusSettings {
    /// The scan/long-press pair the detectors derive their depth from.
    pub fn timing(&self) -> Timing {
        Timing {
            scan_period: Duration::from_millis(self.scan_time),
            long_press: Duration::from_millis(self.long_press_time),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout)
    }
}

impl MqttSettings {
    pub fn repeat_interval(&self) -> Duration {
        Duration::from_millis(self.repeat_time)
    }

    /// Topic prefix with any trailing slash removed.
    pub fn topic_prefix(&self) -> &str {
        self.main_topic.trim_end_matches('/')
    }
}

/// Scan cadence and long-press duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub scan_period: Duration,
    pub long_press: Duration,
}

impl Timing {
    pub fn from_millis(scan_period: u64, long_press: u64) -> Self {
        Self {
            scan_period: Duration::from_millis(scan_period),
            long_press: Duration::from_millis(long_press),
        }
    }

    /// Number of consecutive scans that make up a long press, never less than one.
    pub fn debounce_depth(&self) -> usize {
        let scan = self.scan_period.as_millis().max(1);
        let long = self.long_press.as_millis();
        (long.div_ceil(scan) as usize).max(1)
    }

    pub fn scan_period_ms(&self) -> f64 {
        self.scan_period.as_secs_f64() * 1000.0
    }
}
