//! Settings file management

use std::path::PathBuf;

use chrono::FixedOffset;
use secrecy::SecretString;
use serde::Deserialize;

use crate::errors::StationError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::storage::layout::StorageLayout;
use crate::weather::policy::RainThresholds;

/// Station settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Directory for a daily-rolling log file; stdout only when absent
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub storage: StorageSettings,

    /// MQTT broker configuration
    #[serde(default)]
    pub mqtt_broker: MqttBrokerSettings,

    /// Scheduler, gateway and telemetry API
    #[serde(default)]
    pub server: ServerSettings,

    /// Field device valve controller
    #[serde(default)]
    pub device: DeviceSettings,
}

impl Settings {
    /// Read and parse a settings file
    pub async fn load(file: &File) -> Result<Self, StationError> {
        file.read_json::<Settings>().await.map_err(|e| {
            StationError::ConfigError(format!(
                "Unable to read settings file {}: {e}",
                file.path().display()
            ))
        })
    }
}

fn default_true() -> bool {
    true
}

/// Storage settings
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

fn default_base_dir() -> PathBuf {
    StorageLayout::default().base_dir
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

/// MQTT broker settings
#[derive(Debug, Clone, Deserialize)]
pub struct MqttBrokerSettings {
    /// Broker host
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Use TLS
    #[serde(default = "default_true")]
    pub tls: bool,

    /// Optional path to a PEM-encoded CA certificate for broker TLS verification.
    /// When absent, the system certificate store is used.
    #[serde(default)]
    pub ca_cert_path: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<SecretString>,

    /// Prefix of the `telemetry` and `command` topics
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_mqtt_host() -> String {
    "".to_string()
}

fn default_mqtt_port() -> u16 {
    8883
}

fn default_topic_prefix() -> String {
    "agrosmart/v5".to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

impl Default for MqttBrokerSettings {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            tls: true,
            ca_cert_path: None,
            username: None,
            password: None,
            topic_prefix: default_topic_prefix(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

/// Server-side settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Scheduler tick period
    #[serde(default = "default_scheduler_period_secs")]
    pub scheduler_period_secs: u64,

    /// Offset of the stations' local time from UTC, in minutes
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,

    /// Open-Meteo compatible forecast endpoint
    #[serde(default = "default_forecast_base_url")]
    pub forecast_base_url: String,

    #[serde(default = "default_forecast_timeout_secs")]
    pub forecast_timeout_secs: u64,

    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,

    /// Forecast window length
    #[serde(default = "default_lookahead_hours")]
    pub lookahead_hours: usize,

    #[serde(default)]
    pub weather: RainThresholds,

    /// Longest duration accepted by `POST /command`
    #[serde(default = "default_max_duration_secs")]
    pub manual_max_duration_secs: u32,

    /// Upper bound of `limit` on list endpoints
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Telemetry older than this does not count for the soil-moisture guard
    #[serde(default = "default_telemetry_max_age_secs")]
    pub telemetry_max_age_secs: u64,
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_scheduler_period_secs() -> u64 {
    60
}

fn default_utc_offset_minutes() -> i32 {
    -180
}

fn default_forecast_base_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

fn default_forecast_timeout_secs() -> u64 {
    10
}

fn default_publish_timeout_secs() -> u64 {
    5
}

fn default_lookahead_hours() -> usize {
    6
}

fn default_max_duration_secs() -> u32 {
    900
}

fn default_max_page_size() -> usize {
    200
}

fn default_telemetry_max_age_secs() -> u64 {
    900
}

impl ServerSettings {
    /// Local timezone of the stations
    pub fn utc_offset(&self) -> Result<FixedOffset, StationError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            StationError::ConfigError(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            ))
        })
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_host: default_http_host(),
            http_port: default_http_port(),
            scheduler_period_secs: default_scheduler_period_secs(),
            utc_offset_minutes: default_utc_offset_minutes(),
            forecast_base_url: default_forecast_base_url(),
            forecast_timeout_secs: default_forecast_timeout_secs(),
            publish_timeout_secs: default_publish_timeout_secs(),
            lookahead_hours: default_lookahead_hours(),
            weather: RainThresholds::default(),
            manual_max_duration_secs: default_max_duration_secs(),
            max_page_size: default_max_page_size(),
            telemetry_max_age_secs: default_telemetry_max_age_secs(),
        }
    }
}

/// Field device settings
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSettings {
    /// Identity matched against unicast commands; required in device mode
    #[serde(default)]
    pub device_id: Option<String>,

    /// sysfs GPIO line driving the valve relay
    #[serde(default)]
    pub valve_gpio_pin: Option<u32>,

    /// Hard cap on any single activation
    #[serde(default = "default_max_duration_secs")]
    pub max_valve_duration_secs: u32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            device_id: None,
            valve_gpio_pin: None,
            max_valve_duration_secs: default_max_duration_secs(),
        }
    }
}
