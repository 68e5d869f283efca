//! Application configuration options

use std::time::Duration;

use crate::errors::StationError;
use crate::mqtt::client::MqttAddress;
use crate::models::device::validate_device_id;
use crate::scheduler::engine::EngineOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{MqttBrokerSettings, Settings};
use crate::utils::generate_uuid;
use crate::workers::{device, ingest, scheduler};

/// Lifecycle options shared by both run modes
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Upper bound of `limit` on list endpoints
    pub max_page_size: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_page_size: 200,
        }
    }
}

/// Broker connection shared by both run modes
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    pub address: MqttAddress,
    pub client_id: String,
    pub topic_prefix: String,
}

impl BrokerOptions {
    fn from_settings(settings: &MqttBrokerSettings, client_id: String) -> Result<Self, StationError> {
        if settings.host.is_empty() {
            return Err(StationError::ConfigError("mqtt_broker.host is required".to_string()));
        }
        Ok(Self {
            address: MqttAddress {
                host: settings.host.clone(),
                port: settings.port,
                use_tls: settings.tls,
                ca_cert_path: settings.ca_cert_path.clone(),
                username: settings.username.clone(),
                password: settings.password.clone(),
                keep_alive: Duration::from_secs(settings.keep_alive_secs),
            },
            client_id,
            topic_prefix: settings.topic_prefix.clone(),
        })
    }
}

/// Options of `agrosmart server`
#[derive(Debug, Clone)]
pub struct ServerModeOptions {
    pub lifecycle: LifecycleOptions,
    pub storage: StorageLayout,
    pub broker: BrokerOptions,
    pub server: ServerOptions,
    pub engine: EngineOptions,
    pub forecast_base_url: String,
    pub publish_timeout: Duration,
    pub manual_max_duration_secs: u32,
    pub scheduler_worker: scheduler::Options,
    pub ingest_worker: ingest::Options,
}

impl ServerModeOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self, StationError> {
        let server = &settings.server;
        if server.scheduler_period_secs == 0 {
            return Err(StationError::ConfigError(
                "server.scheduler_period_secs must be positive".to_string(),
            ));
        }

        let client_id = format!("agrosmart-server-{}", &generate_uuid()[..8]);
        let engine = EngineOptions {
            lookahead_hours: server.lookahead_hours,
            thresholds: server.weather,
            forecast_timeout: Duration::from_secs(server.forecast_timeout_secs),
            telemetry_max_age: Duration::from_secs(server.telemetry_max_age_secs),
            ..EngineOptions::new(server.utc_offset()?)
        };

        Ok(Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageLayout::new(settings.storage.base_dir.clone()),
            broker: BrokerOptions::from_settings(&settings.mqtt_broker, client_id)?,
            server: ServerOptions {
                host: server.http_host.clone(),
                port: server.http_port,
                max_page_size: server.max_page_size.max(1),
            },
            engine,
            forecast_base_url: server.forecast_base_url.clone(),
            publish_timeout: Duration::from_secs(server.publish_timeout_secs),
            manual_max_duration_secs: server.manual_max_duration_secs,
            scheduler_worker: scheduler::Options {
                period: Duration::from_secs(server.scheduler_period_secs),
                ..Default::default()
            },
            ingest_worker: ingest::Options::default(),
        })
    }
}

/// Options of `agrosmart device`
#[derive(Debug, Clone)]
pub struct DeviceModeOptions {
    pub lifecycle: LifecycleOptions,
    pub device_id: String,
    pub broker: BrokerOptions,
    pub valve_gpio_pin: Option<u32>,
    pub max_valve_duration_secs: u32,
    pub listener: device::Options,
}

impl DeviceModeOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self, StationError> {
        let device_id = settings
            .device
            .device_id
            .clone()
            .ok_or_else(|| StationError::ConfigError("device.device_id is required".to_string()))?;
        validate_device_id(&device_id).map_err(|e| StationError::ConfigError(e.to_string()))?;
        if settings.device.max_valve_duration_secs == 0 {
            return Err(StationError::ConfigError(
                "device.max_valve_duration_secs must be positive".to_string(),
            ));
        }

        let client_id = format!("agrosmart-device-{device_id}");
        Ok(Self {
            lifecycle: LifecycleOptions::default(),
            broker: BrokerOptions::from_settings(&settings.mqtt_broker, client_id)?,
            device_id,
            valve_gpio_pin: settings.device.valve_gpio_pin,
            max_valve_duration_secs: settings.device.max_valve_duration_secs,
            listener: device::Options::default(),
        })
    }
}
