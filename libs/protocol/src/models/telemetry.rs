//! Sensor telemetry published by devices on `<prefix>/telemetry`

use serde::{Deserialize, Serialize};

/// One telemetry sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    pub device_id: String,

    /// Unix seconds, device clock
    pub timestamp: i64,

    pub sensors: SensorReadings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_count: Option<u64>,
}

/// Sensor block of a telemetry sample. Sensors a board lacks read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorReadings {
    pub air_temp: f64,
    pub air_humidity: f64,
    /// Percent, 0-100
    pub soil_moisture: f64,
    pub light_level: f64,
    pub rain_raw: f64,
    pub uv_index: f64,
}
