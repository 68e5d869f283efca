//! AgroSmart wire protocol
//!
//! JSON shapes exchanged over MQTT between the server and field devices, and
//! the bodies of the HTTP surface consumed by the mobile app.

pub mod models;

pub use models::api::{CommandRequest, CommandResponse, ErrorBody, HealthResponse, Page, VersionResponse};
pub use models::command::{CommandMessage, ACTION_ON};
pub use models::telemetry::{SensorReadings, TelemetryMessage};
