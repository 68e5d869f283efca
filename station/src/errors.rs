//! Error types for the AgroSmart station

use thiserror::Error;

/// Main error type for the AgroSmart station
#[derive(Error, Debug)]
pub enum StationError {
    /// Malformed or missing request fields. Surfaced to the caller, never retried.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Pagination cursor that was not issued by this service.
    #[error("Invalid next_token")]
    InvalidCursor,

    /// Publish/subscribe failure on the broker link.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The precipitation forecast could not be fetched in time.
    #[error("Forecast unavailable: {0}")]
    ForecastUnavailable(String),

    /// Schedule, telemetry or history store read/write failure.
    #[error("Store error: {0}")]
    StoreError(String),

    /// Command addressed to another device.
    #[error("Address mismatch: command for {target}, this device is {identity}")]
    AddressMismatch { target: String, identity: String },

    /// Command action other than "on".
    #[error("Unrecognized action: {0}")]
    UnrecognizedAction(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Hardware error: {0}")]
    HardwareError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for StationError {
    fn from(err: anyhow::Error) -> Self {
        StationError::Internal(err.to_string())
    }
}

impl From<rumqttc::ClientError> for StationError {
    fn from(err: rumqttc::ClientError) -> Self {
        StationError::TransportError(err.to_string())
    }
}
