//! Decision records written to the device history log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::command::Origin;

/// Outcome kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Execution,
    Skipped,
    Error,
}

/// Machine-readable reason attached to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Dispatched,
    RainForecast,
    ForecastUnavailable,
    SoilMoistureSufficient,
    TelemetryUnavailable,
    PublishFailed,
    StoreUnavailable,
    InvalidSchedule,
}

/// One immutable scheduling outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub device_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,

    /// Server clock
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "type")]
    pub record_type: RecordType,

    pub source: Origin,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
}

impl DecisionRecord {
    pub fn new(
        record_type: RecordType,
        source: Origin,
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            schedule_id: None,
            timestamp,
            record_type,
            source,
            message: message.into(),
            details: None,
            command_id: None,
            reason: None,
        }
    }

    pub fn for_schedule(mut self, schedule_id: impl Into<String>) -> Self {
        self.schedule_id = Some(schedule_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_command_id(mut self, command_id: impl Into<String>) -> Self {
        self.command_id = Some(command_id.into());
        self
    }

    pub fn with_reason(mut self, reason: ReasonCode) -> Self {
        self.reason = Some(reason);
        self
    }
}
