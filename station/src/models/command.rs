//! Valve command model

use agrosmart_protocol::{CommandMessage, ACTION_ON};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::errors::StationError;
use crate::utils::{generate_uuid, short_hash};

/// Who asked for a command, or which component produced a decision record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Schedule,
    WeatherAi,
    Manual,
    System,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Schedule => "schedule",
            Origin::WeatherAi => "weather_ai",
            Origin::Manual => "manual",
            Origin::System => "system",
        }
    }
}

/// Valve action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open for the command's duration, or close when the duration is zero
    Activate,
}

impl Action {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Action::Activate => ACTION_ON,
        }
    }

    pub fn from_wire(action: &str) -> Result<Self, StationError> {
        match action {
            ACTION_ON => Ok(Action::Activate),
            other => Err(StationError::UnrecognizedAction(other.to_string())),
        }
    }
}

/// Who a command is for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addressing {
    Broadcast,
    Unicast(String),
}

impl Addressing {
    /// Resolve the optional wire field
    pub fn from_wire(device_id: Option<&str>) -> Self {
        match device_id {
            Some(id) => Addressing::Unicast(id.to_string()),
            None => Addressing::Broadcast,
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            Addressing::Broadcast => None,
            Addressing::Unicast(id) => Some(id),
        }
    }

    /// Whether a device with the given identity should act on the command
    pub fn accepts(&self, identity: &str) -> bool {
        match self {
            Addressing::Broadcast => true,
            Addressing::Unicast(id) => id == identity,
        }
    }
}

/// An addressed valve instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub target: Addressing,
    pub action: Action,
    /// Seconds; 0 means stop immediately
    pub duration_secs: u32,
    pub origin: Origin,
    pub command_id: Option<String>,
}

impl Command {
    pub fn activate(target: Addressing, duration_secs: u32, origin: Origin) -> Self {
        Self {
            target,
            action: Action::Activate,
            duration_secs,
            origin,
            command_id: None,
        }
    }

    pub fn with_command_id(mut self, command_id: impl Into<String>) -> Self {
        self.command_id = Some(command_id.into());
        self
    }

    /// Wire representation
    pub fn to_message(&self) -> CommandMessage {
        CommandMessage {
            device_id: self.target.device_id().map(str::to_string),
            action: self.action.as_wire().to_string(),
            duration: i64::from(self.duration_secs),
            origin: Some(self.origin.as_str().to_string()),
            command_id: self.command_id.clone(),
        }
    }
}

/// ID of the command a schedule produces at a local minute.
///
/// Stable for the same device, schedule and minute, so a re-evaluated minute
/// can be recognized as already dispatched.
pub fn scheduled_command_id(device_id: &str, schedule_id: &str, local_minute: &NaiveDateTime) -> String {
    let key = format!("{}:{}:{}", device_id, schedule_id, local_minute.format("%Y%m%d%H%M"));
    format!("sched-{}", short_hash(key.as_bytes()))
}

/// ID of a manual command; derived from the caller's idempotency key when given
pub fn manual_command_id(device_id: &str, idempotency_key: Option<&str>) -> String {
    match idempotency_key {
        Some(key) => format!("man-{}", short_hash(format!("{device_id}:{key}").as_bytes())),
        None => generate_uuid(),
    }
}
