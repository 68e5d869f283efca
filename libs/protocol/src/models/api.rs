//! HTTP API models

use serde::{Deserialize, Serialize};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Manual command request.
///
/// Every field is optional on the wire so that missing fields surface as a
/// validation error rather than a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub device_id: Option<String>,

    #[serde(default)]
    pub action: Option<String>,

    #[serde(default)]
    pub duration: Option<i64>,
}

/// Manual command response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub message: String,
    pub target: String,
    pub command_id: String,
}

/// A page of newest-first items with an opaque continuation cursor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub count: usize,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, next_token: Option<String>) -> Self {
        Self {
            count: data.len(),
            data,
            next_token,
        }
    }
}

/// Error body returned with every non-2xx response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
