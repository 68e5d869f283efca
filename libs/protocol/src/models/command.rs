//! Valve command payload published on `<prefix>/command`

use serde::{Deserialize, Serialize};

/// The only action a device acts on.
pub const ACTION_ON: &str = "on";

/// Command as it travels over the broker.
///
/// An absent `device_id` addresses every device listening on the topic.
/// `duration` is in seconds; `0` means stop immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    pub action: String,

    #[serde(default)]
    pub duration: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
}
