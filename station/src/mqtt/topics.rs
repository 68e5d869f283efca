//! MQTT topic definitions

/// Default topic prefix shared by the server and the devices
pub const DEFAULT_PREFIX: &str = "agrosmart/v5";

/// MQTT topic patterns under one prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Sensor samples, device to server, QoS 0
    pub fn telemetry(&self) -> String {
        format!("{}/telemetry", self.prefix)
    }

    /// Valve commands, server to devices, QoS 1
    pub fn command(&self) -> String {
        format!("{}/command", self.prefix)
    }

    /// Check if topic is the telemetry topic
    pub fn is_telemetry_topic(&self, topic: &str) -> bool {
        topic == self.telemetry()
    }

    /// Check if topic is the command topic
    pub fn is_command_topic(&self, topic: &str) -> bool {
        topic == self.command()
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}
