//! Command publisher

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::dispatch::transport::CommandTransport;
use crate::errors::StationError;
use crate::models::command::Command;

/// Serializes commands onto the broker's command topic.
///
/// Fire-and-forget: success is the broker link accepting the payload within
/// the publish timeout. Device receipt is never awaited.
pub struct CommandPublisher {
    transport: Arc<dyn CommandTransport>,
    topic: String,
    timeout: Duration,
}

impl CommandPublisher {
    pub fn new(transport: Arc<dyn CommandTransport>, topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport,
            topic: topic.into(),
            timeout,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Publish one command; every failure surfaces as `TransportError`
    pub async fn publish(&self, command: &Command) -> Result<(), StationError> {
        let payload = serde_json::to_vec(&command.to_message())?;
        let target = command.target.device_id().unwrap_or("*");
        let command_id = command.command_id.as_deref().unwrap_or("-");

        let result = match tokio::time::timeout(self.timeout, self.transport.publish(&self.topic, payload)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(StationError::TransportError(e))) => Err(StationError::TransportError(e)),
            Ok(Err(e)) => Err(StationError::TransportError(e.to_string())),
            Err(_) => Err(StationError::TransportError(format!(
                "publish timed out after {:?}",
                self.timeout
            ))),
        };

        match &result {
            Ok(()) => info!(
                device_id = target,
                command_id,
                topic = %self.topic,
                duration = command.duration_secs,
                origin = command.origin.as_str(),
                "Command published"
            ),
            Err(e) => warn!(
                device_id = target,
                command_id,
                topic = %self.topic,
                "Command publish failed: {}",
                e
            ),
        }
        result
    }
}
