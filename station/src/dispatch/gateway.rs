//! Manual command gateway

use std::sync::Arc;

use agrosmart_protocol::{CommandRequest, CommandResponse};
use tracing::info;

use crate::dispatch::publisher::CommandPublisher;
use crate::errors::StationError;
use crate::models::command::{manual_command_id, Action, Addressing, Command, Origin};
use crate::models::device::validate_device_id;

/// Builds `manual` commands from HTTP requests and publishes them directly,
/// bypassing schedule evaluation and the weather policy.
pub struct ManualGateway {
    publisher: Arc<CommandPublisher>,
    max_duration_secs: u32,
}

impl ManualGateway {
    pub fn new(publisher: Arc<CommandPublisher>, max_duration_secs: u32) -> Self {
        Self {
            publisher,
            max_duration_secs,
        }
    }

    /// Validate a request into a unicast command
    pub fn build(&self, request: &CommandRequest, idempotency_key: Option<&str>) -> Result<Command, StationError> {
        let device_id = request
            .device_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StationError::ValidationError("device_id is required".to_string()))?;
        validate_device_id(device_id)?;

        let action = request
            .action
            .as_deref()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| StationError::ValidationError("action is required".to_string()))?;
        let action = Action::from_wire(action).map_err(|_| {
            StationError::ValidationError(format!("action must be \"{}\"", Action::Activate.as_wire()))
        })?;

        let duration = request.duration.unwrap_or(0);
        if duration < 0 {
            return Err(StationError::ValidationError("duration must not be negative".to_string()));
        }
        if duration > i64::from(self.max_duration_secs) {
            return Err(StationError::ValidationError(format!(
                "duration must be at most {} seconds",
                self.max_duration_secs
            )));
        }

        let command_id = manual_command_id(device_id, idempotency_key.filter(|k| !k.is_empty()));
        Ok(Command {
            target: Addressing::Unicast(device_id.to_string()),
            action,
            duration_secs: duration as u32,
            origin: Origin::Manual,
            command_id: Some(command_id),
        })
    }

    /// Validate and publish; returns once the broker link accepted the command
    pub async fn submit(
        &self,
        request: &CommandRequest,
        idempotency_key: Option<&str>,
    ) -> Result<CommandResponse, StationError> {
        let command = self.build(request, idempotency_key)?;
        self.publisher.publish(&command).await?;

        let target = command.target.device_id().unwrap_or_default().to_string();
        let command_id = command.command_id.unwrap_or_default();
        info!(device_id = %target, command_id = %command_id, "Manual command sent");

        Ok(CommandResponse {
            message: if command.duration_secs == 0 {
                "Stop command sent".to_string()
            } else {
                format!("Command sent: open for {} seconds", command.duration_secs)
            },
            target,
            command_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dispatch::transport::RecordingTransport;

    fn gateway() -> (ManualGateway, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let publisher = Arc::new(CommandPublisher::new(
            transport.clone(),
            "agrosmart/v5/command",
            Duration::from_secs(5),
        ));
        (ManualGateway::new(publisher, 900), transport)
    }

    fn request(device_id: Option<&str>, action: Option<&str>, duration: Option<i64>) -> CommandRequest {
        CommandRequest {
            device_id: device_id.map(str::to_string),
            action: action.map(str::to_string),
            duration,
        }
    }

    #[tokio::test]
    async fn test_submit_publishes_manual_unicast() {
        let (gateway, transport) = gateway();
        let response = gateway
            .submit(&request(Some("esp32-01"), Some("on"), Some(120)), None)
            .await
            .unwrap();

        assert_eq!(response.target, "esp32-01");
        let json = transport.published()[0].json();
        assert_eq!(json["device_id"], "esp32-01");
        assert_eq!(json["origin"], "manual");
        assert_eq!(json["duration"], 120);
        assert_eq!(json["command_id"], response.command_id.as_str());
    }

    #[tokio::test]
    async fn test_duration_defaults_to_stop() {
        let (gateway, transport) = gateway();
        gateway.submit(&request(Some("esp32-01"), Some("on"), None), None).await.unwrap();
        assert_eq!(transport.published()[0].json()["duration"], 0);
    }

    #[test]
    fn test_validation() {
        let (gateway, _) = gateway();
        let invalid = |r: CommandRequest| matches!(gateway.build(&r, None), Err(StationError::ValidationError(_)));

        assert!(invalid(request(None, Some("on"), Some(10))));
        assert!(invalid(request(Some(""), Some("on"), Some(10))));
        assert!(invalid(request(Some("esp32-01"), None, Some(10))));
        assert!(invalid(request(Some("esp32-01"), Some("off"), Some(10))));
        assert!(invalid(request(Some("esp32-01"), Some("on"), Some(-1))));
        assert!(invalid(request(Some("esp32-01"), Some("on"), Some(901))));
        assert!(invalid(request(Some("bad id!"), Some("on"), Some(10))));
        assert!(!invalid(request(Some("esp32-01"), Some("on"), Some(900))));
    }

    #[test]
    fn test_idempotency_key_fixes_command_id() {
        let (gateway, _) = gateway();
        let r = request(Some("esp32-01"), Some("on"), Some(60));
        let a = gateway.build(&r, Some("abc")).unwrap();
        let b = gateway.build(&r, Some("abc")).unwrap();
        assert_eq!(a.command_id, b.command_id);
        assert!(a.command_id.unwrap().starts_with("man-"));
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let (gateway, transport) = gateway();
        transport.set_offline(true);
        let result = gateway.submit(&request(Some("esp32-01"), Some("on"), Some(60)), None).await;
        assert!(matches!(result, Err(StationError::TransportError(_))));
    }
}
