//! Server-side MQTT link: keeps the broker connection alive and ingests telemetry

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use agrosmart_protocol::TelemetryMessage;
use rumqttc::QoS;
use tracing::{debug, error, info, warn};

use crate::dispatch::transport::LinkState;
use crate::errors::StationError;
use crate::models::device::validate_device_id;
use crate::mqtt::client::{MqttClient, MqttEvent};
use crate::mqtt::topics::Topics;
use crate::storage::telemetry::TelemetryStore;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Ingest worker options
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Reconnect backoff
    pub cooldown: CooldownOptions,
}

/// Validate and store one telemetry payload
pub async fn ingest_telemetry(store: &dyn TelemetryStore, payload: &[u8]) -> Result<TelemetryMessage, StationError> {
    let sample: TelemetryMessage = serde_json::from_slice(payload)?;
    validate_device_id(&sample.device_id)?;
    store.append(&sample).await?;
    Ok(sample)
}

/// Run the ingest worker
pub async fn run<S, F>(
    options: &Options,
    mut client: MqttClient,
    topics: &Topics,
    link: &LinkState,
    telemetry: &dyn TelemetryStore,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("MQTT ingest worker starting...");
    let mut attempt = 0;

    loop {
        let event = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("MQTT ingest worker shutting down...");
                link.set_connected(false);
                if let Err(e) = client.disconnect().await {
                    debug!("MQTT disconnect failed: {}", e);
                }
                return;
            }
            event = client.poll() => event,
        };

        match event {
            Ok(MqttEvent::Connected) => {
                attempt = 0;
                link.set_connected(true);
                if let Err(e) = client.subscribe(&topics.telemetry(), QoS::AtMostOnce) {
                    error!("Failed to subscribe to telemetry: {}", e);
                }
            }
            Ok(MqttEvent::Message(msg)) if topics.is_telemetry_topic(&msg.topic) => {
                match ingest_telemetry(telemetry, &msg.payload).await {
                    Ok(sample) => debug!(device_id = %sample.device_id, timestamp = sample.timestamp, "Telemetry stored"),
                    Err(e) => warn!("Telemetry dropped: {}", e),
                }
            }
            Ok(_) => {}
            Err(e) => {
                link.set_connected(false);
                let delay = calc_exp_backoff(&options.cooldown, attempt);
                attempt = attempt.saturating_add(1);
                warn!("MQTT link error: {}, retrying in {:?}", e, delay);

                tokio::select! {
                    _ = &mut shutdown_signal => {
                        info!("MQTT ingest worker shutting down...");
                        return;
                    }
                    _ = sleep_fn(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::telemetry::{MemoryTelemetryStore, TelemetryQuery};

    #[tokio::test]
    async fn test_ingest_valid_sample() {
        let store = MemoryTelemetryStore::new();
        let payload = br#"{
            "device_id": "esp32-01",
            "timestamp": 1767614400,
            "sensors": {"air_temp": 24.5, "air_humidity": 61, "soil_moisture": 38.2,
                        "light_level": 880, "rain_raw": 4095, "uv_index": 3.1},
            "boot_count": 12
        }"#;

        let sample = ingest_telemetry(&store, payload).await.unwrap();
        assert_eq!(sample.sensors.soil_moisture, 38.2);

        let page = store.query(&TelemetryQuery::new("esp32-01", 50)).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.data[0].boot_count, Some(12));
    }

    #[tokio::test]
    async fn test_ingest_rejects_malformed() {
        let store = MemoryTelemetryStore::new();
        assert!(matches!(
            ingest_telemetry(&store, b"not json").await,
            Err(StationError::JsonError(_))
        ));
        assert!(matches!(
            ingest_telemetry(&store, br#"{"device_id":"../x","timestamp":1,"sensors":{}}"#).await,
            Err(StationError::ValidationError(_))
        ));
        assert!(store.latest("esp32-01").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_worker_future_can_be_spawned() {
        fn assert_send<T: Send>(_: &T) {}

        let address = crate::mqtt::client::MqttAddress {
            host: "localhost".to_string(),
            use_tls: false,
            ..Default::default()
        };
        let client = MqttClient::new(&address, "agrosmart-test").unwrap();
        let store = MemoryTelemetryStore::new();
        let topics = Topics::new("agrosmart/v5");
        let link = LinkState::default();

        let options = Options::default();

        let worker = run(
            &options,
            client,
            &topics,
            &link,
            &store,
            tokio::time::sleep,
            Box::pin(std::future::pending::<()>()),
        );
        assert_send(&worker);
    }
}
