//! MQTT client implementation

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::errors::StationError;

/// MQTT broker address
#[derive(Debug, Clone)]
pub struct MqttAddress {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    /// Optional path to a PEM-encoded CA certificate for broker verification.
    /// When `None` and `use_tls` is `true`, the system certificate store is used.
    pub ca_cert_path: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub keep_alive: Duration,
}

impl Default for MqttAddress {
    fn default() -> Self {
        Self {
            host: "".to_string(),
            port: 8883,
            use_tls: true,
            ca_cert_path: None,
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
        }
    }
}

/// What one poll of the event loop produced
#[derive(Debug)]
pub enum MqttEvent {
    /// Broker accepted the connection; subscriptions must be (re)issued
    Connected,
    Message(MqttMessage),
    Other,
}

/// MQTT client wrapper
pub struct MqttClient {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttClient {
    /// Create a new MQTT client. Nothing is sent until the event loop is polled.
    pub fn new(address: &MqttAddress, client_id: &str) -> Result<Self, StationError> {
        if address.host.is_empty() {
            return Err(StationError::ConfigError("MQTT host is not configured".to_string()));
        }

        let mut options = MqttOptions::new(client_id, &address.host, address.port);
        options.set_keep_alive(address.keep_alive);

        if let Some(ref username) = address.username {
            let password = address
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_string())
                .unwrap_or_default();
            options.set_credentials(username, password);
        }

        if address.use_tls {
            use rumqttc::{TlsConfiguration, Transport};
            use rustls::ClientConfig;

            let mut root_cert_store = rustls::RootCertStore::empty();

            if let Some(ref ca_path) = address.ca_cert_path {
                let ca_pem = std::fs::read(ca_path).map_err(|e| {
                    StationError::ConfigError(format!("Failed to read CA cert {ca_path}: {e}"))
                })?;
                let mut cursor = std::io::Cursor::new(ca_pem);
                for cert in rustls_pemfile::certs(&mut cursor).flatten() {
                    let _ = root_cert_store.add(cert);
                }
            } else {
                for cert in rustls_native_certs::load_native_certs().unwrap_or_default() {
                    let _ = root_cert_store.add(cert);
                }
            }

            let client_config = ClientConfig::builder()
                .with_root_certificates(root_cert_store)
                .with_no_client_auth();

            options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
                Arc::new(client_config),
            )));
        }

        let (client, eventloop) = AsyncClient::new(options, 10);

        Ok(Self { client, eventloop })
    }

    /// Handle for publishing from other tasks
    pub fn handle(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Queue a subscription without waiting on the event loop.
    ///
    /// Called from inside the poll loop, where an awaiting send could block on
    /// a full request queue that only the poll loop drains.
    pub fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), StationError> {
        self.client.try_subscribe(topic, qos)?;
        info!("Subscribed to: {}", topic);
        Ok(())
    }

    /// Poll for events
    pub async fn poll(&mut self) -> Result<MqttEvent, StationError> {
        match self.eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!("Received message on topic: {}", publish.topic);
                Ok(MqttEvent::Message(MqttMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                }))
            }
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("MQTT connected");
                    Ok(MqttEvent::Connected)
                } else {
                    warn!("MQTT connection refused: {:?}", ack.code);
                    Err(StationError::TransportError(format!(
                        "connection refused: {:?}",
                        ack.code
                    )))
                }
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                debug!("Subscription acknowledged");
                Ok(MqttEvent::Other)
            }
            Ok(_) => Ok(MqttEvent::Other),
            Err(e) => Err(StationError::TransportError(e.to_string())),
        }
    }

    /// Disconnect from broker
    pub async fn disconnect(&mut self) -> Result<(), StationError> {
        self.client.disconnect().await?;
        info!("MQTT disconnected");
        Ok(())
    }
}

/// MQTT message
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl MqttMessage {
    /// Parse payload as JSON
    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T, StationError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}
