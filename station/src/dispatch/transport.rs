//! Command transport

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};

use crate::errors::StationError;

/// Publish side of the message broker
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Hand a payload to the broker link. Success means the link accepted it,
    /// not that any device received it.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), StationError>;

    /// Whether the broker link is currently up
    fn is_connected(&self) -> bool;
}

/// Broker link state shared between the event-loop worker and publishers
#[derive(Debug, Clone, Default)]
pub struct LinkState {
    connected: Arc<AtomicBool>,
}

impl LinkState {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// MQTT transport; commands go out with at-least-once delivery
pub struct MqttTransport {
    client: AsyncClient,
    link: LinkState,
}

impl MqttTransport {
    pub fn new(client: AsyncClient, link: LinkState) -> Self {
        Self { client, link }
    }
}

#[async_trait]
impl CommandTransport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), StationError> {
        if !self.link.is_connected() {
            return Err(StationError::TransportError("broker link is down".to_string()));
        }
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }
}

/// A published payload captured by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Published {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// Transport that keeps every publish in memory; can be switched offline or
/// made to reject publishes
#[derive(Debug, Default)]
pub struct RecordingTransport {
    published: Mutex<Vec<Published>>,
    offline: AtomicBool,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the link as down
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Keep the link up but reject every publish
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<Published> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandTransport for RecordingTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), StationError> {
        if self.offline.load(Ordering::SeqCst) || self.failing.load(Ordering::SeqCst) {
            return Err(StationError::TransportError("publish rejected".to_string()));
        }
        self.published
            .lock()
            .map_err(|_| StationError::Internal("recording lock poisoned".to_string()))?
            .push(Published {
                topic: topic.to_string(),
                payload,
            });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }
}
