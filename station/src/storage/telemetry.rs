//! Telemetry store

use std::collections::HashMap;

use agrosmart_protocol::{Page, TelemetryMessage};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::errors::StationError;
use crate::filesys::dir::Dir;
use crate::storage::journal::Journal;
use crate::storage::page::paginate;

/// Parameters of a telemetry listing
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryQuery {
    pub device_id: String,
    pub limit: usize,
    pub next_token: Option<String>,
    /// Inclusive Unix-second range; `None` applies no time filter
    pub range: Option<(i64, i64)>,
}

impl TelemetryQuery {
    pub fn new(device_id: impl Into<String>, limit: usize) -> Self {
        Self {
            device_id: device_id.into(),
            limit,
            next_token: None,
            range: None,
        }
    }

    fn select(&self, mut samples: Vec<TelemetryMessage>) -> Result<Page<TelemetryMessage>, StationError> {
        if let Some((start, end)) = self.range {
            samples.retain(|s| (start..=end).contains(&s.timestamp));
        }
        paginate(samples, |s| s.timestamp, self.limit, self.next_token.as_deref())
    }
}

/// Time-ordered sensor history
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn append(&self, sample: &TelemetryMessage) -> Result<(), StationError>;

    /// Most recent sample by device timestamp
    async fn latest(&self, device_id: &str) -> Result<Option<TelemetryMessage>, StationError>;

    /// Newest-first page of samples
    async fn query(&self, query: &TelemetryQuery) -> Result<Page<TelemetryMessage>, StationError>;
}

/// Telemetry store backed by per-device JSON-lines files.
///
/// The newest sample of each device is kept in memory once a device has been
/// read, so the soil-moisture guard does not rescan the journal every cycle.
pub struct FileTelemetryStore {
    journal: Journal,
    latest: Mutex<HashMap<String, Option<TelemetryMessage>>>,
}

impl FileTelemetryStore {
    pub fn new(dir: Dir) -> Self {
        Self {
            journal: Journal::new(dir),
            latest: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TelemetryStore for FileTelemetryStore {
    async fn append(&self, sample: &TelemetryMessage) -> Result<(), StationError> {
        self.journal.append(&sample.device_id, sample).await?;

        // Devices not yet loaded pick the sample up from the journal later
        if let Some(cached) = self.latest.lock().await.get_mut(&sample.device_id) {
            if cached.as_ref().map_or(true, |c| sample.timestamp >= c.timestamp) {
                *cached = Some(sample.clone());
            }
        }
        Ok(())
    }

    async fn latest(&self, device_id: &str) -> Result<Option<TelemetryMessage>, StationError> {
        let mut cache = self.latest.lock().await;
        if let Some(cached) = cache.get(device_id) {
            return Ok(cached.clone());
        }

        let samples: Vec<TelemetryMessage> = self.journal.read_all(device_id).await?;
        let newest = samples.into_iter().max_by_key(|s| s.timestamp);
        cache.insert(device_id.to_string(), newest.clone());
        Ok(newest)
    }

    async fn query(&self, query: &TelemetryQuery) -> Result<Page<TelemetryMessage>, StationError> {
        let samples = self.journal.read_all(&query.device_id).await?;
        query.select(samples)
    }
}

/// In-memory telemetry store
#[derive(Debug, Default)]
pub struct MemoryTelemetryStore {
    samples: Mutex<HashMap<String, Vec<TelemetryMessage>>>,
}

impl MemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TelemetryStore for MemoryTelemetryStore {
    async fn append(&self, sample: &TelemetryMessage) -> Result<(), StationError> {
        self.samples
            .lock()
            .await
            .entry(sample.device_id.clone())
            .or_default()
            .push(sample.clone());
        Ok(())
    }

    async fn latest(&self, device_id: &str) -> Result<Option<TelemetryMessage>, StationError> {
        let samples = self.samples.lock().await;
        Ok(samples
            .get(device_id)
            .and_then(|s| s.iter().max_by_key(|s| s.timestamp))
            .cloned())
    }

    async fn query(&self, query: &TelemetryQuery) -> Result<Page<TelemetryMessage>, StationError> {
        let samples = self
            .samples
            .lock()
            .await
            .get(&query.device_id)
            .cloned()
            .unwrap_or_default();
        query.select(samples)
    }
}
