//! Decision history store

use std::collections::HashMap;

use agrosmart_protocol::Page;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::errors::StationError;
use crate::filesys::dir::Dir;
use crate::models::record::DecisionRecord;
use crate::storage::journal::Journal;
use crate::storage::page::paginate;

/// Append-only log of decision records, keyed by device
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: &DecisionRecord) -> Result<(), StationError>;

    /// Newest-first page of a device's records
    async fn list(
        &self,
        device_id: &str,
        limit: usize,
        next_token: Option<&str>,
    ) -> Result<Page<DecisionRecord>, StationError>;
}

fn record_key(record: &DecisionRecord) -> i64 {
    record.timestamp.timestamp_millis()
}

/// History store backed by per-device JSON-lines files
pub struct FileHistoryStore {
    journal: Journal,
}

impl FileHistoryStore {
    pub fn new(dir: Dir) -> Self {
        Self {
            journal: Journal::new(dir),
        }
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn append(&self, record: &DecisionRecord) -> Result<(), StationError> {
        self.journal.append(&record.device_id, record).await
    }

    async fn list(
        &self,
        device_id: &str,
        limit: usize,
        next_token: Option<&str>,
    ) -> Result<Page<DecisionRecord>, StationError> {
        let records = self.journal.read_all(device_id).await?;
        paginate(records, record_key, limit, next_token)
    }
}

/// In-memory history store
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: Mutex<HashMap<String, Vec<DecisionRecord>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record of a device in append order
    pub async fn records(&self, device_id: &str) -> Vec<DecisionRecord> {
        self.records
            .lock()
            .await
            .get(device_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, record: &DecisionRecord) -> Result<(), StationError> {
        self.records
            .lock()
            .await
            .entry(record.device_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn list(
        &self,
        device_id: &str,
        limit: usize,
        next_token: Option<&str>,
    ) -> Result<Page<DecisionRecord>, StationError> {
        paginate(self.records(device_id).await, record_key, limit, next_token)
    }
}
