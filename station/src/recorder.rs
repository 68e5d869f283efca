//! Best-effort decision history recorder

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::errors::StationError;
use crate::models::record::DecisionRecord;
use crate::storage::history::HistoryStore;

/// Appends decision records to the history store without ever failing the caller.
///
/// A failed append is retried once. If the retry fails too, the record is
/// written to the process log instead and counted as dropped.
pub struct HistoryRecorder {
    store: Arc<dyn HistoryStore>,
    append_timeout: Duration,
    dropped: AtomicU64,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn HistoryStore>, append_timeout: Duration) -> Self {
        Self {
            store,
            append_timeout,
            dropped: AtomicU64::new(0),
        }
    }

    /// Records that reached neither the store nor its retry
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn record(&self, record: DecisionRecord) {
        let first = match self.append(&record).await {
            Ok(()) => {
                debug!(device_id = %record.device_id, record_type = ?record.record_type, "Decision recorded");
                return;
            }
            Err(e) => e,
        };
        warn!(device_id = %record.device_id, "History append failed, retrying: {}", first);

        if let Err(second) = self.append(&record).await {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            let json = serde_json::to_string(&record).unwrap_or_else(|_| format!("{record:?}"));
            error!(
                device_id = %record.device_id,
                dropped_total = total,
                record = %json,
                "History append failed twice, record dropped: {}",
                second
            );
        }
    }

    async fn append(&self, record: &DecisionRecord) -> Result<(), StationError> {
        tokio::time::timeout(self.append_timeout, self.store.append(record))
            .await
            .map_err(|_| StationError::StoreError("history append timed out".to_string()))?
    }
}
