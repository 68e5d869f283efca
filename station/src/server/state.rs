//! Server state

use std::sync::Arc;

use crate::dispatch::gateway::ManualGateway;
use crate::storage::history::HistoryStore;
use crate::storage::telemetry::TelemetryStore;

/// Server state shared across handlers
pub struct ServerState {
    pub telemetry: Arc<dyn TelemetryStore>,
    pub history: Arc<dyn HistoryStore>,
    pub gateway: Arc<ManualGateway>,
    /// Upper bound of `limit` on list endpoints
    pub max_page_size: usize,
}

impl ServerState {
    pub fn new(
        telemetry: Arc<dyn TelemetryStore>,
        history: Arc<dyn HistoryStore>,
        gateway: Arc<ManualGateway>,
        max_page_size: usize,
    ) -> Self {
        Self {
            telemetry,
            history,
            gateway,
            max_page_size,
        }
    }
}
