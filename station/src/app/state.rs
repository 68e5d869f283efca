//! Application state management

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::app::options::ServerModeOptions;
use crate::dispatch::gateway::ManualGateway;
use crate::dispatch::publisher::CommandPublisher;
use crate::dispatch::transport::CommandTransport;
use crate::errors::StationError;
use crate::mqtt::topics::Topics;
use crate::recorder::HistoryRecorder;
use crate::scheduler::engine::{EngineDeps, SchedulerEngine};
use crate::storage::history::{FileHistoryStore, HistoryStore};
use crate::storage::schedules::{FileScheduleStore, ScheduleStore};
use crate::storage::telemetry::{FileTelemetryStore, TelemetryStore};
use crate::weather::forecast::{ForecastProvider, OpenMeteoClient};

/// Bound on a single history append
const HISTORY_APPEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Server-mode state shared by the workers and the HTTP handlers
pub struct AppState {
    pub topics: Topics,
    pub telemetry: Arc<dyn TelemetryStore>,
    pub history: Arc<dyn HistoryStore>,
    pub recorder: Arc<HistoryRecorder>,
    pub gateway: Arc<ManualGateway>,
    pub engine: Arc<SchedulerEngine>,
}

impl AppState {
    /// Wire the file-backed stores, the forecast client and the publisher
    /// on top of `transport`
    pub async fn init(
        options: &ServerModeOptions,
        transport: Arc<dyn CommandTransport>,
    ) -> Result<Self, StationError> {
        info!("Initializing application state...");

        options.storage.setup().await?;
        let schedules: Arc<dyn ScheduleStore> =
            Arc::new(FileScheduleStore::new(options.storage.schedules_file()));
        let telemetry: Arc<dyn TelemetryStore> =
            Arc::new(FileTelemetryStore::new(options.storage.telemetry_dir()));
        let history: Arc<dyn HistoryStore> =
            Arc::new(FileHistoryStore::new(options.storage.history_dir()));

        let forecast: Arc<dyn ForecastProvider> = Arc::new(OpenMeteoClient::new(
            &options.forecast_base_url,
            options.engine.forecast_timeout,
        )?);

        let topics = Topics::new(options.broker.topic_prefix.clone());
        let publisher = Arc::new(CommandPublisher::new(
            transport,
            topics.command(),
            options.publish_timeout,
        ));
        let recorder = Arc::new(HistoryRecorder::new(history.clone(), HISTORY_APPEND_TIMEOUT));
        let gateway = Arc::new(ManualGateway::new(
            publisher.clone(),
            options.manual_max_duration_secs,
        ));

        let engine = Arc::new(SchedulerEngine::new(
            options.engine.clone(),
            EngineDeps {
                schedules,
                telemetry: telemetry.clone(),
                forecast,
                publisher,
                recorder: recorder.clone(),
            },
        ));

        Ok(Self {
            topics,
            telemetry,
            history,
            recorder,
            gateway,
            engine,
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), StationError> {
        info!("Shutting down application state...");
        let dropped = self.recorder.dropped();
        if dropped > 0 {
            warn!("{} decision records were dropped during this run", dropped);
        }
        Ok(())
    }
}
