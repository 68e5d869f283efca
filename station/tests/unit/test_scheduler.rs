//! Scheduler cycle: weather cancellation, fail-open, dispatch and records

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agrosmart::dispatch::publisher::CommandPublisher;
use agrosmart::dispatch::transport::RecordingTransport;
use agrosmart::errors::StationError;
use agrosmart::models::command::Origin;
use agrosmart::models::forecast::ForecastWindow;
use agrosmart::models::record::{ReasonCode, RecordType};
use agrosmart::models::schedule::{DeviceProfile, Location};
use agrosmart::recorder::HistoryRecorder;
use agrosmart::scheduler::engine::{EngineDeps, EngineOptions, SchedulerEngine};
use agrosmart::storage::history::MemoryHistoryStore;
use agrosmart::storage::schedules::{MemoryScheduleStore, ScheduleStore};
use agrosmart::storage::telemetry::{MemoryTelemetryStore, TelemetryStore};
use agrosmart::weather::forecast::ForecastProvider;
use agrosmart_protocol::TelemetryMessage;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde_json::json;
use tokio_test::assert_ok;

/// Forecast source returning a fixed answer and counting calls
struct FixedForecast {
    window: Option<Vec<(f64, f64)>>,
    calls: AtomicUsize,
}

impl FixedForecast {
    fn rain(pairs: &[(f64, f64)]) -> Arc<Self> {
        Arc::new(Self {
            window: Some(pairs.to_vec()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            window: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForecastProvider for FixedForecast {
    async fn fetch(&self, _location: Location, _hours: usize) -> Result<ForecastWindow, StationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.window {
            Some(pairs) => Ok(ForecastWindow::from_pairs(pairs)),
            None => Err(StationError::ForecastUnavailable("connection refused".to_string())),
        }
    }
}

struct Harness {
    engine: SchedulerEngine,
    transport: Arc<RecordingTransport>,
    history: Arc<MemoryHistoryStore>,
    telemetry: Arc<MemoryTelemetryStore>,
}

/// Schedule store whose profile reads fail for some devices
struct UnreadableProfiles {
    inner: MemoryScheduleStore,
    unreadable: Vec<String>,
}

#[async_trait]
impl ScheduleStore for UnreadableProfiles {
    async fn devices(&self) -> Result<Vec<String>, StationError> {
        self.inner.devices().await
    }

    async fn device_profile(&self, device_id: &str) -> Result<DeviceProfile, StationError> {
        if self.unreadable.iter().any(|id| id == device_id) {
            return Err(StationError::StoreError(format!("{device_id}: disk read failed")));
        }
        self.inner.device_profile(device_id).await
    }
}

fn harness(profiles: Vec<DeviceProfile>, forecast: Arc<FixedForecast>) -> Harness {
    harness_with_store(Arc::new(MemoryScheduleStore::new(profiles)), forecast)
}

fn harness_with_store(schedules: Arc<dyn ScheduleStore>, forecast: Arc<FixedForecast>) -> Harness {
    let transport = Arc::new(RecordingTransport::new());
    let history = Arc::new(MemoryHistoryStore::new());
    let telemetry = Arc::new(MemoryTelemetryStore::new());

    let publisher = Arc::new(CommandPublisher::new(
        transport.clone(),
        "agrosmart/v5/command",
        Duration::from_secs(5),
    ));
    let recorder = Arc::new(HistoryRecorder::new(history.clone(), Duration::from_secs(5)));

    let offset = FixedOffset::west_opt(3 * 3600).unwrap();
    let engine = SchedulerEngine::new(
        EngineOptions::new(offset),
        EngineDeps {
            schedules,
            telemetry: telemetry.clone(),
            forecast,
            publisher,
            recorder,
        },
    );

    Harness {
        engine,
        transport,
        history,
        telemetry,
    }
}

fn profile(device_id: &str, target: Option<f64>, schedules: serde_json::Value) -> DeviceProfile {
    serde_json::from_value::<DeviceProfile>(json!({
        "device_id": device_id,
        "target_soil_moisture": target,
        "schedules": schedules,
    }))
    .unwrap()
    .normalized()
}

/// Mon/Wed/Fri 06:00 local, 10 minutes
fn morning() -> serde_json::Value {
    json!({
        "id": "morning",
        "label": "Morning",
        "enabled": true,
        "days": [1, 3, 5],
        "time": "06:00",
        "duration_minutes": 10,
        "latitude": -23.55,
        "longitude": -46.63
    })
}

/// Monday 2026-01-05 at `hh:mm:ss` local time (UTC-3)
fn monday_local(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, hour + 3, minute, second).unwrap()
}

async fn store_moisture(telemetry: &MemoryTelemetryStore, device_id: &str, timestamp: i64, moisture: f64) {
    let sample: TelemetryMessage = serde_json::from_value(json!({
        "device_id": device_id,
        "timestamp": timestamp,
        "sensors": {"soil_moisture": moisture},
    }))
    .unwrap();
    telemetry.append(&sample).await.unwrap();
}

#[tokio::test]
async fn test_rain_forecast_cancels_watering() {
    let forecast = FixedForecast::rain(&[(0.6, 0.6), (0.1, 0.5)]);
    let h = harness(vec![profile("esp32-01", None, json!([morning()]))], forecast);

    let summary = h.engine.run_cycle(monday_local(6, 0, 1)).await.unwrap();
    assert_eq!(summary.due, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.executed, 0);
    assert!(h.transport.published().is_empty());

    let records = h.history.records("esp32-01").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record_type, RecordType::Skipped);
    assert_eq!(records[0].source, Origin::WeatherAi);
    assert_eq!(records[0].reason, Some(ReasonCode::RainForecast));
    assert_eq!(records[0].schedule_id.as_deref(), Some("morning"));
}

#[tokio::test]
async fn test_light_rain_dispatches_command() {
    let forecast = FixedForecast::rain(&[(0.6, 0.6)]);
    let h = harness(vec![profile("esp32-01", None, json!([morning()]))], forecast);

    let summary = h.engine.run_cycle(monday_local(6, 0, 1)).await.unwrap();
    assert_eq!(summary.executed, 1);

    let published = h.transport.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "agrosmart/v5/command");
    let command = published[0].json();
    assert_eq!(command["device_id"], "esp32-01");
    assert_eq!(command["action"], "on");
    assert_eq!(command["duration"], 600);
    assert_eq!(command["origin"], "schedule");

    let records = h.history.records("esp32-01").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record_type, RecordType::Execution);
    assert_eq!(records[0].source, Origin::Schedule);
    let command_id = records[0].command_id.clone().unwrap();
    assert!(command_id.starts_with("sched-"));
    assert_eq!(command["command_id"], command_id.as_str());
}

#[tokio::test]
async fn test_forecast_failure_fails_open() {
    let forecast = FixedForecast::failing();
    let h = harness(vec![profile("esp32-01", None, json!([morning()]))], forecast.clone());

    let summary = h.engine.run_cycle(monday_local(6, 0, 1)).await.unwrap();
    assert_eq!(forecast.calls(), 1);
    assert_eq!(summary.executed, 1);
    assert_eq!(summary.errors, 1);
    assert_eq!(h.transport.published().len(), 1);

    let records = h.history.records("esp32-01").await;
    let kinds: Vec<_> = records.iter().map(|r| (r.record_type, r.source)).collect();
    assert_eq!(
        kinds,
        vec![
            (RecordType::Error, Origin::WeatherAi),
            (RecordType::Execution, Origin::Schedule),
        ]
    );
    assert_eq!(records[0].reason, Some(ReasonCode::ForecastUnavailable));
}

#[tokio::test]
async fn test_empty_forecast_fails_open() {
    let forecast = FixedForecast::rain(&[]);
    let h = harness(vec![profile("esp32-01", None, json!([morning()]))], forecast);

    let summary = h.engine.run_cycle(monday_local(6, 0, 1)).await.unwrap();
    assert_eq!(summary.executed, 1);
    assert_eq!(summary.errors, 1);
}

#[tokio::test]
async fn test_only_due_schedules_evaluated() {
    let mut disabled = morning();
    disabled["id"] = "disabled".into();
    disabled["enabled"] = false.into();
    let mut weekend = morning();
    weekend["id"] = "weekend".into();
    weekend["days"] = json!([6, 7]);

    let forecast = FixedForecast::rain(&[(0.0, 0.0)]);
    let h = harness(
        vec![profile("esp32-01", None, json!([morning(), disabled, weekend]))],
        forecast.clone(),
    );

    // One minute late: nothing is due
    let summary = h.engine.run_cycle(monday_local(6, 1, 0)).await.unwrap();
    assert_eq!(summary.due, 0);

    let summary = h.engine.run_cycle(monday_local(6, 0, 30)).await.unwrap();
    assert_eq!(summary.due, 1);
    assert_eq!(forecast.calls(), 1);
    assert_eq!(h.transport.published().len(), 1);
}

#[tokio::test]
async fn test_same_minute_dispatched_once() {
    let forecast = FixedForecast::rain(&[(0.0, 0.0)]);
    let h = harness(vec![profile("esp32-01", None, json!([morning()]))], forecast);

    let first = assert_ok!(h.engine.run_cycle(monday_local(6, 0, 1)).await);
    assert_eq!(first.executed, 1);
    let second = assert_ok!(h.engine.run_cycle(monday_local(6, 0, 45)).await);

    assert_eq!(second.duplicates, 1);
    assert_eq!(second.executed, 0);
    assert_eq!(h.transport.published().len(), 1);
    assert_eq!(h.history.records("esp32-01").await.len(), 1);
}

#[tokio::test]
async fn test_schedules_in_same_minute_are_independent() {
    let mut evening_copy = morning();
    evening_copy["id"] = "second".into();
    evening_copy["duration_minutes"] = 5.into();

    let forecast = FixedForecast::rain(&[(0.0, 0.0)]);
    let h = harness(
        vec![profile("esp32-01", None, json!([morning(), evening_copy]))],
        forecast,
    );

    let summary = h.engine.run_cycle(monday_local(6, 0, 1)).await.unwrap();
    assert_eq!(summary.executed, 2);

    let published = h.transport.published();
    assert_eq!(published.len(), 2);
    assert_ne!(published[0].json()["command_id"], published[1].json()["command_id"]);
}

#[tokio::test]
async fn test_publish_failure_recorded_per_device() {
    let forecast = FixedForecast::rain(&[(0.0, 0.0)]);
    let h = harness(
        vec![
            profile("esp32-01", None, json!([morning()])),
            profile("esp32-02", None, json!([morning()])),
        ],
        forecast,
    );
    h.transport.set_failing(true);

    let summary = h.engine.run_cycle(monday_local(6, 0, 1)).await.unwrap();
    assert_eq!(summary.devices, 2);
    assert_eq!(summary.errors, 2);

    for device_id in ["esp32-01", "esp32-02"] {
        let records = h.history.records(device_id).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type, RecordType::Error);
        assert_eq!(records[0].reason, Some(ReasonCode::PublishFailed));
    }
}

#[tokio::test]
async fn test_broker_outage_aborts_cycle() {
    let forecast = FixedForecast::rain(&[(0.0, 0.0)]);
    let h = harness(vec![profile("esp32-01", None, json!([morning()]))], forecast.clone());
    h.transport.set_offline(true);

    let result = h.engine.run_cycle(monday_local(6, 0, 1)).await;
    assert!(matches!(result, Err(StationError::TransportError(_))));
    assert_eq!(forecast.calls(), 0);
    assert!(h.history.records("esp32-01").await.is_empty());

    // Recovered before the minute is over: the schedule was never claimed
    h.transport.set_offline(false);
    let summary = h.engine.run_cycle(monday_local(6, 0, 40)).await.unwrap();
    assert_eq!(summary.executed, 1);
}

#[tokio::test]
async fn test_soil_moisture_guard() {
    let now = monday_local(6, 0, 1);
    let forecast = FixedForecast::rain(&[(0.0, 0.0)]);
    let h = harness(
        vec![
            profile("wet", Some(40.0), json!([morning()])),
            profile("dry", Some(40.0), json!([morning()])),
            profile("stale", Some(40.0), json!([morning()])),
            profile("silent", Some(40.0), json!([morning()])),
        ],
        forecast.clone(),
    );
    store_moisture(&h.telemetry, "wet", now.timestamp() - 60, 45.0).await;
    store_moisture(&h.telemetry, "dry", now.timestamp() - 60, 31.5).await;
    store_moisture(&h.telemetry, "stale", now.timestamp() - 3_600, 10.0).await;

    let summary = h.engine.run_cycle(now).await.unwrap();
    assert_eq!(summary.executed, 1);
    assert_eq!(summary.skipped, 3);
    // Only the dry device got as far as the weather check
    assert_eq!(forecast.calls(), 1);

    let reason = |records: Vec<agrosmart::models::record::DecisionRecord>| records[0].reason;
    assert_eq!(reason(h.history.records("wet").await), Some(ReasonCode::SoilMoistureSufficient));
    assert_eq!(reason(h.history.records("dry").await), Some(ReasonCode::Dispatched));
    assert_eq!(reason(h.history.records("stale").await), Some(ReasonCode::TelemetryUnavailable));
    assert_eq!(reason(h.history.records("silent").await), Some(ReasonCode::TelemetryUnavailable));

    let published = h.transport.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].json()["device_id"], "dry");
}

#[tokio::test]
async fn test_unreadable_profile_isolated_to_its_device() {
    let forecast = FixedForecast::rain(&[(0.0, 0.0)]);
    let store = UnreadableProfiles {
        inner: MemoryScheduleStore::new(vec![
            profile("esp32-01", None, json!([morning()])),
            profile("esp32-02", None, json!([morning()])),
        ]),
        unreadable: vec!["esp32-02".to_string()],
    };
    let h = harness_with_store(Arc::new(store), forecast);

    let summary = h.engine.run_cycle(monday_local(6, 0, 1)).await.unwrap();
    assert_eq!(summary.executed, 1);
    assert_eq!(summary.errors, 1);

    let healthy = h.history.records("esp32-01").await;
    assert_eq!(healthy.len(), 1);
    assert_eq!(healthy[0].record_type, RecordType::Execution);

    let broken = h.history.records("esp32-02").await;
    assert_eq!(broken.len(), 1);
    assert_eq!(broken[0].record_type, RecordType::Error);
    assert_eq!(broken[0].source, Origin::System);
    assert_eq!(broken[0].reason, Some(ReasonCode::StoreUnavailable));

    let published = h.transport.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].json()["device_id"], "esp32-01");
}

#[tokio::test]
async fn test_invalid_schedule_recorded_once_and_others_run() {
    let forecast = FixedForecast::rain(&[(0.0, 0.0)]);
    let mut zero = morning();
    zero["id"] = json!("zero");
    zero["duration_minutes"] = json!(0);
    let partial = DeviceProfile::from_value(json!({
        "device_id": "esp32-02",
        "schedules": [zero, morning()],
    }))
    .unwrap();
    let h = harness(
        vec![profile("esp32-01", None, json!([morning()])), partial],
        forecast,
    );

    let summary = h.engine.run_cycle(monday_local(6, 0, 1)).await.unwrap();
    assert_eq!(summary.executed, 2);
    assert_eq!(summary.errors, 1);
    assert_eq!(h.transport.published().len(), 2);

    let records = h.history.records("esp32-02").await;
    let kinds: Vec<_> = records.iter().map(|r| (r.record_type, r.reason)).collect();
    assert_eq!(
        kinds,
        vec![
            (RecordType::Error, Some(ReasonCode::InvalidSchedule)),
            (RecordType::Execution, Some(ReasonCode::Dispatched)),
        ]
    );
    assert_eq!(records[0].schedule_id.as_deref(), Some("zero"));
    assert!(h.history.records("esp32-01").await.iter().all(|r| r.record_type == RecordType::Execution));

    // Still invalid on the next tick: not recorded again
    let summary = h.engine.run_cycle(monday_local(6, 1, 1)).await.unwrap();
    assert_eq!(summary.errors, 0);
    assert_eq!(h.history.records("esp32-02").await.len(), 2);
}
