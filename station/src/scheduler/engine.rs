//! One scheduling cycle: due schedules, guards, dispatch and records

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::dispatch::publisher::CommandPublisher;
use crate::errors::StationError;
use crate::models::command::{scheduled_command_id, Addressing, Command, Origin};
use crate::models::forecast::ForecastWindow;
use crate::models::record::{DecisionRecord, ReasonCode, RecordType};
use crate::models::schedule::{DeviceProfile, Schedule};
use crate::recorder::HistoryRecorder;
use crate::scheduler::evaluator::due_schedules;
use crate::scheduler::ledger::DispatchLedger;
use crate::storage::schedules::ScheduleStore;
use crate::storage::telemetry::TelemetryStore;
use crate::weather::forecast::ForecastProvider;
use crate::weather::policy::{evaluate, RainThresholds};

/// Scheduling engine options
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Local timezone of the stations
    pub utc_offset: FixedOffset,

    /// Forecast window length in hours
    pub lookahead_hours: usize,

    pub thresholds: RainThresholds,

    /// Bound on one forecast fetch
    pub forecast_timeout: Duration,

    /// Telemetry older than this does not count for the soil-moisture guard
    pub telemetry_max_age: Duration,
}

impl EngineOptions {
    /// Defaults for stations at `utc_offset`
    pub fn new(utc_offset: FixedOffset) -> Self {
        Self {
            utc_offset,
            lookahead_hours: 6,
            thresholds: RainThresholds::default(),
            forecast_timeout: Duration::from_secs(10),
            telemetry_max_age: Duration::from_secs(900),
        }
    }
}

/// Outcome counts of one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub devices: usize,
    pub due: usize,
    pub executed: usize,
    pub skipped: usize,
    /// Error records written, including fail-open forecast errors
    pub errors: usize,
    /// Due schedules already handled earlier in the same minute
    pub duplicates: usize,
}

/// Collaborators of the engine
pub struct EngineDeps {
    pub schedules: Arc<dyn ScheduleStore>,
    pub telemetry: Arc<dyn TelemetryStore>,
    pub forecast: Arc<dyn ForecastProvider>,
    pub publisher: Arc<CommandPublisher>,
    pub recorder: Arc<HistoryRecorder>,
}

/// Server-side decision loop body.
///
/// Every per-device and per-schedule failure is turned into an `error`
/// record; only a broker outage or an unreadable device list fails a cycle.
pub struct SchedulerEngine {
    options: EngineOptions,
    deps: EngineDeps,
    ledger: Mutex<DispatchLedger>,
    /// Invalid stored schedules already written to history, so each is
    /// recorded once rather than every cycle
    reported_rejections: Mutex<HashSet<String>>,
}

/// Evaluation context of one due schedule
struct Due<'a> {
    profile: &'a DeviceProfile,
    schedule: &'a Schedule,
    command_id: String,
    now: DateTime<Utc>,
}

impl Due<'_> {
    fn record(&self, record_type: RecordType, source: Origin, reason: ReasonCode, message: String) -> DecisionRecord {
        DecisionRecord::new(record_type, source, &self.profile.device_id, self.now, message)
            .for_schedule(&self.schedule.id)
            .with_reason(reason)
    }
}

impl SchedulerEngine {
    pub fn new(options: EngineOptions, deps: EngineDeps) -> Self {
        Self {
            options,
            deps,
            ledger: Mutex::new(DispatchLedger::new()),
            reported_rejections: Mutex::new(HashSet::new()),
        }
    }

    /// Run one cycle at `now`
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleSummary, StationError> {
        if !self.deps.publisher.is_connected() {
            return Err(StationError::TransportError(
                "broker link is down, skipping cycle".to_string(),
            ));
        }

        let local = now.with_timezone(&self.options.utc_offset);
        let devices = self.deps.schedules.devices().await?;
        let mut summary = CycleSummary {
            devices: devices.len(),
            ..Default::default()
        };
        let mut rejections = HashSet::new();

        for device_id in devices {
            let profile = match self.deps.schedules.device_profile(&device_id).await {
                Ok(profile) => profile,
                Err(e) => {
                    error!(device_id = %device_id, "Unable to load schedules: {}", e);
                    summary.errors += 1;
                    self.deps
                        .recorder
                        .record(
                            DecisionRecord::new(
                                RecordType::Error,
                                Origin::System,
                                &device_id,
                                now,
                                format!("Unable to load schedules: {e}"),
                            )
                            .with_reason(ReasonCode::StoreUnavailable),
                        )
                        .await;
                    continue;
                }
            };

            self.report_rejections(&profile, now, &mut rejections, &mut summary)
                .await?;

            for schedule in due_schedules(&local, &profile.schedules) {
                summary.due += 1;
                let due = Due {
                    profile: &profile,
                    schedule,
                    command_id: scheduled_command_id(&profile.device_id, &schedule.id, &local.naive_local()),
                    now,
                };

                if !self.claim(&local.naive_local(), &due.command_id)? {
                    debug!(
                        device_id = %profile.device_id,
                        schedule_id = %schedule.id,
                        command_id = %due.command_id,
                        "Already handled this minute"
                    );
                    summary.duplicates += 1;
                    continue;
                }

                self.evaluate(&due, &mut summary).await;
            }
        }

        *self.reported_rejections.lock().map_err(|_| {
            StationError::Internal("rejection set lock poisoned".to_string())
        })? = rejections;

        info!(
            devices = summary.devices,
            due = summary.due,
            executed = summary.executed,
            skipped = summary.skipped,
            errors = summary.errors,
            duplicates = summary.duplicates,
            "Scheduler cycle complete"
        );
        Ok(summary)
    }

    /// Write one `error` record per invalid stored schedule the first time
    /// it is seen; `seen` collects this cycle's rejections
    async fn report_rejections(
        &self,
        profile: &DeviceProfile,
        now: DateTime<Utc>,
        seen: &mut HashSet<String>,
        summary: &mut CycleSummary,
    ) -> Result<(), StationError> {
        for rejected in &profile.rejected {
            let schedule_id = rejected.id.as_deref().unwrap_or("?");
            let key = format!("{}:{}:{}", profile.device_id, schedule_id, rejected.reason);
            let known = self
                .reported_rejections
                .lock()
                .map_err(|_| StationError::Internal("rejection set lock poisoned".to_string()))?
                .contains(&key);
            seen.insert(key);
            if known {
                continue;
            }

            summary.errors += 1;
            let mut record = DecisionRecord::new(
                RecordType::Error,
                Origin::System,
                &profile.device_id,
                now,
                format!("Invalid schedule ignored: {}", rejected.reason),
            )
            .with_reason(ReasonCode::InvalidSchedule);
            if let Some(id) = &rejected.id {
                record = record.for_schedule(id);
            }
            self.deps.recorder.record(record).await;
        }
        Ok(())
    }

    fn claim(&self, local: &NaiveDateTime, command_id: &str) -> Result<bool, StationError> {
        let mut ledger = self
            .ledger
            .lock()
            .map_err(|_| StationError::Internal("dispatch ledger lock poisoned".to_string()))?;
        Ok(ledger.claim(local, command_id))
    }

    async fn evaluate(&self, due: &Due<'_>, summary: &mut CycleSummary) {
        if let Some(record) = self.soil_guard(due).await {
            summary.skipped += 1;
            self.deps.recorder.record(record).await;
            return;
        }

        // Forecast: fail open on any fetch problem
        let mut forecast_details = None;
        match self.fetch_forecast(due).await {
            Ok(window) => {
                let decision = evaluate(&window, &self.options.thresholds);
                if decision.cancel {
                    info!(
                        device_id = %due.profile.device_id,
                        schedule_id = %due.schedule.id,
                        total_mm = decision.total_mm,
                        "Watering cancelled, rain expected"
                    );
                    summary.skipped += 1;
                    let record = due
                        .record(
                            RecordType::Skipped,
                            Origin::WeatherAi,
                            ReasonCode::RainForecast,
                            format!(
                                "Cancelled \"{}\": {:.1} mm of rain expected in the next {} hours",
                                due.schedule.label, decision.total_mm, self.options.lookahead_hours
                            ),
                        )
                        .with_details(decision.details());
                    self.deps.recorder.record(record).await;
                    return;
                }
                forecast_details = Some(decision.details());
            }
            Err(e) => {
                warn!(
                    device_id = %due.profile.device_id,
                    schedule_id = %due.schedule.id,
                    "Forecast unavailable, watering anyway: {}",
                    e
                );
                summary.errors += 1;
                let record = due.record(
                    RecordType::Error,
                    Origin::WeatherAi,
                    ReasonCode::ForecastUnavailable,
                    format!("Forecast unavailable, watering anyway: {e}"),
                );
                self.deps.recorder.record(record).await;
            }
        }

        let command = Command::activate(
            Addressing::Unicast(due.profile.device_id.clone()),
            due.schedule.duration_secs(),
            Origin::Schedule,
        )
        .with_command_id(due.command_id.clone());

        match self.deps.publisher.publish(&command).await {
            Ok(()) => {
                summary.executed += 1;
                let record = due
                    .record(
                        RecordType::Execution,
                        Origin::Schedule,
                        ReasonCode::Dispatched,
                        format!(
                            "Watering \"{}\" for {} minutes",
                            due.schedule.label, due.schedule.duration_minutes
                        ),
                    )
                    .with_command_id(due.command_id.clone())
                    .with_details(json!({
                        "duration_secs": command.duration_secs,
                        "topic": self.deps.publisher.topic(),
                        "forecast": forecast_details,
                    }));
                self.deps.recorder.record(record).await;
            }
            Err(e) => {
                summary.errors += 1;
                let record = due
                    .record(
                        RecordType::Error,
                        Origin::System,
                        ReasonCode::PublishFailed,
                        format!("Command publish failed: {e}"),
                    )
                    .with_command_id(due.command_id.clone());
                self.deps.recorder.record(record).await;
            }
        }
    }

    /// A `skipped` record when the device's soil-moisture target says no
    /// watering is needed or cannot be checked
    async fn soil_guard(&self, due: &Due<'_>) -> Option<DecisionRecord> {
        let target = due.profile.target_soil_moisture?;
        let max_age = self.options.telemetry_max_age.as_secs() as i64;

        let latest = match self.deps.telemetry.latest(&due.profile.device_id).await {
            Ok(latest) => latest,
            Err(e) => {
                warn!(device_id = %due.profile.device_id, "Telemetry read failed: {}", e);
                None
            }
        };

        let sample = match latest {
            Some(sample) if due.now.timestamp() - sample.timestamp <= max_age => sample,
            stale => {
                let message = match stale {
                    Some(sample) => format!(
                        "Skipped \"{}\": latest telemetry is {} seconds old",
                        due.schedule.label,
                        due.now.timestamp() - sample.timestamp
                    ),
                    None => format!("Skipped \"{}\": no telemetry available", due.schedule.label),
                };
                return Some(
                    due.record(
                        RecordType::Skipped,
                        Origin::Schedule,
                        ReasonCode::TelemetryUnavailable,
                        message,
                    )
                    .with_details(json!({ "target_soil_moisture": target })),
                );
            }
        };

        let moisture = sample.sensors.soil_moisture;
        if moisture < target {
            return None;
        }

        info!(
            device_id = %due.profile.device_id,
            schedule_id = %due.schedule.id,
            soil_moisture = moisture,
            target_soil_moisture = target,
            "Watering skipped, soil moist enough"
        );
        Some(
            due.record(
                RecordType::Skipped,
                Origin::Schedule,
                ReasonCode::SoilMoistureSufficient,
                format!(
                    "Skipped \"{}\": soil moisture {:.1}% reached target {:.1}%",
                    due.schedule.label, moisture, target
                ),
            )
            .with_details(json!({
                "soil_moisture": moisture,
                "target_soil_moisture": target,
                "telemetry_timestamp": sample.timestamp,
            })),
        )
    }

    async fn fetch_forecast(&self, due: &Due<'_>) -> Result<ForecastWindow, StationError> {
        let fetch = self
            .deps
            .forecast
            .fetch(due.schedule.location, self.options.lookahead_hours);
        let window = tokio::time::timeout(self.options.forecast_timeout, fetch)
            .await
            .map_err(|_| {
                StationError::ForecastUnavailable(format!(
                    "no response within {:?}",
                    self.options.forecast_timeout
                ))
            })??;

        if window.is_empty() {
            return Err(StationError::ForecastUnavailable("empty forecast".to_string()));
        }
        Ok(window)
    }
}
