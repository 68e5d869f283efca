//! Periodic scheduler worker

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::scheduler::engine::SchedulerEngine;

/// Scheduler worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Tick period; ticks land on multiples of it since the epoch
    pub period: Duration,

    /// How far past each boundary the tick fires
    pub boundary_slack: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            boundary_slack: Duration::from_secs(1),
        }
    }
}

/// Time from `now` until the next period boundary plus slack
pub fn next_tick_delay(now: DateTime<Utc>, options: &Options) -> Duration {
    let period_ms = options.period.as_millis().max(1) as i64;
    let into_period = now.timestamp_millis().rem_euclid(period_ms);
    let slack_ms = options.boundary_slack.as_millis() as i64;

    let mut delay = period_ms - into_period + slack_ms;
    if delay > period_ms {
        // Still inside the slack of the boundary just passed
        delay -= period_ms;
    }
    Duration::from_millis(delay as u64)
}

/// Run the scheduler worker
pub async fn run<S, F>(
    options: &Options,
    engine: &SchedulerEngine,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Scheduler worker starting, period {:?}", options.period);

    loop {
        let delay = next_tick_delay(Utc::now(), options);
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Scheduler worker shutting down...");
                return;
            }
            _ = sleep_fn(delay) => {}
        }

        // A failed cycle is retried on the next tick, never immediately
        if let Err(e) = engine.run_cycle(Utc::now()).await {
            error!("Scheduler cycle aborted: {}", e);
        }
    }
}
