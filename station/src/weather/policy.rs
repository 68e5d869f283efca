//! Rain cancellation policy
//!
//! A scheduled watering is cancelled only when both hold over the forecast
//! window:
//!
//! - at least one hour is likely *and* wet (probability and amount at or above
//!   their per-hour thresholds), and
//! - the window as a whole accumulates at least the total threshold.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::forecast::ForecastWindow;

/// Cancellation thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RainThresholds {
    /// Per-hour probability, 0.0-1.0
    #[serde(default = "default_min_probability")]
    pub min_probability: f64,

    /// Per-hour amount in mm
    #[serde(default = "default_min_hour_mm")]
    pub min_hour_mm: f64,

    /// Window total in mm
    #[serde(default = "default_min_total_mm")]
    pub min_total_mm: f64,
}

fn default_min_probability() -> f64 {
    0.50
}

fn default_min_hour_mm() -> f64 {
    0.5
}

fn default_min_total_mm() -> f64 {
    1.0
}

impl Default for RainThresholds {
    fn default() -> Self {
        Self {
            min_probability: default_min_probability(),
            min_hour_mm: default_min_hour_mm(),
            min_total_mm: default_min_total_mm(),
        }
    }
}

/// An hour that satisfied the per-hour rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TriggerHour {
    /// Hours from the start of the window
    pub offset: usize,
    pub probability: f64,
    pub amount_mm: f64,
}

/// Outcome of the policy for one window
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherDecision {
    pub cancel: bool,
    /// Hours that caused the cancellation; empty when not cancelled
    pub triggering_hours: Vec<TriggerHour>,
    pub total_mm: f64,
}

impl WeatherDecision {
    /// Figures for the decision record
    pub fn details(&self) -> serde_json::Value {
        json!({
            "cancel": self.cancel,
            "total_mm": self.total_mm,
            "triggering_hours": self.triggering_hours,
        })
    }
}

/// Decide whether rain makes the watering unnecessary
pub fn evaluate(window: &ForecastWindow, thresholds: &RainThresholds) -> WeatherDecision {
    let total_mm = window.total_mm();

    let wet_hours: Vec<TriggerHour> = window
        .hours
        .iter()
        .enumerate()
        .filter(|(_, h)| {
            h.probability >= thresholds.min_probability && h.amount_mm >= thresholds.min_hour_mm
        })
        .map(|(offset, h)| TriggerHour {
            offset,
            probability: h.probability,
            amount_mm: h.amount_mm,
        })
        .collect();

    let cancel = !wet_hours.is_empty() && total_mm >= thresholds.min_total_mm;

    WeatherDecision {
        cancel,
        triggering_hours: if cancel { wet_hours } else { Vec::new() },
        total_mm,
    }
}
