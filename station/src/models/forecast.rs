//! Precipitation forecast models

use serde::{Deserialize, Serialize};

/// One forecast hour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecast {
    /// Probability of precipitation, 0.0-1.0
    pub probability: f64,

    /// Expected amount in millimetres, never negative
    pub amount_mm: f64,
}

/// Hourly forecast covering the lookahead from "now"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastWindow {
    pub hours: Vec<HourlyForecast>,
}

impl ForecastWindow {
    pub fn new(hours: Vec<HourlyForecast>) -> Self {
        Self { hours }
    }

    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|&(probability, amount_mm)| HourlyForecast { probability, amount_mm })
                .collect(),
        )
    }

    pub fn total_mm(&self) -> f64 {
        self.hours.iter().map(|h| h.amount_mm).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.hours.is_empty()
    }
}
