//! Short-range precipitation forecast client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::errors::StationError;
use crate::models::forecast::{ForecastWindow, HourlyForecast};
use crate::models::schedule::Location;

/// Source of hourly precipitation forecasts
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    /// Fetch `hours` hourly entries starting at the current hour
    async fn fetch(&self, location: Location, hours: usize) -> Result<ForecastWindow, StationError>;
}

/// Open-Meteo forecast API client
pub struct OpenMeteoClient {
    client: Client,
    base_url: Url,
}

impl OpenMeteoClient {
    /// Create a new client; `timeout` bounds every request
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StationError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StationError::ConfigError(format!("Invalid forecast URL {base_url}: {e}")))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn request_url(&self, location: Location, hours: usize) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("latitude", &location.latitude.to_string())
            .append_pair("longitude", &location.longitude.to_string())
            .append_pair("hourly", "precipitation_probability,precipitation")
            .append_pair("forecast_hours", &hours.to_string())
            .append_pair("timezone", "GMT");
        url
    }
}

#[async_trait]
impl ForecastProvider for OpenMeteoClient {
    async fn fetch(&self, location: Location, hours: usize) -> Result<ForecastWindow, StationError> {
        let url = self.request_url(location, hours);
        debug!("GET {}", url);

        let unavailable = |e: reqwest::Error| StationError::ForecastUnavailable(e.to_string());

        let response = self.client.get(url).send().await.map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(StationError::ForecastUnavailable(format!(
                "forecast service returned {}",
                response.status()
            )));
        }

        let body: OpenMeteoResponse = response.json().await.map_err(unavailable)?;
        into_window(body, hours)
    }
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    #[serde(default)]
    hourly: Option<HourlyBlock>,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    /// Percent
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,

    /// Millimetres
    #[serde(default)]
    precipitation: Vec<Option<f64>>,
}

/// Normalize the provider's hourly arrays into a window of at most `hours` entries
fn into_window(body: OpenMeteoResponse, hours: usize) -> Result<ForecastWindow, StationError> {
    let hourly = body
        .hourly
        .ok_or_else(|| StationError::ForecastUnavailable("response has no hourly block".to_string()))?;

    let window: Vec<HourlyForecast> = hourly
        .precipitation_probability
        .iter()
        .zip(hourly.precipitation.iter())
        .take(hours)
        .map(|(probability, amount)| HourlyForecast {
            probability: (probability.unwrap_or(0.0) / 100.0).clamp(0.0, 1.0),
            amount_mm: amount.unwrap_or(0.0).max(0.0),
        })
        .collect();

    if window.is_empty() {
        return Err(StationError::ForecastUnavailable("forecast has no hourly entries".to_string()));
    }

    Ok(ForecastWindow::new(window))
}
