//! HTTP request handlers

use std::sync::Arc;

use agrosmart_protocol::{
    CommandRequest, CommandResponse, HealthResponse, Page, TelemetryMessage, VersionResponse,
};
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::models::device::validate_device_id;
use crate::models::record::DecisionRecord;
use crate::server::error::ApiError;
use crate::server::state::ServerState;
use crate::storage::telemetry::TelemetryQuery;
use crate::utils::version_info;

/// Page size when `limit` is absent
pub const DEFAULT_LIMIT: usize = 50;

/// Header carrying a client-chosen key that fixes the manual command id
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "agrosmart".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Query string of the list endpoints.
///
/// Everything arrives as text so malformed numbers get the documented 400
/// body instead of the extractor's plain-text rejection.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub device_id: Option<String>,
    pub limit: Option<String>,
    pub next_token: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl ListParams {
    fn device_id(&self) -> Result<&str, ApiError> {
        let device_id = self
            .device_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::BadRequest("device_id is required".to_string()))?;
        validate_device_id(device_id)?;
        Ok(device_id)
    }

    /// `limit` clamped to [1, max]
    fn limit(&self, max: usize) -> Result<usize, ApiError> {
        let max = max.max(1);
        let Some(raw) = self.limit.as_deref() else {
            return Ok(DEFAULT_LIMIT.min(max));
        };
        let limit: i64 = raw
            .trim()
            .parse()
            .map_err(|_| ApiError::BadRequest("limit must be an integer".to_string()))?;
        Ok(limit.clamp(1, max as i64) as usize)
    }

    fn next_token(&self) -> Option<&str> {
        self.next_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Both-or-neither Unix-second range; one bound alone applies no filter
    fn range(&self) -> Result<Option<(i64, i64)>, ApiError> {
        let parse = |name: &str, raw: &str| {
            raw.trim()
                .parse::<i64>()
                .map_err(|_| ApiError::BadRequest(format!("{name} must be a Unix timestamp")))
        };
        match (self.start_time.as_deref(), self.end_time.as_deref()) {
            (Some(start), Some(end)) => Ok(Some((parse("start_time", start)?, parse("end_time", end)?))),
            _ => Ok(None),
        }
    }
}

fn list_params(params: Result<Query<ListParams>, QueryRejection>) -> Result<ListParams, ApiError> {
    params
        .map(|Query(params)| params)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// `GET /telemetry`
pub async fn telemetry_handler(
    State(state): State<Arc<ServerState>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Page<TelemetryMessage>>, ApiError> {
    let params = list_params(params)?;

    let query = TelemetryQuery {
        device_id: params.device_id()?.to_string(),
        limit: params.limit(state.max_page_size)?,
        next_token: params.next_token().map(str::to_string),
        range: params.range()?,
    };

    let page = state.telemetry.query(&query).await?;
    Ok(Json(page))
}

/// `GET /history`
pub async fn history_handler(
    State(state): State<Arc<ServerState>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Page<DecisionRecord>>, ApiError> {
    let params = list_params(params)?;

    let device_id = params.device_id()?;
    let limit = params.limit(state.max_page_size)?;
    let page = state
        .history
        .list(device_id, limit, params.next_token())
        .await?;
    Ok(Json(page))
}

/// `POST /command`
pub async fn command_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Json<CommandResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::BadRequest("Idempotency-Key must be ASCII".to_string()))
        })
        .transpose()?;

    let response = state.gateway.submit(&request, idempotency_key).await?;
    Ok(Json(response))
}
