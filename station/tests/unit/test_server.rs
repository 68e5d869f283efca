//! HTTP gateway through the router

use std::sync::Arc;
use std::time::Duration;

use agrosmart::dispatch::gateway::ManualGateway;
use agrosmart::dispatch::publisher::CommandPublisher;
use agrosmart::dispatch::transport::RecordingTransport;
use agrosmart::models::command::Origin;
use agrosmart::models::record::{DecisionRecord, RecordType};
use agrosmart::server::serve::router;
use agrosmart::server::state::ServerState;
use agrosmart::storage::history::{HistoryStore, MemoryHistoryStore};
use agrosmart::storage::telemetry::{MemoryTelemetryStore, TelemetryStore};
use agrosmart_protocol::TelemetryMessage;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::DateTime;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestServer {
    state: Arc<ServerState>,
    transport: Arc<RecordingTransport>,
    telemetry: Arc<MemoryTelemetryStore>,
    history: Arc<MemoryHistoryStore>,
}

impl TestServer {
    fn new() -> Self {
        let transport = Arc::new(RecordingTransport::new());
        let telemetry = Arc::new(MemoryTelemetryStore::new());
        let history = Arc::new(MemoryHistoryStore::new());
        let publisher = Arc::new(CommandPublisher::new(
            transport.clone(),
            "agrosmart/v5/command",
            Duration::from_secs(5),
        ));
        let state = Arc::new(ServerState::new(
            telemetry.clone(),
            history.clone(),
            Arc::new(ManualGateway::new(publisher, 900)),
            200,
        ));
        Self {
            state,
            transport,
            telemetry,
            history,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_command(&self, body: &str, idempotency_key: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::post("/command").header("content-type", "application/json");
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        self.send(request.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn seed_telemetry(&self, device_id: &str, timestamps: &[i64]) {
        for ts in timestamps {
            let sample: TelemetryMessage = serde_json::from_value(json!({
                "device_id": device_id,
                "timestamp": ts,
                "sensors": {"soil_moisture": 35.0, "air_temp": 22.0},
            }))
            .unwrap();
            self.telemetry.append(&sample).await.unwrap();
        }
    }
}

fn timestamps(body: &Value) -> Vec<i64> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["timestamp"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_telemetry_requires_device_id() {
    let server = TestServer::new();
    let (status, body) = server.get("/telemetry").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    assert_eq!(body["message"], "device_id is required");
}

#[tokio::test]
async fn test_telemetry_pages_newest_first() {
    let server = TestServer::new();
    server.seed_telemetry("esp32-01", &[100, 300, 200]).await;
    server.seed_telemetry("esp32-02", &[250]).await;

    let (status, first) = server.get("/telemetry?device_id=esp32-01&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["count"], 2);
    assert_eq!(timestamps(&first), vec![300, 200]);

    let token = first["next_token"].as_str().unwrap();
    let (_, second) = server
        .get(&format!("/telemetry?device_id=esp32-01&limit=2&next_token={token}"))
        .await;
    assert_eq!(timestamps(&second), vec![100]);
    assert!(second["next_token"].is_null());
}

#[tokio::test]
async fn test_telemetry_range_is_both_or_neither() {
    let server = TestServer::new();
    server.seed_telemetry("esp32-01", &[100, 200, 300]).await;

    let (_, only_start) = server.get("/telemetry?device_id=esp32-01&start_time=250").await;
    assert_eq!(timestamps(&only_start), vec![300, 200, 100]);

    let (_, both) = server
        .get("/telemetry?device_id=esp32-01&start_time=150&end_time=300")
        .await;
    assert_eq!(timestamps(&both), vec![300, 200]);
}

#[tokio::test]
async fn test_telemetry_rejects_bad_parameters() {
    let server = TestServer::new();

    let (status, body) = server.get("/telemetry?device_id=esp32-01&next_token=garbage").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_next_token");

    let (status, body) = server.get("/telemetry?device_id=esp32-01&limit=ten").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, _) = server.get("/telemetry?device_id=..%2Fetc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_lists_records() {
    let server = TestServer::new();
    let base = DateTime::from_timestamp(1_767_600_000, 0).unwrap();
    for minute in 0..3 {
        let record = DecisionRecord::new(
            RecordType::Execution,
            Origin::Schedule,
            "esp32-01",
            base + chrono::Duration::minutes(minute),
            format!("run {minute}"),
        );
        server.history.append(&record).await.unwrap();
    }

    let (status, body) = server.get("/history?device_id=esp32-01&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["data"][0]["message"], "run 2");
    assert_eq!(body["data"][0]["type"], "execution");
    assert!(body["next_token"].is_string());
}

#[tokio::test]
async fn test_command_publishes_manual_activation() {
    let server = TestServer::new();
    let (status, body) = server
        .post_command(r#"{"device_id": "esp32-01", "action": "on", "duration": 300}"#, None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["target"], "esp32-01");

    let published = server.transport.published();
    assert_eq!(published.len(), 1);
    let command = published[0].json();
    assert_eq!(command["origin"], "manual");
    assert_eq!(command["duration"], 300);
    assert_eq!(command["command_id"], body["command_id"]);
}

#[tokio::test]
async fn test_command_idempotency_key_fixes_id() {
    let server = TestServer::new();
    let request = r#"{"device_id": "esp32-01", "action": "on", "duration": 60}"#;

    let (_, first) = server.post_command(request, Some("retry-1")).await;
    let (_, second) = server.post_command(request, Some("retry-1")).await;
    assert_eq!(first["command_id"], second["command_id"]);

    let (_, other) = server.post_command(request, None).await;
    assert_ne!(first["command_id"], other["command_id"]);
}

#[tokio::test]
async fn test_command_validation_errors() {
    let server = TestServer::new();

    let (status, body) = server.post_command(r#"{"device_id": "esp32-01"}"#, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "action is required");

    let (status, _) = server.post_command(r#"{"action": "on"}"#, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .post_command(r#"{"device_id": "esp32-01", "action": "on", "duration": 901}"#, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = server.post_command("{not json", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    assert!(server.transport.published().is_empty());
}

#[tokio::test]
async fn test_command_transport_failure_is_sanitized() {
    let server = TestServer::new();
    server.transport.set_offline(true);

    let (status, body) = server
        .post_command(r#"{"device_id": "esp32-01", "action": "on", "duration": 60}"#, None)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "publish_failed");
    assert!(!body["message"].as_str().unwrap().contains("rejected"));
}

#[tokio::test]
async fn test_health_and_version() {
    let server = TestServer::new();

    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = server.get("/version").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["git_hash"].is_string());
}
