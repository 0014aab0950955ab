//! Endpoint tests for the control-plane repository surface

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use std::sync::Arc;
use veilgate_control::{build_app, AppState};
use veilgate_core::InMemoryControlPlane;

fn server() -> TestServer {
    let state = AppState {
        store: Arc::new(InMemoryControlPlane::new()),
    };
    TestServer::new(build_app(state)).unwrap()
}

fn user_header() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("user-id"),
        HeaderValue::from_static("u1"),
    )
}

fn rule_body(name: &str, pattern: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "pattern": pattern,
        "action": "WARN",
        "priority": 5
    })
}

#[tokio::test]
async fn test_health() {
    let server = server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["service"], "veilgate-control");
}

#[tokio::test]
async fn test_rules_require_user_header() {
    let server = server();
    let response = server.get("/api/v1/rules").await;
    response.assert_status_unauthorized();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "AUTHENTICATION_ERROR");
}

#[tokio::test]
async fn test_rule_lifecycle() {
    let server = server();
    let (name, value) = user_header();

    // Empty to start
    let response = server
        .get("/api/v1/rules")
        .add_header(name.clone(), value.clone())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    // Create
    let response = server
        .post("/api/v1/rules")
        .add_header(name.clone(), value.clone())
        .json(&rule_body("no-secrets", "secret"))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: serde_json::Value = response.json();
    let rule_id = created["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["data"]["action"], "WARN");
    assert_eq!(created["data"]["enabled"], true);

    // Listed
    let response = server
        .get("/api/v1/rules")
        .add_header(name.clone(), value.clone())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Delete
    let response = server
        .delete(&format!("/api/v1/rules/{}", rule_id))
        .add_header(name.clone(), value.clone())
        .await;
    response.assert_status_ok();

    // Deleting again is NOT_FOUND
    let response = server
        .delete(&format!("/api/v1/rules/{}", rule_id))
        .add_header(name, value)
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_uncompilable_pattern_rejected() {
    let server = server();
    let (name, value) = user_header();
    let response = server
        .post("/api/v1/rules")
        .add_header(name, value)
        .json(&rule_body("broken", "[unclosed"))
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_config_auto_created_with_defaults() {
    let server = server();
    let (name, value) = user_header();
    let response = server
        .get("/api/v1/config")
        .add_header(name, value)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"]["userId"], "u1");
    assert_eq!(body["data"]["defaultProvider"], "OPENAI");
    assert_eq!(body["data"]["enablePiiDetection"], true);
}

#[tokio::test]
async fn test_config_update_round_trip() {
    let server = server();
    let (name, value) = user_header();

    let mut config: serde_json::Value = server
        .get("/api/v1/config")
        .add_header(name.clone(), value.clone())
        .await
        .json();
    config["data"]["enableRuleEngine"] = serde_json::json!(false);

    let response = server
        .put("/api/v1/config")
        .add_header(name.clone(), value.clone())
        .json(&config["data"])
        .await;
    response.assert_status_ok();

    let fetched: serde_json::Value = server
        .get("/api/v1/config")
        .add_header(name, value)
        .await
        .json();
    assert_eq!(fetched["data"]["enableRuleEngine"], false);
}

#[tokio::test]
async fn test_usage_record_and_list() {
    let server = server();
    let (name, value) = user_header();

    let record = serde_json::json!({
        "userId": "u1",
        "provider": "OPENAI",
        "model": "gpt-4o",
        "inputTokens": 10,
        "outputTokens": 5,
        "totalTokens": 15,
        "cost": 0.00125,
        "processingTimeMs": 3,
        "piiDetected": true,
        "rulesTriggered": ["r1"],
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "requestId": "req-1"
    });

    let response = server.post("/api/v1/usage").json(&record).await;
    response.assert_status(StatusCode::CREATED);

    let body: serde_json::Value = server
        .get("/api/v1/usage")
        .add_header(name, value)
        .await
        .json();
    let records = body["data"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["requestId"], "req-1");
    assert_eq!(records[0]["piiDetected"], true);
}
