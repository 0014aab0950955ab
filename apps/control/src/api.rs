//! Control-plane HTTP surface
//!
//! The repository endpoints the data plane consults, served over the
//! in-memory store. The `User-ID` header names the tenant on every route.
//!
//! ## Endpoint Map
//!
//! | Route                       | Description                      |
//! |-----------------------------|----------------------------------|
//! | `GET /health`               | Health probe                     |
//! | `GET /api/v1/rules`         | List the user's security rules   |
//! | `POST /api/v1/rules`        | Create a rule                    |
//! | `DELETE /api/v1/rules/{id}` | Delete a rule                    |
//! | `GET /api/v1/config`        | Gateway config (auto-created)    |
//! | `PUT /api/v1/config`        | Replace gateway config           |
//! | `POST /api/v1/usage`        | Record a usage entry             |
//! | `GET /api/v1/usage`         | List the user's usage entries    |

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use veilgate_core::{
    ControlPlane, GatewayConfig, GatewayError, InMemoryControlPlane, RuleAction, SecurityRule,
    UsageRecord,
};

/// Shared state: the repository behind every endpoint
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<InMemoryControlPlane>,
}

/// Build the control-plane application.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/rules", get(list_rules).post(create_rule))
        .route("/api/v1/rules/{id}", axum::routing::delete(delete_rule))
        .route("/api/v1/config", get(get_config).put(put_config))
        .route("/api/v1/usage", get(list_usage).post(record_usage))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

fn meta() -> serde_json::Value {
    serde_json::json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "requestId": Uuid::new_v4().to_string(),
        "version": env!("CARGO_PKG_VERSION"),
    })
}

fn ok(data: serde_json::Value) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({"success": true, "data": data, "meta": meta()})),
    )
        .into_response()
}

fn created(data: serde_json::Value) -> Response {
    (
        StatusCode::CREATED,
        Json(serde_json::json!({"success": true, "data": data, "meta": meta()})),
    )
        .into_response()
}

fn fail(error: &GatewayError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "error": {"code": error.code(), "message": error.to_string()},
            "meta": meta(),
        })),
    )
        .into_response()
}

/// Serialize response data, folding failures into the error taxonomy so
/// they surface through `fail` like any other `GatewayError`.
fn to_value<T: serde::Serialize>(data: &T) -> Result<serde_json::Value, GatewayError> {
    serde_json::to_value(data).map_err(GatewayError::Serialization)
}

fn user_id(headers: &HeaderMap) -> Result<String, GatewayError> {
    headers
        .get("user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| GatewayError::Authentication("missing User-ID header".into()))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "veilgate-control",
    }))
}

async fn list_rules(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return fail(&e),
    };
    let result = state
        .store
        .fetch_rules(&user_id)
        .await
        .and_then(|rules| to_value(&rules));
    match result {
        Ok(data) => ok(data),
        Err(e) => fail(&e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRuleRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    pattern: String,
    action: RuleAction,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    priority: i32,
}

fn default_enabled() -> bool {
    true
}

async fn create_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateRuleRequest>,
) -> Response {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return fail(&e),
    };

    if body.name.trim().is_empty() {
        return fail(&GatewayError::Validation("rule name must not be empty".into()));
    }
    // Reject patterns the data plane would drop at evaluation time
    if let Err(e) = regex::Regex::new(&body.pattern) {
        return fail(&GatewayError::Validation(format!(
            "pattern does not compile: {}",
            e
        )));
    }

    let rule = SecurityRule {
        id: Uuid::new_v4().to_string(),
        user_id,
        name: body.name,
        description: body.description,
        pattern: body.pattern,
        action: body.action,
        enabled: body.enabled,
        priority: body.priority,
    };

    match state.store.add_rule(rule).and_then(|rule| to_value(&rule)) {
        Ok(data) => created(data),
        Err(e) => fail(&e),
    }
}

async fn delete_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(rule_id): Path<String>,
) -> Response {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return fail(&e),
    };
    match state.store.delete_rule(&user_id, &rule_id) {
        Ok(()) => ok(serde_json::json!({"deleted": rule_id})),
        Err(e) => fail(&e),
    }
}

async fn get_config(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return fail(&e),
    };
    let result = state
        .store
        .fetch_config(&user_id)
        .await
        .and_then(|config| to_value(&config));
    match result {
        Ok(data) => ok(data),
        Err(e) => fail(&e),
    }
}

async fn put_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut config): Json<GatewayConfig>,
) -> Response {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return fail(&e),
    };
    config.user_id = user_id;
    state.store.set_config(config.clone());
    match to_value(&config) {
        Ok(data) => ok(data),
        Err(e) => fail(&e),
    }
}

async fn record_usage(
    State(state): State<AppState>,
    Json(record): Json<UsageRecord>,
) -> Response {
    match state.store.record_usage(&record).await {
        Ok(()) => created(serde_json::json!({"recorded": record.request_id})),
        Err(e) => fail(&e),
    }
}

async fn list_usage(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user_id = match user_id(&headers) {
        Ok(user_id) => user_id,
        Err(e) => return fail(&e),
    };
    let records: Vec<UsageRecord> = state
        .store
        .usage_records()
        .into_iter()
        .filter(|r| r.user_id == user_id)
        .collect();
    match to_value(&records) {
        Ok(data) => ok(data),
        Err(e) => fail(&e),
    }
}
