//! Data-plane HTTP surface
//!
//! ## Endpoint Map
//!
//! | Route                 | Description                              |
//! |-----------------------|------------------------------------------|
//! | `GET /health`         | Load balancer health probe               |
//! | `POST /api/v1/proxy/chat` | Bearer-authenticated chat proxy      |

use crate::auth::authenticate;
use crate::envelope;
use crate::ratelimit::RateLimiter;
use axum::extract::State;
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use veilgate_core::telemetry::SERVICE_NAME;
use veilgate_core::{ChatRequest, GatewayError, Orchestrator, Settings, UserIdentity};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub orchestrator: Arc<Orchestrator>,
    pub limiter: Arc<RateLimiter>,
}

/// Build the complete data-plane application.
pub fn build_app(state: AppState) -> Router {
    let cors = build_cors(&state.settings.cors_origin);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/proxy/chat", post(proxy_chat))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    if origin == "*" {
        layer.allow_origin(Any)
    } else {
        match origin.parse::<axum::http::HeaderValue>() {
            Ok(value) => layer.allow_origin([value]),
            Err(_) => {
                tracing::warn!("Invalid CORS_ORIGIN '{}', allowing none", origin);
                layer
            }
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    timestamp: String,
    service: String,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        service: SERVICE_NAME.to_string(),
    })
}

/// Client key for the rate limiter: first X-Forwarded-For hop, or a
/// catch-all bucket for direct local connections.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "local".to_string())
}

async fn proxy_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let production = state.settings.production;

    // Rate limit before anything else
    if let Err(e) = state.limiter.check(&client_ip(&headers)) {
        return envelope::failure(&request_id, &e, production);
    }

    let user_id = match authenticate(&headers, &state.settings.jwt_secret) {
        Ok(user_id) => user_id,
        Err(e) => return envelope::failure(&request_id, &e, production),
    };

    // Manual deserialization so schema failures come back in the envelope
    let request: ChatRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            let error = GatewayError::Validation(format!("invalid chat request: {}", e));
            return envelope::failure(&request_id, &error, production);
        }
    };

    let identity = UserIdentity {
        user_id,
        request_id: request_id.clone(),
    };

    match state.orchestrator.handle(&identity, request).await {
        Ok(outcome) => {
            let mut data = match serde_json::to_value(&outcome.response) {
                Ok(data) => data,
                Err(e) => {
                    return envelope::failure(&request_id, &GatewayError::from(e), production)
                }
            };
            data["hasAnonymization"] = serde_json::json!(outcome.has_anonymization);
            data["piiDetected"] = serde_json::json!(outcome.pii_detected);
            envelope::success(&request_id, data)
        }
        Err(e) => envelope::failure(&request_id, &e, production),
    }
}
