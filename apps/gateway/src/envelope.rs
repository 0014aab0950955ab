//! Standard response envelope
//!
//! Every JSON response is wrapped as
//! `{success, data?, error?, meta: {timestamp, requestId, version}}`.
//! The request id is generated per inbound request and propagated to logs,
//! control-plane calls, and the usage record.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Serialize;
use veilgate_core::GatewayError;

/// Envelope metadata attached to every response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub timestamp: String,
    pub request_id: String,
    pub version: String,
}

impl Meta {
    pub fn new(request_id: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            request_id: request_id.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error payload inside the envelope
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Response envelope
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub meta: Meta,
}

/// Build a success response
pub fn success<T: Serialize>(request_id: &str, data: T) -> Response {
    let envelope = Envelope {
        success: true,
        data: Some(data),
        error: None,
        meta: Meta::new(request_id),
    };
    (StatusCode::OK, Json(envelope)).into_response()
}

/// Build an error response from a `GatewayError` through the single
/// error-to-HTTP table. In production mode internal (5xx) messages are
/// replaced with a generic phrase; the detail is logged instead.
pub fn failure(request_id: &str, error: &GatewayError, production: bool) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let message = if production && status.is_server_error() {
        tracing::error!(request_id, "{}", error);
        "An internal error occurred".to_string()
    } else {
        error.to_string()
    };

    let envelope: Envelope<()> = Envelope {
        success: false,
        data: None,
        error: Some(ErrorBody {
            code: error.code().to_string(),
            message,
            details: error.details(),
        }),
        meta: Meta::new(request_id),
    };
    (status, Json(envelope)).into_response()
}
