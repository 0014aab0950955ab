//! Gateway error taxonomy
//!
//! Every component raises a `GatewayError`; the HTTP layer maps errors to
//! responses through the single `code()`/`http_status()` table here.

use thiserror::Error;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Request fails schema or business rules
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or invalid credential
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Valid identity but insufficient scope
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Target entity absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate on create
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Process-wide rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimited,

    /// A rule with action BLOCK matched; carries the violation warnings
    #[error("Request blocked by security policy")]
    Blocked { warnings: Vec<String> },

    /// Upstream analyzer/anonymizer failure the policy refuses to tolerate
    #[error("PII detection error: {0}")]
    PiiDetection(String),

    /// Upstream model call failed
    #[error("Provider '{provider}' error: {message}")]
    Provider { provider: String, message: String },

    /// Request deadline fired
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// Catch-all
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl GatewayError {
    /// Stable machine-readable error code, carried in every error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Authentication(_) => "AUTHENTICATION_ERROR",
            Self::Authorization(_) => "AUTHORIZATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::RateLimited => "RATE_LIMIT_EXCEEDED",
            Self::Blocked { .. } => "BLOCKED_BY_POLICY",
            Self::PiiDetection(_) => "PII_DETECTION_ERROR",
            Self::Provider { .. } => "AI_PROVIDER_ERROR",
            Self::Timeout(_) => "AI_PROVIDER_ERROR",
            Self::Internal(_) | Self::Serialization(_) | Self::Http(_) => "INTERNAL_ERROR",
        }
    }

    /// The single error-kind to HTTP-status table.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Blocked { .. } => 400,
            Self::Authentication(_) => 401,
            Self::Authorization(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::RateLimited => 429,
            Self::Provider { .. } | Self::Timeout(_) => 502,
            Self::PiiDetection(_) => 503,
            Self::Internal(_) | Self::Serialization(_) | Self::Http(_) => 500,
        }
    }

    /// Structured details for the error envelope, when the kind carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Blocked { warnings } => Some(serde_json::json!({ "violations": warnings })),
            Self::Provider { provider, .. } => {
                Some(serde_json::json!({ "provider": provider }))
            }
            _ => None,
        }
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
