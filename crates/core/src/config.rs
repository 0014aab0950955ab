//! Gateway configuration
//!
//! Two layers of configuration:
//! - **`Settings`**: process-wide, read once from the environment at startup.
//!   Missing required variables fail startup loudly.
//! - **`GatewayConfig`**: per-user, owned by the control plane and cached in
//!   the data plane. Auto-created with defaults on first read.

use crate::providers::Provider;
use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default request deadline in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Process-wide settings for the data plane, loaded from the environment.
#[derive(Clone)]
pub struct Settings {
    pub port: u16,
    /// Control plane base URL
    pub backend_url: String,
    /// HS256 secret for decoding bearer tokens
    pub jwt_secret: SecretString,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
    pub cors_origin: String,
    pub enable_pii_detection: bool,
    pub enable_rule_engine: bool,
    pub fallback_to_regex: bool,
    pub block_on_security_failure: bool,
    pub pii_analyzer_url: String,
    pub pii_anonymizer_url: String,
    pub request_timeout_ms: u64,
    /// Production mode replaces internal error messages with a generic phrase
    pub production: bool,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("port", &self.port)
            .field("backend_url", &self.backend_url)
            .field("jwt_secret", &"[REDACTED]")
            .field("rate_limit_window_ms", &self.rate_limit_window_ms)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("cors_origin", &self.cors_origin)
            .field("enable_pii_detection", &self.enable_pii_detection)
            .field("enable_rule_engine", &self.enable_rule_engine)
            .field("fallback_to_regex", &self.fallback_to_regex)
            .field("block_on_security_failure", &self.block_on_security_failure)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("production", &self.production)
            .finish()
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through a lookup function (testable without touching
    /// the process environment).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut missing = Vec::new();
        let mut required = |name: &'static str| -> String {
            match lookup(name) {
                Some(v) if !v.is_empty() => v,
                _ => {
                    missing.push(name);
                    String::new()
                }
            }
        };

        let port = required("PORT");
        let backend_url = required("BACKEND_URL");
        let jwt_secret = required("JWT_SECRET");
        let rate_limit_window_ms = required("RATE_LIMIT_WINDOW_MS");
        let rate_limit_max_requests = required("RATE_LIMIT_MAX_REQUESTS");
        let cors_origin = required("CORS_ORIGIN");
        let enable_pii_detection = required("ENABLE_PII_DETECTION");
        let enable_rule_engine = required("ENABLE_RULE_ENGINE");
        let fallback_to_regex = required("FALLBACK_TO_REGEX");
        let block_on_security_failure = required("BLOCK_ON_SECURITY_FAILURE");
        let pii_analyzer_url = required("PII_ANALYZER_URL");
        let pii_anonymizer_url = required("PII_ANONYMIZER_URL");

        if !missing.is_empty() {
            anyhow::bail!(
                "Missing required environment variables: {}",
                missing.join(", ")
            );
        }

        Ok(Self {
            port: parse(&port, "PORT")?,
            backend_url,
            jwt_secret: SecretString::new(jwt_secret),
            rate_limit_window_ms: parse(&rate_limit_window_ms, "RATE_LIMIT_WINDOW_MS")?,
            rate_limit_max_requests: parse(&rate_limit_max_requests, "RATE_LIMIT_MAX_REQUESTS")?,
            cors_origin,
            enable_pii_detection: parse_bool(&enable_pii_detection, "ENABLE_PII_DETECTION")?,
            enable_rule_engine: parse_bool(&enable_rule_engine, "ENABLE_RULE_ENGINE")?,
            fallback_to_regex: parse_bool(&fallback_to_regex, "FALLBACK_TO_REGEX")?,
            block_on_security_failure: parse_bool(
                &block_on_security_failure,
                "BLOCK_ON_SECURITY_FAILURE",
            )?,
            pii_analyzer_url,
            pii_anonymizer_url,
            request_timeout_ms: lookup("REQUEST_TIMEOUT_MS")
                .map(|v| parse(&v, "REQUEST_TIMEOUT_MS"))
                .transpose()?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            production: lookup("VEILGATE_ENV").as_deref() == Some("production"),
        })
    }
}

fn parse<T: std::str::FromStr>(value: &str, name: &str) -> anyhow::Result<T> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid value '{}' for {}", value, name))
}

fn parse_bool(value: &str, name: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => anyhow::bail!("Invalid boolean '{}' for {}", value, name),
    }
}

// ============================================================================
// Per-user gateway configuration
// ============================================================================

/// Credentials and endpoint overrides for one provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredentials {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Per-user gateway configuration, owned by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    pub user_id: String,
    pub default_provider: Provider,
    pub enable_pii_detection: bool,
    pub enable_rule_engine: bool,
    pub enable_audit_logging: bool,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
    /// Provider name → credentials and endpoint overrides
    #[serde(default)]
    pub provider_configs: HashMap<String, ProviderCredentials>,
}

impl GatewayConfig {
    /// Documented defaults applied when a user's config is first read.
    pub fn default_for(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            default_provider: Provider::OpenAi,
            enable_pii_detection: true,
            enable_rule_engine: true,
            enable_audit_logging: true,
            rate_limit_window_ms: 60_000,
            rate_limit_max_requests: 100,
            provider_configs: HashMap::new(),
        }
    }

    /// Credentials for a provider, or empty defaults when none are stored.
    pub fn credentials_for(&self, provider: Provider) -> ProviderCredentials {
        self.provider_configs
            .get(provider.as_str())
            .cloned()
            .unwrap_or_default()
    }
}

/// Effective per-request security policy: process settings gate the per-user
/// configuration (both must enable a stage for it to run).
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    pub enable_pii_detection: bool,
    pub enable_rule_engine: bool,
    pub enable_audit_logging: bool,
    pub fallback_to_regex: bool,
    pub block_on_security_failure: bool,
}

impl SecurityPolicy {
    pub fn resolve(settings: &Settings, config: &GatewayConfig) -> Self {
        Self {
            enable_pii_detection: settings.enable_pii_detection && config.enable_pii_detection,
            enable_rule_engine: settings.enable_rule_engine && config.enable_rule_engine,
            enable_audit_logging: config.enable_audit_logging,
            fallback_to_regex: settings.fallback_to_regex,
            block_on_security_failure: settings.block_on_security_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_env(name: &str) -> Option<String> {
        let value = match name {
            "PORT" => "8080",
            "BACKEND_URL" => "http://localhost:3000",
            "JWT_SECRET" => "test-secret",
            "RATE_LIMIT_WINDOW_MS" => "60000",
            "RATE_LIMIT_MAX_REQUESTS" => "100",
            "CORS_ORIGIN" => "*",
            "ENABLE_PII_DETECTION" => "true",
            "ENABLE_RULE_ENGINE" => "true",
            "FALLBACK_TO_REGEX" => "true",
            "BLOCK_ON_SECURITY_FAILURE" => "false",
            "PII_ANALYZER_URL" => "http://localhost:5001",
            "PII_ANONYMIZER_URL" => "http://localhost:5002",
            _ => return None,
        };
        Some(value.to_string())
    }

    #[test]
    fn test_settings_from_full_environment() {
        let settings = Settings::from_lookup(full_env).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.backend_url, "http://localhost:3000");
        assert!(settings.enable_pii_detection);
        assert!(!settings.block_on_security_failure);
        assert_eq!(settings.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        assert!(!settings.production);
    }

    #[test]
    fn test_settings_missing_variables_fail_loudly() {
        let result = Settings::from_lookup(|name| match name {
            "PORT" => Some("8080".to_string()),
            _ => None,
        });
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Missing required environment variables"));
        assert!(err.contains("BACKEND_URL"));
        assert!(err.contains("JWT_SECRET"));
        assert!(!err.contains("PORT,"));
    }

    #[test]
    fn test_settings_invalid_number_rejected() {
        let result = Settings::from_lookup(|name| {
            if name == "PORT" {
                Some("not-a-port".to_string())
            } else {
                full_env(name)
            }
        });
        assert!(result.unwrap_err().to_string().contains("PORT"));
    }

    #[test]
    fn test_settings_invalid_boolean_rejected() {
        let result = Settings::from_lookup(|name| {
            if name == "ENABLE_PII_DETECTION" {
                Some("maybe".to_string())
            } else {
                full_env(name)
            }
        });
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("ENABLE_PII_DETECTION"));
    }

    #[test]
    fn test_settings_production_mode() {
        let settings = Settings::from_lookup(|name| {
            if name == "VEILGATE_ENV" {
                Some("production".to_string())
            } else {
                full_env(name)
            }
        })
        .unwrap();
        assert!(settings.production);
    }

    #[test]
    fn test_settings_debug_redacts_jwt_secret() {
        let settings = Settings::from_lookup(full_env).unwrap();
        let debug = format!("{:?}", settings);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("test-secret"));
    }

    #[test]
    fn test_gateway_config_defaults() {
        let config = GatewayConfig::default_for("user-1");
        assert_eq!(config.user_id, "user-1");
        assert_eq!(config.default_provider, Provider::OpenAi);
        assert!(config.enable_pii_detection);
        assert!(config.enable_rule_engine);
        assert!(config.enable_audit_logging);
        assert_eq!(config.rate_limit_window_ms, 60_000);
        assert_eq!(config.rate_limit_max_requests, 100);
        assert!(config.provider_configs.is_empty());
    }

    #[test]
    fn test_gateway_config_serde_camel_case() {
        let config = GatewayConfig::default_for("u1");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"userId\""));
        assert!(json.contains("\"defaultProvider\""));
        assert!(json.contains("\"enablePiiDetection\""));
        let parsed: GatewayConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.user_id, "u1");
    }

    #[test]
    fn test_credentials_for_unknown_provider_is_empty() {
        let config = GatewayConfig::default_for("u1");
        let creds = config.credentials_for(Provider::Gemini);
        assert!(creds.api_key.is_none());
        assert!(creds.base_url.is_none());
    }

    #[test]
    fn test_security_policy_is_conjunction() {
        let settings = Settings::from_lookup(full_env).unwrap();
        let mut config = GatewayConfig::default_for("u1");
        config.enable_rule_engine = false;

        let policy = SecurityPolicy::resolve(&settings, &config);
        assert!(policy.enable_pii_detection);
        assert!(!policy.enable_rule_engine);
        assert!(policy.fallback_to_regex);
        assert!(!policy.block_on_security_failure);
    }
}
