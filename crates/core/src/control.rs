//! Control-plane access
//!
//! The data plane consults the control plane for per-user rules and config,
//! and emits usage records back. `ControlPlane` is a trait so the
//! orchestrator can run against the HTTP client in production and an
//! in-memory implementation in tests; the control-plane service itself
//! serves the in-memory implementation behind its HTTP surface.

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::providers::Provider;
use crate::rules::SecurityRule;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Per-request usage and cost bookkeeping, write-only from the data plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub user_id: String,
    pub provider: Provider,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
    pub processing_time_ms: u64,
    pub pii_detected: bool,
    pub rules_triggered: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

/// Repository surface the data plane needs from the control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn fetch_rules(&self, user_id: &str) -> Result<Vec<SecurityRule>>;

    /// Fetch the user's gateway config; auto-created with defaults on first
    /// read.
    async fn fetch_config(&self, user_id: &str) -> Result<GatewayConfig>;

    async fn record_usage(&self, record: &UsageRecord) -> Result<()>;
}

// ============================================================================
// HTTP client
// ============================================================================

/// Control-plane response envelope, data portion only
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default = "envelope_data_default")]
    data: Option<T>,
}

fn envelope_data_default<T>() -> Option<T> {
    None
}

/// HTTP client for the control-plane service.
pub struct HttpControlPlane {
    base_url: String,
    client: reqwest::Client,
}

impl HttpControlPlane {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn get_data<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        user_id: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("User-ID", user_id)
            .send()
            .await
            .map_err(|e| GatewayError::Internal(format!("control plane unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(GatewayError::Internal(format!(
                "control plane returned {} for {}",
                response.status(),
                path
            )));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::Internal(format!("invalid control plane response: {}", e)))?;

        match (envelope.success, envelope.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(GatewayError::Internal(format!(
                "control plane reported failure for {}",
                path
            ))),
        }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn fetch_rules(&self, user_id: &str) -> Result<Vec<SecurityRule>> {
        self.get_data("/api/v1/rules", user_id).await
    }

    async fn fetch_config(&self, user_id: &str) -> Result<GatewayConfig> {
        self.get_data("/api/v1/config", user_id).await
    }

    async fn record_usage(&self, record: &UsageRecord) -> Result<()> {
        let url = format!("{}/api/v1/usage", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("User-ID", record.user_id.as_str())
            .json(record)
            .send()
            .await
            .map_err(|e| GatewayError::Internal(format!("control plane unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(GatewayError::Internal(format!(
                "usage write returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// In-memory control plane: backs the control-plane service and tests.
#[derive(Default)]
pub struct InMemoryControlPlane {
    rules: DashMap<String, Vec<SecurityRule>>,
    configs: DashMap<String, GatewayConfig>,
    usage: Mutex<Vec<UsageRecord>>,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a rule; `Conflict` when the id already exists for the user.
    pub fn add_rule(&self, rule: SecurityRule) -> Result<SecurityRule> {
        let mut rules = self.rules.entry(rule.user_id.clone()).or_default();
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(GatewayError::Conflict(format!(
                "rule '{}' already exists",
                rule.id
            )));
        }
        rules.push(rule.clone());
        Ok(rule)
    }

    /// Delete a rule; `NotFound` when absent.
    pub fn delete_rule(&self, user_id: &str, rule_id: &str) -> Result<()> {
        let mut rules = self
            .rules
            .get_mut(user_id)
            .ok_or_else(|| GatewayError::NotFound(format!("rule '{}'", rule_id)))?;
        let before = rules.len();
        rules.retain(|r| r.id != rule_id);
        if rules.len() == before {
            return Err(GatewayError::NotFound(format!("rule '{}'", rule_id)));
        }
        Ok(())
    }

    pub fn set_config(&self, config: GatewayConfig) {
        self.configs.insert(config.user_id.clone(), config);
    }

    /// Recorded usage, oldest first (test and reporting use)
    pub fn usage_records(&self) -> Vec<UsageRecord> {
        self.usage.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn fetch_rules(&self, user_id: &str) -> Result<Vec<SecurityRule>> {
        Ok(self
            .rules
            .get(user_id)
            .map(|r| r.clone())
            .unwrap_or_default())
    }

    async fn fetch_config(&self, user_id: &str) -> Result<GatewayConfig> {
        Ok(self
            .configs
            .entry(user_id.to_string())
            .or_insert_with(|| GatewayConfig::default_for(user_id))
            .clone())
    }

    async fn record_usage(&self, record: &UsageRecord) -> Result<()> {
        self.usage
            .lock()
            .map_err(|_| GatewayError::Internal("usage store lock poisoned".into()))?
            .push(record.clone());
        Ok(())
    }
}
