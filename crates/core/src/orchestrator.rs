//! Per-request orchestration
//!
//! Glue for one inbound chat request: resolve the caller's rules and config
//! through the caches, run the security processor over each message in
//! order, dispatch to the provider adapter, restore placeholders in the
//! response, and emit a usage record. Requests run under a deadline; a
//! timed-out request is cancelled and writes no usage record.

use crate::audit::{AuditAction, AuditEntry, AuditEventType, AuditLog};
use crate::cache::{TtlCache, CONFIG_CACHE_TTL, RULES_CACHE_TTL};
use crate::config::{GatewayConfig, ProviderCredentials, SecurityPolicy, Settings};
use crate::control::{ControlPlane, UsageRecord};
use crate::detector::PiiDetector;
use crate::error::{GatewayError, Result};
use crate::processor::{ProcessingResult, SecurityProcessor};
use crate::providers::{
    create_provider_client, ChatMessage, ChatRequest, ChatResponse, ChatUsage, Provider,
    ProviderClient,
};
use crate::rules::{RuleEngine, SecurityRule};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Verified caller identity plus the per-request correlation id
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user_id: String,
    pub request_id: String,
}

/// Gateway-level response: the provider response plus the two auxiliary
/// security flags.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub response: ChatResponse,
    pub has_anonymization: bool,
    pub pii_detected: bool,
}

/// Selects a provider adapter; injectable so tests can supply fakes.
pub type ProviderFactory =
    dyn Fn(Provider, &ProviderCredentials) -> Arc<dyn ProviderClient> + Send + Sync;

/// Per-process orchestrator shared across request handlers.
pub struct Orchestrator {
    settings: Settings,
    control: Arc<dyn ControlPlane>,
    detector: Arc<PiiDetector>,
    audit: Arc<AuditLog>,
    rules_cache: TtlCache<Vec<SecurityRule>>,
    config_cache: TtlCache<GatewayConfig>,
    provider_factory: Box<ProviderFactory>,
}

impl Orchestrator {
    pub fn new(
        settings: Settings,
        control: Arc<dyn ControlPlane>,
        detector: Arc<PiiDetector>,
    ) -> Self {
        Self {
            settings,
            control,
            detector,
            audit: Arc::new(AuditLog::new(10_000)),
            rules_cache: TtlCache::new(RULES_CACHE_TTL),
            config_cache: TtlCache::new(CONFIG_CACHE_TTL),
            provider_factory: Box::new(|provider, credentials| {
                create_provider_client(provider, credentials)
            }),
        }
    }

    /// Replace the adapter factory (tests)
    pub fn with_provider_factory(
        mut self,
        factory: impl Fn(Provider, &ProviderCredentials) -> Arc<dyn ProviderClient>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.provider_factory = Box::new(factory);
        self
    }

    pub fn audit_log(&self) -> Arc<AuditLog> {
        self.audit.clone()
    }

    /// Handle one chat request end to end under the configured deadline.
    pub async fn handle(&self, identity: &UserIdentity, request: ChatRequest) -> Result<ChatOutcome> {
        request.validate()?;

        let deadline = Duration::from_millis(self.settings.request_timeout_ms);
        let span = tracing::info_span!(
            "veilgate.chat.request",
            "veilgate.request.id" = %identity.request_id,
            "veilgate.user.id" = %identity.user_id,
            "veilgate.provider" = %request.provider,
            "veilgate.model" = %request.model,
        );

        match tokio::time::timeout(deadline, self.handle_inner(identity, request))
            .instrument(span)
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(GatewayError::Timeout(self.settings.request_timeout_ms)),
        }
    }

    async fn handle_inner(
        &self,
        identity: &UserIdentity,
        request: ChatRequest,
    ) -> Result<ChatOutcome> {
        let user_id = identity.user_id.as_str();

        // Rules and config through the single-flight caches
        let rules = self
            .rules_cache
            .get_or_fetch(
                user_id,
                || self.control.fetch_rules(user_id),
                Vec::new,
            )
            .await;
        let config = self
            .config_cache
            .get_or_fetch(
                user_id,
                || self.control.fetch_config(user_id),
                || GatewayConfig::default_for(user_id),
            )
            .await;

        let policy = SecurityPolicy::resolve(&self.settings, &config);
        let mut processor = SecurityProcessor::new(
            policy.clone(),
            RuleEngine::new(&rules),
            self.detector.clone(),
            user_id,
            identity.request_id.clone(),
        )
        .with_audit(self.audit.clone());

        // Process messages strictly in order: placeholder ids from earlier
        // turns may be referenced by later ones.
        let mut processed_messages = Vec::with_capacity(request.messages.len());
        let mut results: Vec<ProcessingResult> = Vec::with_capacity(request.messages.len());
        for message in &request.messages {
            let result = processor.process_text(&message.content).await?;
            processed_messages.push(ChatMessage::new(message.role, result.processed_text.clone()));
            results.push(result);
        }

        let pii_detected = results.iter().any(|r| !r.matches.is_empty());
        let has_anonymization = results.iter().any(|r| !r.token_mappings.is_empty());
        let processing_time_ms: u64 = results.iter().map(|r| r.processing_time_ms).sum();
        let mut rules_triggered: Vec<String> = Vec::new();
        for id in results.iter().flat_map(|r| r.applied_rules.iter()) {
            if !rules_triggered.contains(id) {
                rules_triggered.push(id.clone());
            }
        }

        // Dispatch to the provider with the transformed messages
        let credentials = config.credentials_for(request.provider);
        let client = (self.provider_factory)(request.provider, &credentials);
        let outbound = ChatRequest {
            messages: processed_messages,
            ..request.clone()
        };
        let mut response = client.chat(&outbound).await?;

        // Restore with the most recent non-empty token map: the context the
        // model actually saw for the last sensitive turn.
        if let Some(mapping_source) = results.iter().rev().find(|r| !r.token_mappings.is_empty()) {
            let mut restored_any = false;
            for choice in &mut response.choices {
                let restored =
                    SecurityProcessor::restore_text(&choice.message.content, &mapping_source.token_mappings);
                if restored != choice.message.content {
                    choice.message.content = restored;
                    restored_any = true;
                }
            }
            if restored_any && policy.enable_audit_logging {
                self.audit.record(AuditEntry {
                    timestamp: Utc::now(),
                    user_id: user_id.to_string(),
                    request_id: identity.request_id.clone(),
                    event_type: AuditEventType::ResponseRestored,
                    details: "Placeholders restored in provider response".to_string(),
                    action_taken: AuditAction::Logged,
                });
            }
        }

        // Usage record, fire-and-forget: a write failure must not fail the
        // caller's request, and no inline retry happens.
        let usage = response.usage.unwrap_or(ChatUsage::default());
        let record = UsageRecord {
            user_id: user_id.to_string(),
            provider: request.provider,
            model: request.model.clone(),
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cost: client.cost(&request.model, &usage),
            processing_time_ms,
            pii_detected,
            rules_triggered,
            timestamp: Utc::now(),
            request_id: identity.request_id.clone(),
        };
        let control = self.control.clone();
        let audit = self.audit.clone();
        let audit_enabled = policy.enable_audit_logging;
        tokio::spawn(async move {
            match control.record_usage(&record).await {
                Ok(()) => {
                    if audit_enabled {
                        audit.record(AuditEntry {
                            timestamp: Utc::now(),
                            user_id: record.user_id.clone(),
                            request_id: record.request_id.clone(),
                            event_type: AuditEventType::UsageRecorded,
                            details: format!(
                                "{} tokens, cost {:.6}",
                                record.total_tokens, record.cost
                            ),
                            action_taken: AuditAction::Logged,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(request_id = %record.request_id, "Dropping usage record: {}", e);
                }
            }
        });

        Ok(ChatOutcome {
            response,
            has_anonymization,
            pii_detected,
        })
    }
}
