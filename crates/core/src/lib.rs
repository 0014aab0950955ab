//! # Veilgate Core
//!
//! Security processing pipeline for LLM API traffic. Each chat request is
//! intercepted on its way to an upstream provider:
//!
//! - **Rule Engine**: user-defined regex rules combined through the
//!   `Allow < Warn < Anonymize < Redact < Block` lattice
//! - **PII Detector**: external analyze/anonymize services with a built-in
//!   regex fallback
//! - **Token Mapper**: reversible placeholder substitution, request-scoped
//! - **Security Processor**: per-message pipeline tying the three together
//! - **Provider Dispatch**: OpenAI / Claude / Gemini adapters behind one
//!   trait, with per-model pricing
//! - **Caches**: per-user TTL caches over the control plane, single-flight
//! - **Orchestrator**: per-request glue from identity to usage record

pub mod audit;
pub mod cache;
pub mod config;
pub mod control;
pub mod detector;
pub mod error;
pub mod orchestrator;
pub mod processor;
pub mod providers;
pub mod rules;
pub mod secret;
pub mod telemetry;
pub mod tokens;

pub use audit::{AuditAction, AuditEntry, AuditEventType, AuditLog};
pub use cache::{TtlCache, CONFIG_CACHE_TTL, RULES_CACHE_TTL};
pub use config::{GatewayConfig, ProviderCredentials, SecurityPolicy, Settings};
pub use control::{ControlPlane, HttpControlPlane, InMemoryControlPlane, UsageRecord};
pub use detector::{AnalyzeBackend, DetectOutcome, HttpAnalyzeBackend, PiiDetector};
pub use error::{GatewayError, Result};
pub use orchestrator::{ChatOutcome, Orchestrator, UserIdentity};
pub use processor::{ProcessingResult, SecurityProcessor};
pub use providers::{
    create_provider_client, ChatChoice, ChatMessage, ChatRequest, ChatResponse, ChatUsage,
    Provider, ProviderClient, Role,
};
pub use rules::{RuleAction, RuleEngine, RuleVerdict, SecurityRule};
pub use secret::SecretString;
pub use tokens::{TokenMapper, TokenMapping};

// Re-export the PII entity model for consumers
pub use veilgate_privacy::{PiiEntityType, PiiMatch};
