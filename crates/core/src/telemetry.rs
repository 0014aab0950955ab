//! Telemetry constants and span helpers
//!
//! Centralized span and attribute names for the gateway, plus helpers that
//! record values onto the current `tracing` span.
//!
//! ## Span Hierarchy
//!
//! ```text
//! veilgate.chat.request
//!   +-- veilgate.security.process (per message)
//!   +-- veilgate.provider.chat
//!   +-- veilgate.usage.record
//! ```

/// Service name for telemetry
pub const SERVICE_NAME: &str = "veilgate-gateway";

// Span name constants
pub const SPAN_CHAT_REQUEST: &str = "veilgate.chat.request";
pub const SPAN_SECURITY_PROCESS: &str = "veilgate.security.process";
pub const SPAN_PROVIDER_CHAT: &str = "veilgate.provider.chat";
pub const SPAN_USAGE_RECORD: &str = "veilgate.usage.record";

// Attribute key constants
pub const ATTR_REQUEST_ID: &str = "veilgate.request.id";
pub const ATTR_USER_ID: &str = "veilgate.user.id";
pub const ATTR_PROVIDER: &str = "veilgate.provider";
pub const ATTR_MODEL: &str = "veilgate.model";
pub const ATTR_PII_DETECTED: &str = "veilgate.security.pii_detected";
pub const ATTR_RULES_TRIGGERED: &str = "veilgate.security.rules_triggered";
pub const ATTR_FINAL_ACTION: &str = "veilgate.security.final_action";
pub const ATTR_PROMPT_TOKENS: &str = "veilgate.usage.prompt_tokens";
pub const ATTR_COMPLETION_TOKENS: &str = "veilgate.usage.completion_tokens";
pub const ATTR_TOTAL_TOKENS: &str = "veilgate.usage.total_tokens";
pub const ATTR_COST: &str = "veilgate.usage.cost";

/// Record token usage onto the current span
pub fn record_token_usage(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) {
    let span = tracing::Span::current();
    span.record(ATTR_PROMPT_TOKENS, prompt_tokens);
    span.record(ATTR_COMPLETION_TOKENS, completion_tokens);
    span.record(ATTR_TOTAL_TOKENS, total_tokens);
}

/// Record the security pipeline outcome onto the current span
pub fn record_security_outcome(pii_detected: bool, rules_triggered: usize, final_action: &str) {
    let span = tracing::Span::current();
    span.record(ATTR_PII_DETECTED, pii_detected);
    span.record(ATTR_RULES_TRIGGERED, rules_triggered as i64);
    span.record(ATTR_FINAL_ACTION, final_action);
}
