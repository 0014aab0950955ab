//! Security processor
//!
//! Single entry point per message: detect PII, evaluate rules, compute the
//! final action, transform the text. Orchestrates the detector, the rule
//! engine, and the token mapper; the only hard stop is a Block verdict.
//!
//! Failure policy: when any step other than Block fails,
//! `block_on_security_failure` decides between re-raising (strict mode,
//! surfaces as 503) and passing the message through unmodified with the
//! error recorded on the result (availability mode, the default).

use crate::audit::{AuditAction, AuditEntry, AuditEventType, AuditLog};
use crate::config::SecurityPolicy;
use crate::detector::{DetectOutcome, PiiDetector};
use crate::error::{GatewayError, Result};
use crate::rules::{RuleAction, RuleEngine, RuleVerdict};
use crate::tokens::{TokenMapper, TokenMapping};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use veilgate_privacy::{mask_text, PiiMatch};

/// Redaction replaces each span with at most this many asterisks
const REDACT_MASK_CAP: usize = 10;

/// Per-message output of the security processor
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub original_text: String,
    pub processed_text: String,
    pub matches: Vec<PiiMatch>,
    pub token_mappings: Vec<TokenMapping>,
    pub applied_rules: Vec<String>,
    pub processing_time_ms: u64,
    /// Set when a pipeline step failed and the availability policy let the
    /// message through unmodified
    pub error: Option<String>,
}

impl ProcessingResult {
    fn pass_through(text: &str, elapsed_ms: u64, error: Option<String>) -> Self {
        Self {
            original_text: text.to_string(),
            processed_text: text.to_string(),
            matches: Vec::new(),
            token_mappings: Vec::new(),
            applied_rules: Vec::new(),
            processing_time_ms: elapsed_ms,
            error,
        }
    }
}

/// Per-request security processor.
///
/// Holds the caller's effective policy, their compiled rule engine, and the
/// request-scoped token mapper. Messages must be processed in order: the
/// mapper's placeholder counters span the whole request.
pub struct SecurityProcessor {
    policy: SecurityPolicy,
    engine: RuleEngine,
    detector: Arc<PiiDetector>,
    mapper: TokenMapper,
    audit: Option<Arc<AuditLog>>,
    user_id: String,
    request_id: String,
}

impl SecurityProcessor {
    pub fn new(
        policy: SecurityPolicy,
        engine: RuleEngine,
        detector: Arc<PiiDetector>,
        user_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            engine,
            detector,
            mapper: TokenMapper::new(),
            audit: None,
            user_id: user_id.into(),
            request_id: request_id.into(),
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    fn audit_event(&self, event_type: AuditEventType, details: String, action: AuditAction) {
        if !self.policy.enable_audit_logging {
            return;
        }
        if let Some(audit) = &self.audit {
            audit.record(AuditEntry {
                timestamp: Utc::now(),
                user_id: self.user_id.clone(),
                request_id: self.request_id.clone(),
                event_type,
                details,
                action_taken: action,
            });
        }
    }

    /// Process one message through the pipeline.
    ///
    /// Returns `GatewayError::Blocked` when a Block rule matches; any other
    /// step failure goes through the availability policy.
    pub async fn process_text(&mut self, text: &str) -> Result<ProcessingResult> {
        let started = Instant::now();

        if text.is_empty() {
            return Ok(ProcessingResult::pass_through(
                text,
                elapsed_ms(started),
                None,
            ));
        }

        // Step 1: PII detection
        let detection = if self.policy.enable_pii_detection {
            match self.detector.detect(text).await {
                Ok(outcome) => {
                    if outcome.used_fallback {
                        self.audit_event(
                            AuditEventType::DetectorFallback,
                            "External analyzer unavailable, regex fallback used".to_string(),
                            AuditAction::Logged,
                        );
                    }
                    if !outcome.matches.is_empty() {
                        self.audit_event(
                            AuditEventType::PiiDetected,
                            format!("{} PII entities detected", outcome.matches.len()),
                            AuditAction::Logged,
                        );
                    }
                    outcome
                }
                Err(e) => return self.handle_failure(text, started, e),
            }
        } else {
            DetectOutcome {
                matches: Vec::new(),
                used_fallback: false,
            }
        };

        // Step 2: rule evaluation. A Block verdict stops everything and is
        // never downgraded by the availability policy.
        let verdict = if self.policy.enable_rule_engine {
            let verdict = self.engine.evaluate(text);
            if !verdict.matched_rules.is_empty() {
                self.audit_event(
                    AuditEventType::RuleMatched,
                    format!("Rules matched: {}", verdict.matched_rules.join(", ")),
                    AuditAction::Logged,
                );
            }
            if verdict.blocked {
                self.audit_event(
                    AuditEventType::MessageBlocked,
                    verdict.warnings.join("; "),
                    AuditAction::Blocked,
                );
                return Err(GatewayError::Blocked {
                    warnings: verdict.warnings,
                });
            }
            verdict
        } else {
            RuleVerdict::default()
        };

        // Step 3: final action. An explicit rule verdict wins; otherwise any
        // PII defaults to Anonymize.
        let final_action = if verdict.action != RuleAction::Allow {
            verdict.action
        } else if !detection.matches.is_empty() {
            RuleAction::Anonymize
        } else {
            RuleAction::Allow
        };

        // Step 4: apply
        let (processed_text, token_mappings) = match final_action {
            RuleAction::Allow | RuleAction::Warn => (text.to_string(), Vec::new()),
            RuleAction::Anonymize => {
                match self
                    .detector
                    .anonymize(text, &detection, &mut self.mapper)
                    .await
                {
                    Ok(result) => result,
                    Err(e) => return self.handle_failure(text, started, e),
                }
            }
            RuleAction::Redact => (redact(text, &detection.matches), Vec::new()),
            // Block returned in step 2
            RuleAction::Block => unreachable!("block verdicts return early"),
        };

        Ok(ProcessingResult {
            original_text: text.to_string(),
            processed_text,
            matches: detection.matches,
            token_mappings,
            applied_rules: verdict.matched_rules,
            processing_time_ms: elapsed_ms(started),
            error: None,
        })
    }

    /// Reverse substitution on a provider response. Never fails.
    pub fn restore_text(text: &str, mappings: &[TokenMapping]) -> String {
        PiiDetector::restore(text, mappings)
    }

    fn handle_failure(
        &self,
        text: &str,
        started: Instant,
        error: GatewayError,
    ) -> Result<ProcessingResult> {
        if self.policy.block_on_security_failure {
            return Err(error);
        }
        tracing::warn!(
            request_id = %self.request_id,
            "Security step failed, passing message through: {}",
            error
        );
        Ok(ProcessingResult::pass_through(
            text,
            elapsed_ms(started),
            Some(error.to_string()),
        ))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Irreversible redaction: each matched span becomes asterisks, capped at
/// ten characters. Applied right-to-left so offsets stay valid.
fn redact(text: &str, matches: &[PiiMatch]) -> String {
    let mut ordered: Vec<&PiiMatch> = matches.iter().collect();
    ordered.sort_by_key(|m| m.start);

    let mut result = text.to_string();
    for m in ordered.iter().rev() {
        let replacement = mask_text(&text[m.start..m.end], REDACT_MASK_CAP);
        result.replace_range(m.start..m.end, &replacement);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::AnalyzeBackend;
    use crate::rules::SecurityRule;
    use async_trait::async_trait;

    struct DownBackend;

    #[async_trait]
    impl AnalyzeBackend for DownBackend {
        async fn analyze(
            &self,
            _text: &str,
            _language: &str,
        ) -> Result<Vec<PiiMatch>> {
            Err(GatewayError::PiiDetection("analyzer returned 500".into()))
        }

        async fn anonymize(
            &self,
            _text: &str,
            _matches: &[PiiMatch],
            _replacements: &[String],
        ) -> Result<String> {
            Err(GatewayError::PiiDetection("anonymizer returned 500".into()))
        }
    }

    fn policy() -> SecurityPolicy {
        SecurityPolicy {
            enable_pii_detection: true,
            enable_rule_engine: true,
            enable_audit_logging: false,
            fallback_to_regex: true,
            block_on_security_failure: false,
        }
    }

    fn rule(id: &str, pattern: &str, action: RuleAction, priority: i32) -> SecurityRule {
        SecurityRule {
            id: id.to_string(),
            user_id: "u1".to_string(),
            name: format!("rule-{}", id),
            description: None,
            pattern: pattern.to_string(),
            action,
            enabled: true,
            priority,
        }
    }

    fn processor(policy: SecurityPolicy, rules: &[SecurityRule]) -> SecurityProcessor {
        // Regex-only detector: no external backend
        let detector = Arc::new(PiiDetector::new(None, policy.fallback_to_regex));
        SecurityProcessor::new(policy, RuleEngine::new(rules), detector, "u1", "req-1")
    }

    #[tokio::test]
    async fn test_clean_text_is_allowed_unchanged() {
        let mut proc = processor(policy(), &[]);
        let result = proc.process_text("What is 2+2?").await.unwrap();
        assert_eq!(result.processed_text, "What is 2+2?");
        assert!(result.matches.is_empty());
        assert!(result.token_mappings.is_empty());
        assert!(result.applied_rules.is_empty());
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_empty_text_is_allowed() {
        let mut proc = processor(policy(), &[]);
        let result = proc.process_text("").await.unwrap();
        assert_eq!(result.processed_text, "");
        assert!(result.matches.is_empty());
    }

    #[tokio::test]
    async fn test_pii_defaults_to_anonymize() {
        let mut proc = processor(policy(), &[]);
        let result = proc
            .process_text("Email me at alice@example.com")
            .await
            .unwrap();
        assert_eq!(result.processed_text, "Email me at <EMAIL_1>");
        assert_eq!(result.token_mappings.len(), 1);
        assert_eq!(result.token_mappings[0].original, "alice@example.com");
    }

    #[tokio::test]
    async fn test_block_rule_raises_with_warnings() {
        let rules = [
            rule("w", "secret", RuleAction::Warn, 10),
            rule("b", "secret", RuleAction::Block, 5),
        ];
        let mut proc = processor(policy(), &rules);
        let err = proc.process_text("the secret word").await.unwrap_err();
        match err {
            GatewayError::Blocked { warnings } => {
                assert!(warnings.iter().any(|w| w.contains("rule-w")));
                assert!(warnings.iter().any(|w| w.contains("rule-b")));
            }
            other => panic!("expected Blocked, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_explicit_rule_verdict_overrides_pii_default() {
        // Redact rule beats the anonymize-by-default for PII text
        let rules = [rule("r", "@example", RuleAction::Redact, 1)];
        let mut proc = processor(policy(), &rules);
        let result = proc
            .process_text("Email me at alice@example.com")
            .await
            .unwrap();
        assert!(!result.processed_text.contains("alice@example.com"));
        assert!(result.processed_text.contains("**********"));
        // Redaction is not reversible
        assert!(result.token_mappings.is_empty());
        assert_eq!(result.applied_rules, vec!["r".to_string()]);
    }

    #[tokio::test]
    async fn test_warn_rule_leaves_text_unchanged() {
        let rules = [rule("w", "hello", RuleAction::Warn, 1)];
        let mut proc = processor(policy(), &rules);
        let result = proc.process_text("hello world").await.unwrap();
        assert_eq!(result.processed_text, "hello world");
        assert_eq!(result.applied_rules, vec!["w".to_string()]);
    }

    #[tokio::test]
    async fn test_redact_caps_mask_length() {
        let rules = [rule("r", "@", RuleAction::Redact, 1)];
        let mut proc = processor(policy(), &rules);
        let result = proc
            .process_text("very.long.address@example-corp.example.com")
            .await
            .unwrap();
        // Span longer than the cap still yields ten asterisks
        assert!(result.processed_text.contains("**********"));
        assert!(!result.processed_text.contains("***********"));
    }

    #[tokio::test]
    async fn test_redact_is_idempotent() {
        let rules = [rule("r", "@example", RuleAction::Redact, 1)];
        let mut proc = processor(policy(), &rules);
        let once = proc
            .process_text("reach alice@example.com today")
            .await
            .unwrap();
        let twice = proc.process_text(&once.processed_text).await.unwrap();
        assert_eq!(once.processed_text, twice.processed_text);
    }

    #[tokio::test]
    async fn test_detector_down_fallback_on_proceeds() {
        let mut policy = policy();
        policy.fallback_to_regex = true;
        let detector = Arc::new(PiiDetector::new(Some(Arc::new(DownBackend)), true));
        let mut proc =
            SecurityProcessor::new(policy, RuleEngine::new(&[]), detector, "u1", "req-1");

        let result = proc
            .process_text("call me at 555-123-4567")
            .await
            .unwrap();
        assert_eq!(result.processed_text, "call me at <PHONE_1>");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_detector_down_fallback_off_passes_through() {
        let mut policy = policy();
        policy.fallback_to_regex = false;
        policy.block_on_security_failure = false;
        let detector = Arc::new(PiiDetector::new(Some(Arc::new(DownBackend)), false));
        let mut proc =
            SecurityProcessor::new(policy, RuleEngine::new(&[]), detector, "u1", "req-1");

        let text = "reach alice@example.com";
        let result = proc.process_text(text).await.unwrap();
        assert_eq!(result.processed_text, text);
        assert!(result.matches.is_empty());
        assert!(result.applied_rules.is_empty());
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_detector_down_strict_mode_raises() {
        let mut policy = policy();
        policy.fallback_to_regex = false;
        policy.block_on_security_failure = true;
        let detector = Arc::new(PiiDetector::new(Some(Arc::new(DownBackend)), false));
        let mut proc =
            SecurityProcessor::new(policy, RuleEngine::new(&[]), detector, "u1", "req-1");

        let err = proc.process_text("reach alice@example.com").await;
        assert!(matches!(err, Err(GatewayError::PiiDetection(_))));
    }

    #[tokio::test]
    async fn test_pii_detection_disabled_skips_anonymization() {
        let mut policy = policy();
        policy.enable_pii_detection = false;
        let mut proc = processor(policy, &[]);
        let text = "reach alice@example.com";
        let result = proc.process_text(text).await.unwrap();
        assert_eq!(result.processed_text, text);
        assert!(result.matches.is_empty());
    }

    #[tokio::test]
    async fn test_rule_engine_disabled_skips_block() {
        let mut policy = policy();
        policy.enable_rule_engine = false;
        let rules = [rule("b", "secret", RuleAction::Block, 1)];
        let mut proc = processor(policy, &rules);
        let result = proc.process_text("the secret word").await.unwrap();
        assert!(result.applied_rules.is_empty());
    }

    #[tokio::test]
    async fn test_placeholders_unique_across_messages() {
        let mut proc = processor(policy(), &[]);
        let first = proc.process_text("one alice@example.com").await.unwrap();
        let second = proc.process_text("two bob@example.com").await.unwrap();
        assert!(first.processed_text.contains("<EMAIL_1>"));
        assert!(second.processed_text.contains("<EMAIL_2>"));
    }

    #[tokio::test]
    async fn test_restore_round_trip_through_processor() {
        let mut proc = processor(policy(), &[]);
        let text = "Email me at alice@example.com";
        let result = proc.process_text(text).await.unwrap();
        let restored =
            SecurityProcessor::restore_text(&result.processed_text, &result.token_mappings);
        assert_eq!(restored, text);
    }

    #[tokio::test]
    async fn test_audit_events_recorded_when_enabled() {
        let mut policy = policy();
        policy.enable_audit_logging = true;
        let audit = Arc::new(AuditLog::new(100));
        let detector = Arc::new(PiiDetector::new(None, true));
        let rules = [rule("b", "secret", RuleAction::Block, 1)];
        let mut proc =
            SecurityProcessor::new(policy, RuleEngine::new(&rules), detector, "u1", "req-1")
                .with_audit(audit.clone());

        let _ = proc.process_text("secret alice@example.com").await;
        let events: Vec<_> = audit.entries().iter().map(|e| e.event_type.clone()).collect();
        assert!(events.contains(&AuditEventType::PiiDetected));
        assert!(events.contains(&AuditEventType::MessageBlocked));
    }
}
