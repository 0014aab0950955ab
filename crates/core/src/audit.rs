//! Security audit logging
//!
//! Bounded in-memory log of pipeline events: PII detection, rule matches,
//! blocked messages, detector fallbacks, response restoration. Recording is
//! gated by the per-user `enable_audit_logging` flag; entries carry the
//! request id so they can be correlated with traces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::RwLock;

/// Types of auditable pipeline events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// PII entities were detected in a message
    PiiDetected,
    /// One or more security rules matched
    RuleMatched,
    /// A message was blocked by policy
    MessageBlocked,
    /// The external detector failed and the regex fallback ran
    DetectorFallback,
    /// Placeholders were restored in a provider response
    ResponseRestored,
    /// A usage record was emitted to the control plane
    UsageRecorded,
}

/// Action the pipeline took for the event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Allowed,
    Anonymized,
    Redacted,
    Blocked,
    Logged,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub request_id: String,
    pub event_type: AuditEventType,
    pub details: String,
    pub action_taken: AuditAction,
}

/// Thread-safe audit log with bounded capacity
pub struct AuditLog {
    entries: RwLock<VecDeque<AuditEntry>>,
    max_entries: usize,
}

impl AuditLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries,
        }
    }

    /// Append an entry, evicting the oldest when at capacity.
    pub fn record(&self, entry: AuditEntry) {
        let Ok(mut entries) = self.entries.write() else {
            tracing::error!("Audit log lock poisoned, dropping audit entry");
            return;
        };
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .read()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn entries_for_user(&self, user_id: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .map(|e| {
                e.iter()
                    .filter(|entry| entry.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().map(|e| e.is_empty()).unwrap_or(true)
    }
}
