//! PII entity model and regex detection for veilgate
//!
//! Shared between the gateway's detector fallback path and the security
//! processor:
//! - **Entity model**: `PiiEntityType` and `PiiMatch` with byte-offset spans
//! - **RegexScanner**: built-in pattern set for the entity types the gateway
//!   can detect without the external analyzer
//! - **Span utilities**: overlap resolution and masking

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Confidence assigned to regex matches. The external analyzer returns
/// per-entity scores; the regex path has a single fixed confidence.
pub const REGEX_SCORE: f64 = 0.8;

/// Errors from pattern compilation
#[derive(Error, Debug)]
pub enum PrivacyError {
    #[error("Invalid pattern '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

/// Categories of personally identifiable information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PiiEntityType {
    Email,
    Phone,
    CreditCard,
    Ssn,
    IpAddress,
    Person,
    Location,
    Organization,
    DateTime,
    Url,
    Custom,
}

impl PiiEntityType {
    /// Label used inside anonymization placeholders, e.g. `<EMAIL_1>`
    pub fn placeholder_label(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::CreditCard => "CREDIT_CARD",
            Self::Ssn => "SSN",
            Self::IpAddress => "IP_ADDRESS",
            Self::Person => "PERSON",
            Self::Location => "LOCATION",
            Self::Organization => "ORGANIZATION",
            Self::DateTime => "DATE_TIME",
            Self::Url => "URL",
            Self::Custom => "CUSTOM",
        }
    }

    /// Map an external analyzer entity label to our model.
    ///
    /// The analyzer uses its own vocabulary (`EMAIL_ADDRESS`, `US_SSN`, ...);
    /// anything we do not recognize becomes `Custom` rather than an error.
    pub fn from_service_label(label: &str) -> Self {
        match label {
            "EMAIL" | "EMAIL_ADDRESS" => Self::Email,
            "PHONE" | "PHONE_NUMBER" => Self::Phone,
            "CREDIT_CARD" => Self::CreditCard,
            "SSN" | "US_SSN" => Self::Ssn,
            "IP_ADDRESS" => Self::IpAddress,
            "PERSON" => Self::Person,
            "LOCATION" | "GPE" => Self::Location,
            "ORGANIZATION" | "ORG" => Self::Organization,
            "DATE_TIME" | "DATE" => Self::DateTime,
            "URL" | "DOMAIN_NAME" => Self::Url,
            _ => Self::Custom,
        }
    }
}

impl std::fmt::Display for PiiEntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.placeholder_label())
    }
}

/// A single PII occurrence in a piece of text.
///
/// `start..end` is a half-open byte range into the original text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiMatch {
    pub entity_type: PiiEntityType,
    pub start: usize,
    pub end: usize,
    pub score: f64,
    pub matched_text: String,
}

/// One named detection pattern
struct ScanPattern {
    entity_type: PiiEntityType,
    regex: Regex,
}

/// Regex-based PII scanner.
///
/// Fast, high-precision detection for the structured entity types. Patterns
/// are compiled once at construction; scanning never fails.
pub struct RegexScanner {
    patterns: Vec<ScanPattern>,
}

impl RegexScanner {
    /// Built-in pattern set: EMAIL, PHONE, CREDIT_CARD, SSN, IP_ADDRESS.
    pub fn new() -> Self {
        let builtin = [
            (
                PiiEntityType::Email,
                r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
            ),
            (
                PiiEntityType::Phone,
                r"\b(?:\+?1[-.\s])?\(?\d{3}\)?[-.\s]\d{3}[-.\s]?\d{4}\b",
            ),
            (PiiEntityType::CreditCard, r"\b(?:\d{4}[- ]?){3}\d{4}\b"),
            (PiiEntityType::Ssn, r"\b\d{3}-\d{2}-\d{4}\b"),
            (PiiEntityType::IpAddress, r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
        ];
        let patterns = builtin
            .iter()
            .map(|(entity_type, pattern)| ScanPattern {
                entity_type: *entity_type,
                // Built-in patterns are compile-time constants
                regex: Regex::new(pattern).expect("built-in pattern must compile"),
            })
            .collect();
        Self { patterns }
    }

    /// Add a custom pattern on top of the built-in set.
    pub fn with_pattern(mut self, name: &str, pattern: &str) -> Result<Self, PrivacyError> {
        let regex = Regex::new(pattern).map_err(|source| PrivacyError::InvalidPattern {
            name: name.to_string(),
            source,
        })?;
        self.patterns.push(ScanPattern {
            entity_type: PiiEntityType::Custom,
            regex,
        });
        Ok(self)
    }

    /// Scan text and return all matches, de-overlapped and sorted by `start`.
    pub fn scan(&self, text: &str) -> Vec<PiiMatch> {
        let mut matches = Vec::new();
        for pattern in &self.patterns {
            for m in pattern.regex.find_iter(text) {
                matches.push(PiiMatch {
                    entity_type: pattern.entity_type,
                    start: m.start(),
                    end: m.end(),
                    score: REGEX_SCORE,
                    matched_text: m.as_str().to_string(),
                });
            }
        }
        resolve_overlaps(matches)
    }

    /// Quick check without building the match list
    pub fn contains_pii(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.regex.is_match(text))
    }
}

impl Default for RegexScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve overlapping matches: when two spans intersect, the higher score
/// wins; on equal scores the longer span wins. Output is sorted by `start`.
pub fn resolve_overlaps(mut matches: Vec<PiiMatch>) -> Vec<PiiMatch> {
    matches.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(b.end.cmp(&a.end))
            .then(b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut result: Vec<PiiMatch> = Vec::with_capacity(matches.len());
    for m in matches {
        match result.last() {
            Some(prev) if m.start < prev.end => {
                let better = m.score > prev.score
                    || (m.score == prev.score && (m.end - m.start) > (prev.end - prev.start));
                if better {
                    result.pop();
                    result.push(m);
                }
            }
            _ => result.push(m),
        }
    }
    result
}

/// Mask a span with asterisks, capped at `max_len` characters.
pub fn mask_text(original: &str, max_len: usize) -> String {
    "*".repeat(original.chars().count().min(max_len))
}
