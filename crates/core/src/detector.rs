//! PII detection
//!
//! Primary path: the external analyze/anonymize services over HTTP.
//! Fallback path: the built-in regex scanner from `veilgate-privacy`,
//! used when the services are unreachable and `fallback_to_regex` is set.
//!
//! The backend is a trait so the pipeline is testable with in-memory fakes.

use crate::error::{GatewayError, Result};
use crate::tokens::{TokenMapper, TokenMapping};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use veilgate_privacy::{resolve_overlaps, PiiEntityType, PiiMatch, RegexScanner};

/// Default language passed to the analyzer
const DEFAULT_LANGUAGE: &str = "en";

/// External analyze/anonymize service interface.
#[async_trait]
pub trait AnalyzeBackend: Send + Sync {
    /// Detect PII entities in the text.
    async fn analyze(&self, text: &str, language: &str) -> Result<Vec<PiiMatch>>;

    /// Anonymize the text, replacing `matches[i]` with `replacements[i]`.
    /// Returns the transformed text.
    async fn anonymize(
        &self,
        text: &str,
        matches: &[PiiMatch],
        replacements: &[String],
    ) -> Result<String>;
}

// ============================================================================
// HTTP backend
// ============================================================================

/// Wire shape of one analyzer entity
#[derive(Debug, Deserialize)]
struct AnalyzerEntity {
    entity_type: String,
    start: usize,
    end: usize,
    score: f64,
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
    language: &'a str,
}

#[derive(Debug, Serialize)]
struct AnonymizerResult<'a> {
    entity_type: &'a str,
    start: usize,
    end: usize,
    score: f64,
    /// Replacement the anonymizer must insert for this entity
    replacement: &'a str,
}

#[derive(Debug, Serialize)]
struct AnonymizeRequest<'a> {
    text: &'a str,
    analyzer_results: Vec<AnonymizerResult<'a>>,
}

#[derive(Debug, Deserialize)]
struct AnonymizeResponse {
    text: String,
}

/// Client for the external analyzer and anonymizer services.
pub struct HttpAnalyzeBackend {
    analyzer_url: String,
    anonymizer_url: String,
    client: reqwest::Client,
}

impl HttpAnalyzeBackend {
    pub fn new(analyzer_url: impl Into<String>, anonymizer_url: impl Into<String>) -> Self {
        Self {
            analyzer_url: analyzer_url.into(),
            anonymizer_url: anonymizer_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AnalyzeBackend for HttpAnalyzeBackend {
    async fn analyze(&self, text: &str, language: &str) -> Result<Vec<PiiMatch>> {
        let url = format!("{}/analyze", self.analyzer_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&AnalyzeRequest { text, language })
            .send()
            .await
            .map_err(|e| GatewayError::PiiDetection(format!("analyzer unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(GatewayError::PiiDetection(format!(
                "analyzer returned {}",
                response.status()
            )));
        }

        let entities: Vec<AnalyzerEntity> = response
            .json()
            .await
            .map_err(|e| GatewayError::PiiDetection(format!("invalid analyzer response: {}", e)))?;

        let matches = entities
            .into_iter()
            .filter(|e| {
                e.start < e.end
                    && e.end <= text.len()
                    && text.is_char_boundary(e.start)
                    && text.is_char_boundary(e.end)
            })
            .map(|e| PiiMatch {
                entity_type: PiiEntityType::from_service_label(&e.entity_type),
                start: e.start,
                end: e.end,
                score: e.score,
                matched_text: text[e.start..e.end].to_string(),
            })
            .collect();

        Ok(matches)
    }

    async fn anonymize(
        &self,
        text: &str,
        matches: &[PiiMatch],
        replacements: &[String],
    ) -> Result<String> {
        let url = format!("{}/anonymize", self.anonymizer_url.trim_end_matches('/'));
        let analyzer_results = matches
            .iter()
            .zip(replacements.iter())
            .map(|(m, replacement)| AnonymizerResult {
                entity_type: m.entity_type.placeholder_label(),
                start: m.start,
                end: m.end,
                score: m.score,
                replacement,
            })
            .collect();

        let response = self
            .client
            .post(&url)
            .json(&AnonymizeRequest {
                text,
                analyzer_results,
            })
            .send()
            .await
            .map_err(|e| GatewayError::PiiDetection(format!("anonymizer unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(GatewayError::PiiDetection(format!(
                "anonymizer returned {}",
                response.status()
            )));
        }

        let body: AnonymizeResponse = response.json().await.map_err(|e| {
            GatewayError::PiiDetection(format!("invalid anonymizer response: {}", e))
        })?;
        Ok(body.text)
    }
}

// ============================================================================
// Detector
// ============================================================================

/// Outcome of a detection pass
#[derive(Debug, Clone)]
pub struct DetectOutcome {
    /// De-overlapped matches sorted by `start` ascending
    pub matches: Vec<PiiMatch>,
    /// True when the regex fallback produced the matches
    pub used_fallback: bool,
}

/// PII detector with external primary path and regex fallback.
pub struct PiiDetector {
    backend: Option<Arc<dyn AnalyzeBackend>>,
    fallback_to_regex: bool,
    scanner: RegexScanner,
    language: String,
}

impl PiiDetector {
    pub fn new(backend: Option<Arc<dyn AnalyzeBackend>>, fallback_to_regex: bool) -> Self {
        Self {
            backend,
            fallback_to_regex,
            scanner: RegexScanner::new(),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Detect PII in the text.
    ///
    /// When the external analyzer fails and `fallback_to_regex` is set, the
    /// built-in scanner takes over with a warning; otherwise the failure
    /// propagates as `PiiDetection`.
    pub async fn detect(&self, text: &str) -> Result<DetectOutcome> {
        let Some(backend) = &self.backend else {
            return Ok(DetectOutcome {
                matches: self.scanner.scan(text),
                used_fallback: true,
            });
        };

        match backend.analyze(text, &self.language).await {
            Ok(matches) => {
                let mut matches = resolve_overlaps(matches);
                matches.sort_by_key(|m| m.start);
                Ok(DetectOutcome {
                    matches,
                    used_fallback: false,
                })
            }
            Err(e) if self.fallback_to_regex => {
                tracing::warn!("PII analyzer failed, using regex fallback: {}", e);
                Ok(DetectOutcome {
                    matches: self.scanner.scan(text),
                    used_fallback: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Anonymize the detected spans, recording one `TokenMapping` per span.
    ///
    /// The service path sends our pre-allocated placeholders as the policy;
    /// if the service fails (or detection already fell back), the same
    /// placeholders are applied locally, so the mapping list is identical on
    /// both paths.
    pub async fn anonymize(
        &self,
        text: &str,
        outcome: &DetectOutcome,
        mapper: &mut TokenMapper,
    ) -> Result<(String, Vec<TokenMapping>)> {
        if outcome.matches.is_empty() {
            return Ok((text.to_string(), Vec::new()));
        }

        let mut ordered: Vec<&PiiMatch> = outcome.matches.iter().collect();
        ordered.sort_by_key(|m| m.start);

        let mappings: Vec<TokenMapping> = ordered
            .iter()
            .map(|m| mapper.allocate(m.entity_type, &text[m.start..m.end]))
            .collect();
        let replacements: Vec<String> = mappings.iter().map(|m| m.anonymized.clone()).collect();

        if let (Some(backend), false) = (&self.backend, outcome.used_fallback) {
            let sorted: Vec<PiiMatch> = ordered.iter().map(|m| (*m).clone()).collect();
            match backend.anonymize(text, &sorted, &replacements).await {
                Ok(anonymized) => return Ok((anonymized, mappings)),
                Err(e) if self.fallback_to_regex => {
                    tracing::warn!("PII anonymizer failed, substituting locally: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        let anonymized = TokenMapper::substitute(text, &ordered, &mappings);
        Ok((anonymized, mappings))
    }

    /// Reverse substitution on a response. Never fails.
    pub fn restore(text: &str, mappings: &[TokenMapping]) -> String {
        TokenMapper::restore(text, mappings)
    }
}
