//! Reversible token mapping for anonymized spans
//!
//! A `TokenMapper` lives for a single request. It hands out placeholders
//! that are unique across every message of that request, remembers the
//! placeholder ↔ original pairing, and performs the reverse substitution on
//! the provider's response. Mappings are never cached, persisted, or shared
//! across requests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use veilgate_privacy::{PiiEntityType, PiiMatch};

/// One anonymized span: the placeholder inserted into the outbound text and
/// the original substring it stands for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMapping {
    /// Opaque id, unique within a request
    pub id: String,
    pub original: String,
    /// Placeholder inserted into the text, e.g. `<EMAIL_1>`
    pub anonymized: String,
    pub entity_type: PiiEntityType,
}

/// Request-scoped placeholder allocator and substitution engine.
#[derive(Debug, Default)]
pub struct TokenMapper {
    /// Per-entity-type counters spanning all messages of the request, so a
    /// placeholder issued for message 3 never collides with message 1.
    counters: HashMap<PiiEntityType, usize>,
}

impl TokenMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next placeholder for an entity type, e.g. `<PHONE_2>`.
    fn next_placeholder(&mut self, entity_type: PiiEntityType) -> String {
        let counter = self.counters.entry(entity_type).or_insert(0);
        *counter += 1;
        format!("<{}_{}>", entity_type.placeholder_label(), counter)
    }

    /// Allocate a mapping for one span: fresh placeholder, remembered pairing.
    pub fn allocate(&mut self, entity_type: PiiEntityType, original: &str) -> TokenMapping {
        TokenMapping {
            id: Uuid::new_v4().to_string(),
            original: original.to_string(),
            anonymized: self.next_placeholder(entity_type),
            entity_type,
        }
    }

    /// Replace each matched span with a fresh placeholder.
    ///
    /// Placeholders are numbered in order of appearance; replacements are
    /// applied right-to-left (spans sorted by `start` descending) so earlier
    /// replacements do not shift the offsets of later ones. Matches must be
    /// non-overlapping; callers de-overlap first.
    pub fn anonymize(&mut self, text: &str, matches: &[PiiMatch]) -> (String, Vec<TokenMapping>) {
        let mut ordered: Vec<&PiiMatch> = matches.iter().collect();
        ordered.sort_by_key(|m| m.start);

        // Assign placeholders in reading order
        let mut mappings: Vec<TokenMapping> = ordered
            .iter()
            .map(|m| self.allocate(m.entity_type, &text[m.start..m.end]))
            .collect();

        let result = Self::substitute(text, &ordered, &mappings);

        // Drop mappings whose span vanished (zero-width defensive case)
        mappings.retain(|m| !m.original.is_empty());

        (result, mappings)
    }

    /// Apply placeholder substitutions right-to-left. `ordered` must be
    /// sorted by `start` ascending and aligned index-wise with `mappings`.
    pub(crate) fn substitute(text: &str, ordered: &[&PiiMatch], mappings: &[TokenMapping]) -> String {
        let mut result = text.to_string();
        for (m, mapping) in ordered.iter().zip(mappings.iter()).rev() {
            result.replace_range(m.start..m.end, &mapping.anonymized);
        }
        result
    }

    /// Reverse substitution: replace every occurrence of each placeholder
    /// with its original value. Placeholders the model paraphrased away are
    /// silently dropped. Never fails; the worst case is the input text
    /// returned unchanged.
    pub fn restore(text: &str, mappings: &[TokenMapping]) -> String {
        let mut result = text.to_string();
        for mapping in mappings {
            if result.contains(&mapping.anonymized) {
                result = result.replace(&mapping.anonymized, &mapping.original);
            }
        }
        result
    }
}
