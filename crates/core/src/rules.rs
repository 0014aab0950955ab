//! User-defined security rules and the rule engine
//!
//! Rules are regex patterns with an attached action. The engine evaluates
//! every enabled rule against a message and combines the per-rule verdicts
//! into a single action through a strict total order:
//!
//! `Allow < Warn < Anonymize < Redact < Block`
//!
//! The engine never fails: an uncompilable pattern is logged once at
//! construction and the rule is dropped; it does not affect other rules.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

/// Action attached to a rule. Variant order defines the combination
/// lattice: the final action is the maximum over all matching rules.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAction {
    #[default]
    Allow,
    Warn,
    Anonymize,
    Redact,
    Block,
}

/// One user-defined security rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityRule {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Regular-expression source string; must compile to take effect
    pub pattern: String,
    pub action: RuleAction,
    pub enabled: bool,
    pub priority: i32,
}

/// Combined verdict over all matching rules
#[derive(Debug, Clone, Default)]
pub struct RuleVerdict {
    /// Maximum action over all matching rules
    pub action: RuleAction,
    /// Ids of every rule that matched
    pub matched_rules: Vec<String>,
    /// True iff any matching rule's action is Block
    pub blocked: bool,
    /// Human-readable warnings, one per matching rule
    pub warnings: Vec<String>,
}

struct CompiledRule {
    rule: SecurityRule,
    regex: regex::Regex,
}

/// Per-user rule engine with pre-compiled patterns.
///
/// Construction sorts rules by priority descending (stable on ties) and
/// compiles each pattern case-insensitively. Evaluation is pure and
/// side-effect free on the text.
pub struct RuleEngine {
    compiled: Vec<CompiledRule>,
}

impl RuleEngine {
    /// Build an engine from a user's rule list. Disabled rules and rules
    /// whose pattern fails to compile are dropped.
    pub fn new(rules: &[SecurityRule]) -> Self {
        let mut enabled: Vec<&SecurityRule> = rules.iter().filter(|r| r.enabled).collect();
        enabled.sort_by(|a, b| b.priority.cmp(&a.priority));

        let compiled = enabled
            .into_iter()
            .filter_map(|rule| {
                match RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()
                {
                    Ok(regex) => Some(CompiledRule {
                        rule: rule.clone(),
                        regex,
                    }),
                    Err(e) => {
                        tracing::warn!(
                            rule_id = %rule.id,
                            rule_name = %rule.name,
                            "Skipping rule with uncompilable pattern: {}",
                            e
                        );
                        None
                    }
                }
            })
            .collect();

        Self { compiled }
    }

    /// Number of rules that survived compilation
    pub fn rule_count(&self) -> usize {
        self.compiled.len()
    }

    /// Evaluate every rule against the text and combine the verdicts.
    ///
    /// All rules are evaluated even after a Block match: diagnostics require
    /// the complete violation list.
    pub fn evaluate(&self, text: &str) -> RuleVerdict {
        let mut verdict = RuleVerdict::default();

        for compiled in &self.compiled {
            if !compiled.regex.is_match(text) {
                continue;
            }
            let rule = &compiled.rule;
            verdict.matched_rules.push(rule.id.clone());
            verdict.action = verdict.action.max(rule.action);
            verdict.warnings.push(format!("Rule matched: {}", rule.name));
            if rule.action == RuleAction::Block {
                verdict.blocked = true;
                verdict
                    .warnings
                    .push(format!("Blocked by rule: {}", rule.name));
            }
        }

        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_action_lattice_ordering() {
        assert!(RuleAction::Allow < RuleAction::Warn);
        assert!(RuleAction::Warn < RuleAction::Anonymize);
        assert!(RuleAction::Anonymize < RuleAction::Redact);
        assert!(RuleAction::Redact < RuleAction::Block);
    }

    #[test]
    fn test_no_rules_is_allow() {
        let engine = RuleEngine::new(&[]);
        let verdict = engine.evaluate("anything at all");
        assert_eq!(verdict.action, RuleAction::Allow);
        assert!(!verdict.blocked);
        assert!(verdict.matched_rules.is_empty());
        assert!(verdict.warnings.is_empty());
    }

    #[test]
    fn test_final_action_is_maximum() {
        let engine = RuleEngine::new(&[
            rule("1", "secret", RuleAction::Warn, 10),
            rule("2", "secret", RuleAction::Redact, 5),
            rule("3", "secret", RuleAction::Anonymize, 1),
        ]);
        let verdict = engine.evaluate("the secret word");
        assert_eq!(verdict.action, RuleAction::Redact);
        assert_eq!(verdict.matched_rules.len(), 3);
        assert!(!verdict.blocked);
    }

    #[test]
    fn test_block_wins_over_lower_priority() {
        let engine = RuleEngine::new(&[
            rule("warn", "secret", RuleAction::Warn, 10),
            rule("block", "secret", RuleAction::Block, 5),
        ]);
        let verdict = engine.evaluate("the secret word");
        assert_eq!(verdict.action, RuleAction::Block);
        assert!(verdict.blocked);
        // Warnings name both rules plus the block notice
        assert!(verdict.warnings.iter().any(|w| w.contains("rule-warn")));
        assert!(verdict
            .warnings
            .iter()
            .any(|w| w == "Blocked by rule: rule-block"));
    }

    #[test]
    fn test_all_rules_evaluated_after_block() {
        let engine = RuleEngine::new(&[
            rule("b", "alpha", RuleAction::Block, 100),
            rule("w", "beta", RuleAction::Warn, 1),
        ]);
        let verdict = engine.evaluate("alpha and beta");
        assert_eq!(verdict.matched_rules.len(), 2);
        assert!(verdict.blocked);
    }

    #[test]
    fn test_case_insensitive_matching() {
        let engine = RuleEngine::new(&[rule("1", "confidential", RuleAction::Warn, 0)]);
        let verdict = engine.evaluate("This is CONFIDENTIAL material");
        assert_eq!(verdict.matched_rules.len(), 1);
    }

    #[test]
    fn test_disabled_rules_skipped() {
        let mut disabled = rule("1", "secret", RuleAction::Block, 0);
        disabled.enabled = false;
        let engine = RuleEngine::new(&[disabled]);
        let verdict = engine.evaluate("the secret word");
        assert!(verdict.matched_rules.is_empty());
        assert!(!verdict.blocked);
    }

    #[test]
    fn test_uncompilable_pattern_dropped_others_fire() {
        let engine = RuleEngine::new(&[
            rule("bad", "[unclosed", RuleAction::Block, 10),
            rule("good", "secret", RuleAction::Warn, 5),
        ]);
        assert_eq!(engine.rule_count(), 1);
        let verdict = engine.evaluate("the secret word");
        assert_eq!(verdict.action, RuleAction::Warn);
        assert_eq!(verdict.matched_rules, vec!["good".to_string()]);
    }

    #[test]
    fn test_priority_tie_preserves_insertion_order() {
        let engine = RuleEngine::new(&[
            rule("first", "x", RuleAction::Warn, 5),
            rule("second", "x", RuleAction::Warn, 5),
        ]);
        let verdict = engine.evaluate("x marks the spot");
        assert_eq!(
            verdict.matched_rules,
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[test]
    fn test_evaluation_is_pure() {
        let engine = RuleEngine::new(&[rule("1", "secret", RuleAction::Warn, 0)]);
        let first = engine.evaluate("a secret thing");
        let second = engine.evaluate("a secret thing");
        assert_eq!(first.action, second.action);
        assert_eq!(first.matched_rules, second.matched_rules);
        assert_eq!(first.warnings, second.warnings);
    }

    #[test]
    fn test_non_matching_rule_contributes_nothing() {
        let engine = RuleEngine::new(&[
            rule("1", "zebra", RuleAction::Block, 10),
            rule("2", "hello", RuleAction::Warn, 0),
        ]);
        let verdict = engine.evaluate("hello world");
        assert_eq!(verdict.action, RuleAction::Warn);
        assert!(!verdict.blocked);
    }

    #[test]
    fn test_rule_serde_round_trip() {
        let r = rule("1", "secret", RuleAction::Anonymize, 3);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"ANONYMIZE\""));
        assert!(json.contains("\"userId\""));
        let parsed: SecurityRule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.action, RuleAction::Anonymize);
        assert_eq!(parsed.priority, 3);
    }
}
