//! Custom tenant-defined matching rules.
//!
//! Rules are evaluated over a pair of lead payloads during bulk candidate
//! scans. A rule applies when every field it names is present on both
//! sides; it matches when every field satisfies its condition. Per-rule
//! weighted scores combine into one value according to the tenant's
//! configured [`RuleCombination`].

use serde_json::Value as JsonValue;
use tracing::warn;

use leadflow_core::{DuplicateRule, RuleCombination, RuleCondition};

use crate::similarity::similarity;

/// Combined outcome of evaluating a tenant's rules over one lead pair.
#[derive(Debug, Clone, Default)]
pub struct RuleOutcome {
    /// Combined 0.0 - 1.0 score over matched rules.
    pub score: f64,
    /// Names of the rules that matched.
    pub matched_rules: Vec<String>,
    /// Number of rules that applied (all named fields present).
    pub evaluated: usize,
}

/// Evaluate all rules over a payload pair.
///
/// Rules whose regex pattern fails to compile are skipped with a warning;
/// config validation rejects them on update, so this only happens for
/// configs stored before validation existed.
pub fn evaluate_rules(
    rules: &[DuplicateRule],
    combination: RuleCombination,
    fuzzy_threshold: f64,
    a: &JsonValue,
    b: &JsonValue,
) -> RuleOutcome {
    let mut outcome = RuleOutcome::default();
    let mut weighted_scores: Vec<f64> = Vec::new();
    let mut evaluated_weight = 0.0;

    for rule in rules {
        let Some(score) = evaluate_rule(rule, fuzzy_threshold, a, b) else {
            continue;
        };
        outcome.evaluated += 1;
        evaluated_weight += rule.weight;
        if score > 0.0 {
            outcome.matched_rules.push(rule.name.clone());
            weighted_scores.push(rule.weight * score);
        }
    }

    outcome.score = match combination {
        RuleCombination::Sum => weighted_scores.iter().sum::<f64>().min(1.0),
        RuleCombination::Max => weighted_scores.iter().cloned().fold(0.0, f64::max),
        RuleCombination::WeightedAverage => {
            if evaluated_weight > 0.0 {
                (weighted_scores.iter().sum::<f64>() / evaluated_weight).min(1.0)
            } else {
                0.0
            }
        }
    };

    outcome
}

/// Score a single rule over the pair.
///
/// `None` when the rule does not apply (a named field is missing on either
/// side, or the pattern is invalid). `Some(0.0)` when it applied but did
/// not match.
fn evaluate_rule(
    rule: &DuplicateRule,
    fuzzy_threshold: f64,
    a: &JsonValue,
    b: &JsonValue,
) -> Option<f64> {
    let mut field_scores = Vec::with_capacity(rule.fields.len());

    for field in &rule.fields {
        let left = string_field(a, field)?;
        let right = string_field(b, field)?;

        let score = match rule.condition {
            RuleCondition::Exact => {
                if left == right {
                    1.0
                } else {
                    return Some(0.0);
                }
            }
            RuleCondition::Fuzzy => {
                let sim = similarity(&left, &right);
                if sim < fuzzy_threshold {
                    return Some(0.0);
                }
                sim
            }
            RuleCondition::Regex => {
                let pattern = rule.pattern.as_deref()?;
                let re = match regex::Regex::new(pattern) {
                    Ok(re) => re,
                    Err(e) => {
                        warn!(
                            rule = %rule.name,
                            error = %e,
                            "Skipping custom rule with invalid pattern"
                        );
                        return None;
                    }
                };
                if re.is_match(&left) && re.is_match(&right) {
                    1.0
                } else {
                    return Some(0.0);
                }
            }
        };
        field_scores.push(score);
    }

    if field_scores.is_empty() {
        return None;
    }
    Some(field_scores.iter().sum::<f64>() / field_scores.len() as f64)
}

/// Lowercased, trimmed string value of a payload field; `None` when the
/// field is absent, non-string, or blank.
pub(crate) fn string_field(payload: &JsonValue, field: &str) -> Option<String> {
    payload
        .get(field)
        .and_then(JsonValue::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}
