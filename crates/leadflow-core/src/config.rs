//! Tenant-scoped duplicate detection configuration.
//!
//! A config is an immutable value: fetched once per operation through the
//! [`ConfigStore`](crate::ConfigStore) trait and threaded explicitly through
//! the call. Updates replace the whole object; there is no in-place
//! mutation, so concurrent readers never observe a partial update.

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};

/// Matching condition for a custom tenant rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCondition {
    /// Values must be equal after lowercasing and trimming.
    Exact,
    /// Similarity of the values must reach the config's fuzzy threshold.
    Fuzzy,
    /// Both values must match the rule's `pattern`.
    Regex,
}

/// How per-rule weighted scores combine into one similarity score when
/// multiple custom rules match the same lead pair.
///
/// The upstream system left this unspecified, so the choice is explicit
/// configuration rather than a hard-coded formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleCombination {
    /// Sum of `weight * score` over matching rules, clamped to 1.0.
    Sum,
    /// Highest single `weight * score` wins.
    Max,
    /// Sum of `weight * score` divided by the sum of weights of all
    /// evaluated rules. Weights act as importance factors.
    #[default]
    WeightedAverage,
}

/// A tenant-defined matching rule evaluated by the bulk candidate scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateRule {
    pub name: String,
    /// Payload attributes this rule compares.
    pub fields: Vec<String>,
    /// 0.0 - 1.0 importance of this rule.
    pub weight: f64,
    pub condition: RuleCondition,
    /// Required when `condition` is Regex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Tenant-scoped duplicate detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateDetectionConfig {
    /// Master switch; detection returns no candidates when false.
    pub enabled: bool,
    /// Minimum confidence for a lead to count as a candidate.
    pub threshold: f64,
    /// Payload attributes compared by the bulk field-by-field scan.
    pub fields_to_compare: Vec<String>,
    pub fuzzy_matching_enabled: bool,
    /// Minimum string similarity for a fuzzy field match.
    pub fuzzy_threshold: f64,
    pub auto_merge_enabled: bool,
    pub notification_enabled: bool,
    #[serde(default)]
    pub custom_rules: Vec<DuplicateRule>,
    #[serde(default)]
    pub rule_combination: RuleCombination,
}

impl Default for DuplicateDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: defaults::DETECTION_THRESHOLD,
            fields_to_compare: defaults::FIELDS_TO_COMPARE
                .iter()
                .map(|s| s.to_string())
                .collect(),
            fuzzy_matching_enabled: true,
            fuzzy_threshold: defaults::FUZZY_THRESHOLD,
            auto_merge_enabled: false,
            notification_enabled: true,
            custom_rules: Vec::new(),
            rule_combination: RuleCombination::default(),
        }
    }
}

impl DuplicateDetectionConfig {
    /// Validate value ranges and custom rule shapes.
    ///
    /// Called on every config update; a config that fails validation is
    /// rejected before it reaches the store.
    pub fn validate(&self) -> Result<()> {
        validate_unit_range("threshold", self.threshold)?;
        validate_unit_range("fuzzy_threshold", self.fuzzy_threshold)?;

        for rule in &self.custom_rules {
            if rule.name.trim().is_empty() {
                return Err(Error::InvalidInput(
                    "custom rule name must not be empty".to_string(),
                ));
            }
            if rule.fields.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "custom rule '{}' must name at least one field",
                    rule.name
                )));
            }
            validate_unit_range(&format!("custom rule '{}' weight", rule.name), rule.weight)?;

            match rule.condition {
                RuleCondition::Regex => {
                    let pattern = rule.pattern.as_deref().ok_or_else(|| {
                        Error::InvalidInput(format!(
                            "custom rule '{}' uses regex condition but has no pattern",
                            rule.name
                        ))
                    })?;
                    regex::Regex::new(pattern).map_err(|e| {
                        Error::InvalidInput(format!(
                            "custom rule '{}' pattern does not compile: {e}",
                            rule.name
                        ))
                    })?;
                }
                RuleCondition::Exact | RuleCondition::Fuzzy => {}
            }
        }

        Ok(())
    }
}

fn validate_unit_range(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        return Err(Error::InvalidInput(format!(
            "{name} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}
