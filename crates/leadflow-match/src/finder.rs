//! Candidate finder: runs the strategy cascade against the lead store.
//!
//! Detection is a best-effort enhancement, never a blocking dependency for
//! lead ingestion: store failures and slow scans degrade to "no duplicate
//! found" (logged at WARN), they never propagate. Merges are the opposite
//! and live in the engine crate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value as JsonValue};
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use leadflow_core::{
    defaults, ConfigStore, DedupNotifier, DuplicateCandidate, DuplicateDetectionConfig, Error,
    LeadLookup, LeadRecord, Result,
};

use crate::normalize::NormalizedAttributes;
use crate::rules::{evaluate_rules, string_field};
use crate::similarity::similarity;
use crate::strategy::{default_cascade, MatchStrategy, StrategyHit, STRATEGY_NONE_FOUND};

/// Finds duplicate candidates for a lead within its tenant.
///
/// Dependencies are explicit constructor parameters; the config is fetched
/// once per operation and threaded through the call as an immutable value.
pub struct DuplicateFinder {
    lookup: Arc<dyn LeadLookup>,
    config_store: Arc<dyn ConfigStore>,
    notifier: Arc<dyn DedupNotifier>,
    strategies: Vec<Box<dyn MatchStrategy>>,
    lookup_timeout: Duration,
}

impl DuplicateFinder {
    /// Create a finder with the default strategy cascade.
    pub fn new(
        lookup: Arc<dyn LeadLookup>,
        config_store: Arc<dyn ConfigStore>,
        notifier: Arc<dyn DedupNotifier>,
    ) -> Self {
        Self {
            lookup,
            config_store,
            notifier,
            strategies: default_cascade(),
            lookup_timeout: Duration::from_millis(defaults::LOOKUP_TIMEOUT_MS),
        }
    }

    /// Replace the strategy cascade (test seam, custom deployments).
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn MatchStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Override the per-strategy lookup timeout.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Tenant config, falling back to defaults when the store misbehaves.
    /// Detection must keep working while the settings store is degraded.
    async fn config(&self, tenant_id: Uuid) -> DuplicateDetectionConfig {
        match self.config_store.get_duplicate_config(tenant_id).await {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    subsystem = "match",
                    component = "finder",
                    %tenant_id,
                    error = %e,
                    "Failed to load tenant config, using defaults"
                );
                DuplicateDetectionConfig::default()
            }
        }
    }

    async fn record_strategy(&self, tenant_id: Uuid, strategy: &str, elapsed: Duration) {
        debug!(
            subsystem = "match",
            component = "cascade",
            op = "find_duplicate",
            %tenant_id,
            strategy,
            duration_ms = elapsed.as_millis() as u64,
            "Cascade resolved"
        );
        self.notifier.on_strategy_resolved(tenant_id, strategy).await;
    }

    /// Run one strategy with the lookup timeout, degrading every failure
    /// mode to "no candidates".
    async fn run_strategy(
        &self,
        strategy: &dyn MatchStrategy,
        tenant_id: Uuid,
        attrs: &NormalizedAttributes,
        config: &DuplicateDetectionConfig,
    ) -> Vec<StrategyHit> {
        let fut = strategy.find_candidates(self.lookup.as_ref(), tenant_id, attrs, config);
        match timeout(self.lookup_timeout, fut).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!(
                    subsystem = "match",
                    component = "cascade",
                    %tenant_id,
                    strategy = strategy.name(),
                    error = %e,
                    "Strategy lookup failed, treating as no match"
                );
                Vec::new()
            }
            Err(_) => {
                warn!(
                    subsystem = "match",
                    component = "cascade",
                    %tenant_id,
                    strategy = strategy.name(),
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "Strategy lookup timed out, treating as no match"
                );
                Vec::new()
            }
        }
    }

    /// Find the single most likely duplicate for an incoming payload.
    ///
    /// Ordered cascade, first hit wins; exact email beats any fuzzy score.
    /// Returns `Ok(None)` without touching the store when the payload has
    /// no identifying field. Every invocation reports the resolving
    /// strategy (including `none_found`) through the notifier.
    pub async fn find_duplicate(
        &self,
        tenant_id: Uuid,
        payload: &JsonValue,
    ) -> Result<Option<LeadRecord>> {
        let start = Instant::now();
        let attrs = NormalizedAttributes::from_payload(payload);
        if !attrs.has_identifying_field() {
            self.record_strategy(tenant_id, STRATEGY_NONE_FOUND, start.elapsed())
                .await;
            return Ok(None);
        }

        let config = self.config(tenant_id).await;
        if !config.enabled {
            self.record_strategy(tenant_id, STRATEGY_NONE_FOUND, start.elapsed())
                .await;
            return Ok(None);
        }

        for strategy in &self.strategies {
            if !strategy.applicable(&attrs, &config) {
                continue;
            }
            let hits = self
                .run_strategy(strategy.as_ref(), tenant_id, &attrs, &config)
                .await;
            if let Some(hit) = hits.into_iter().next() {
                self.record_strategy(tenant_id, strategy.name(), start.elapsed())
                    .await;
                return Ok(Some(hit.lead));
            }
        }

        self.record_strategy(tenant_id, STRATEGY_NONE_FOUND, start.elapsed())
            .await;
        Ok(None)
    }

    /// Find every duplicate candidate at or above `threshold`.
    ///
    /// Unlike the cascade, this runs all applicable strategies plus the
    /// tenant's custom rules, deduplicates by lead id, and returns
    /// candidates sorted by descending similarity. `exclude_lead_id` keeps
    /// a lead from matching itself when scanning an already-stored record.
    pub async fn find_duplicates(
        &self,
        tenant_id: Uuid,
        payload: &JsonValue,
        threshold: f64,
        exclude_lead_id: Option<Uuid>,
    ) -> Result<Vec<DuplicateCandidate>> {
        if !(0.0..=1.0).contains(&threshold) || threshold.is_nan() {
            return Err(Error::InvalidInput(format!(
                "threshold must be between 0.0 and 1.0, got {threshold}"
            )));
        }

        let attrs = NormalizedAttributes::from_payload(payload);
        if !attrs.has_identifying_field() {
            return Ok(Vec::new());
        }

        let config = self.config(tenant_id).await;
        if !config.enabled {
            return Ok(Vec::new());
        }

        // Collect hits across every applicable strategy, deduplicated by
        // lead id, keeping the best strategy score per lead.
        let mut discovered: HashMap<Uuid, (LeadRecord, f64, Vec<String>, Vec<&'static str>)> =
            HashMap::new();
        for strategy in &self.strategies {
            if !strategy.applicable(&attrs, &config) {
                continue;
            }
            let hits = self
                .run_strategy(strategy.as_ref(), tenant_id, &attrs, &config)
                .await;
            for hit in hits {
                if Some(hit.lead.id) == exclude_lead_id {
                    continue;
                }
                let entry = discovered.entry(hit.lead.id).or_insert_with(|| {
                    (hit.lead.clone(), 0.0, Vec::new(), Vec::new())
                });
                entry.1 = entry.1.max(hit.similarity);
                for field in hit.matched_fields {
                    if !entry.2.contains(&field) {
                        entry.2.push(field);
                    }
                }
                entry.3.push(strategy.name());
            }
        }

        let mut candidates = Vec::with_capacity(discovered.len());
        for (lead_id, (lead, strategy_score, mut matched_fields, strategies)) in discovered {
            let (field_score, field_details) =
                score_fields(payload, &lead, &config, &mut matched_fields);
            let rules = evaluate_rules(
                &config.custom_rules,
                config.rule_combination,
                config.fuzzy_threshold,
                payload,
                &lead.payload,
            );

            let similarity_score = strategy_score.max(field_score);
            let confidence_score = similarity_score.max(rules.score);
            if confidence_score < threshold {
                continue;
            }

            let candidate = DuplicateCandidate {
                lead_id,
                similarity_score,
                confidence_score,
                matched_fields,
                details: json!({
                    "strategies": strategies,
                    "fields": field_details,
                    "rules": {
                        "score": rules.score,
                        "matched": rules.matched_rules,
                        "evaluated": rules.evaluated,
                    },
                }),
            };
            if config.notification_enabled {
                self.notifier
                    .on_duplicate_found(tenant_id, lead_id, &candidate)
                    .await;
            }
            candidates.push(candidate);
        }

        // Descending similarity; lead id breaks ties so the output is
        // deterministic for a given input.
        candidates.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.lead_id.cmp(&b.lead_id))
        });

        debug!(
            subsystem = "match",
            component = "finder",
            op = "find_duplicates",
            %tenant_id,
            candidate_count = candidates.len(),
            "Bulk candidate scan complete"
        );

        Ok(candidates)
    }

    /// Bulk-scan convenience for an already-stored lead: loads it, then
    /// runs [`find_duplicates`](Self::find_duplicates) with the lead
    /// excluded from its own candidate set.
    pub async fn find_duplicates_for_lead(
        &self,
        tenant_id: Uuid,
        lead_id: Uuid,
        threshold: f64,
    ) -> Result<Vec<DuplicateCandidate>> {
        let lead = self
            .lookup
            .find_by_id(tenant_id, lead_id)
            .await?
            .ok_or(Error::LeadNotFound(lead_id))?;
        self.find_duplicates(tenant_id, &lead.payload, threshold, Some(lead_id))
            .await
    }
}

/// Field-by-field similarity over the configured compare fields.
///
/// Mirrors exact/fuzzy per-field scoring: a field contributes only when
/// both sides carry a value; the aggregate is the mean over comparable
/// fields. Matched fields are appended to `matched_fields` (deduplicated).
fn score_fields(
    payload: &JsonValue,
    lead: &LeadRecord,
    config: &DuplicateDetectionConfig,
    matched_fields: &mut Vec<String>,
) -> (f64, JsonValue) {
    let mut total = 0.0;
    let mut comparable = 0u32;
    let mut details = serde_json::Map::new();

    for field in &config.fields_to_compare {
        let (Some(left), Some(right)) = (
            string_field(payload, field),
            string_field(&lead.payload, field),
        ) else {
            continue;
        };
        comparable += 1;

        let field_score = if config.fuzzy_matching_enabled {
            let sim = similarity(&left, &right);
            if sim >= config.fuzzy_threshold {
                sim
            } else {
                0.0
            }
        } else if left == right {
            1.0
        } else {
            0.0
        };

        if field_score > 0.0 && !matched_fields.contains(field) {
            matched_fields.push(field.clone());
        }
        total += field_score;
        details.insert(field.clone(), json!({ "score": field_score }));
    }

    let score = if comparable > 0 {
        total / comparable as f64
    } else {
        0.0
    };
    (score, JsonValue::Object(details))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use leadflow_core::LeadStatus;
    use serde_json::json;
    use std::sync::Mutex;

    /// Lookup over a flat list of leads, indexing by normalized fields the
    /// way the real store does.
    struct ListLookup {
        leads: Vec<LeadRecord>,
        fail: bool,
    }

    impl ListLookup {
        fn new(leads: Vec<LeadRecord>) -> Self {
            Self { leads, fail: false }
        }

        fn failing() -> Self {
            Self {
                leads: Vec::new(),
                fail: true,
            }
        }

        fn normalized(lead: &LeadRecord, field: &str) -> Option<String> {
            let raw = lead.field(field)?;
            match field {
                "email" => crate::normalize::normalize_email(raw),
                "phone" => crate::normalize::normalize_phone(raw),
                "postal_code" => crate::normalize::normalize_postal_code(raw),
                _ => Some(raw.to_lowercase()),
            }
        }

        fn matching(&self, tenant_id: Uuid, field: &str, value: &str) -> Vec<LeadRecord> {
            let mut matches: Vec<LeadRecord> = self
                .leads
                .iter()
                .filter(|l| l.tenant_id == tenant_id)
                .filter(|l| Self::normalized(l, field).as_deref() == Some(value))
                .cloned()
                .collect();
            // Newest first, the ordering the trait contract promises.
            matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            matches
        }
    }

    #[async_trait]
    impl LeadLookup for ListLookup {
        async fn find_by_id(&self, tenant_id: Uuid, lead_id: Uuid) -> Result<Option<LeadRecord>> {
            if self.fail {
                return Err(Error::Store("lookup down".into()));
            }
            Ok(self
                .leads
                .iter()
                .find(|l| l.tenant_id == tenant_id && l.id == lead_id)
                .cloned())
        }

        async fn find_by_exact_field(
            &self,
            tenant_id: Uuid,
            field: &str,
            value: &str,
        ) -> Result<Vec<LeadRecord>> {
            if self.fail {
                return Err(Error::Store("lookup down".into()));
            }
            Ok(self.matching(tenant_id, field, value))
        }

        async fn find_by_field(
            &self,
            tenant_id: Uuid,
            field: &str,
            value: &str,
        ) -> Result<Vec<LeadRecord>> {
            self.find_by_exact_field(tenant_id, field, value).await
        }
    }

    /// Config store returning a fixed config.
    struct FixedConfig(DuplicateDetectionConfig);

    #[async_trait]
    impl ConfigStore for FixedConfig {
        async fn get_duplicate_config(&self, _tenant_id: Uuid) -> Result<DuplicateDetectionConfig> {
            Ok(self.0.clone())
        }

        async fn put_duplicate_config(
            &self,
            _tenant_id: Uuid,
            _config: &DuplicateDetectionConfig,
        ) -> Result<()> {
            Ok(())
        }
    }

    /// Notifier that records strategy signals.
    #[derive(Default)]
    struct RecordingNotifier {
        strategies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DedupNotifier for RecordingNotifier {
        async fn on_strategy_resolved(&self, _tenant_id: Uuid, strategy: &str) {
            self.strategies.lock().unwrap().push(strategy.to_string());
        }
        async fn on_duplicate_found(
            &self,
            _tenant_id: Uuid,
            _lead_id: Uuid,
            _candidate: &DuplicateCandidate,
        ) {
        }
        async fn on_group_created(&self, _group: &leadflow_core::DuplicateGroup) {}
        async fn on_merge_completed(&self, _operation: &leadflow_core::MergeOperation) {}
        async fn on_merge_failed(&self, _source_id: Uuid, _target_id: Uuid, _error: &str) {}
    }

    fn lead(tenant_id: Uuid, payload: JsonValue, age_minutes: i64) -> LeadRecord {
        let now = Utc::now();
        LeadRecord {
            id: Uuid::new_v4(),
            tenant_id,
            payload,
            status: LeadStatus::Active,
            merged_into: None,
            version: 1,
            created_at: now - ChronoDuration::minutes(age_minutes),
            updated_at: now,
        }
    }

    fn finder_with(
        leads: Vec<LeadRecord>,
        config: DuplicateDetectionConfig,
        notifier: Arc<RecordingNotifier>,
    ) -> DuplicateFinder {
        DuplicateFinder::new(
            Arc::new(ListLookup::new(leads)),
            Arc::new(FixedConfig(config)),
            notifier,
        )
    }

    #[tokio::test]
    async fn test_empty_payload_returns_none_without_store_access() {
        let notifier = Arc::new(RecordingNotifier::default());
        let finder = DuplicateFinder::new(
            Arc::new(ListLookup::failing()),
            Arc::new(FixedConfig(DuplicateDetectionConfig::default())),
            notifier.clone(),
        );

        // A failing lookup would error if touched; the empty payload must
        // short-circuit before that.
        let result = finder
            .find_duplicate(Uuid::new_v4(), &json!({}))
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(
            *notifier.strategies.lock().unwrap(),
            vec![STRATEGY_NONE_FOUND.to_string()]
        );
    }

    #[tokio::test]
    async fn test_email_exact_wins_over_fuzzy() {
        let tenant = Uuid::new_v4();
        // Same email, different name: resolves via email_exact.
        let email_match = lead(
            tenant,
            json!({"email": "jane@firm.dk", "name": "Different Person"}),
            30,
        );
        // Near-perfect name/address match that a fuzzy strategy would score
        // higher than any cascade position below email.
        let fuzzy_match = lead(
            tenant,
            json!({"name": "Jane Smith", "address": "Main St 1", "postal_code": "2100"}),
            40,
        );

        let notifier = Arc::new(RecordingNotifier::default());
        let finder = finder_with(
            vec![email_match.clone(), fuzzy_match],
            DuplicateDetectionConfig::default(),
            notifier.clone(),
        );

        let found = finder
            .find_duplicate(
                tenant,
                &json!({
                    "email": "Jane@Firm.dk",
                    "name": "Jane Smith",
                    "address": "Main St 1",
                    "postal_code": "2100",
                }),
            )
            .await
            .unwrap();

        assert_eq!(found.unwrap().id, email_match.id);
        assert_eq!(
            *notifier.strategies.lock().unwrap(),
            vec!["email_exact".to_string()]
        );
    }

    #[tokio::test]
    async fn test_exact_email_tie_break_newest_wins() {
        let tenant = Uuid::new_v4();
        let older = lead(tenant, json!({"email": "dup@firm.dk"}), 120);
        let newer = lead(tenant, json!({"email": "dup@firm.dk"}), 5);

        let notifier = Arc::new(RecordingNotifier::default());
        let finder = finder_with(
            vec![older, newer.clone()],
            DuplicateDetectionConfig::default(),
            notifier,
        );

        let found = finder
            .find_duplicate(tenant, &json!({"email": "dup@firm.dk"}))
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, newer.id);
    }

    #[tokio::test]
    async fn test_cascade_falls_through_to_phone() {
        let tenant = Uuid::new_v4();
        let phone_match = lead(tenant, json!({"phone": "12 34 56 78"}), 10);

        let notifier = Arc::new(RecordingNotifier::default());
        let finder = finder_with(
            vec![phone_match.clone()],
            DuplicateDetectionConfig::default(),
            notifier.clone(),
        );

        let found = finder
            .find_duplicate(
                tenant,
                &json!({"email": "new@firm.dk", "phone": "+45 12 34 56 78"}),
            )
            .await
            .unwrap();

        assert_eq!(found.unwrap().id, phone_match.id);
        assert_eq!(
            *notifier.strategies.lock().unwrap(),
            vec!["phone_exact".to_string()]
        );
    }

    #[tokio::test]
    async fn test_none_found_recorded() {
        let tenant = Uuid::new_v4();
        let notifier = Arc::new(RecordingNotifier::default());
        let finder = finder_with(vec![], DuplicateDetectionConfig::default(), notifier.clone());

        let found = finder
            .find_duplicate(tenant, &json!({"email": "nobody@firm.dk"}))
            .await
            .unwrap();
        assert!(found.is_none());
        assert_eq!(
            *notifier.strategies.lock().unwrap(),
            vec![STRATEGY_NONE_FOUND.to_string()]
        );
    }

    #[tokio::test]
    async fn test_detection_disabled_returns_none() {
        let tenant = Uuid::new_v4();
        let existing = lead(tenant, json!({"email": "jane@firm.dk"}), 10);
        let config = DuplicateDetectionConfig {
            enabled: false,
            ..Default::default()
        };

        let notifier = Arc::new(RecordingNotifier::default());
        let finder = finder_with(vec![existing], config, notifier);

        let found = finder
            .find_duplicate(tenant, &json!({"email": "jane@firm.dk"}))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_soft() {
        let notifier = Arc::new(RecordingNotifier::default());
        let finder = DuplicateFinder::new(
            Arc::new(ListLookup::failing()),
            Arc::new(FixedConfig(DuplicateDetectionConfig::default())),
            notifier.clone(),
        );

        let found = finder
            .find_duplicate(Uuid::new_v4(), &json!({"email": "jane@firm.dk"}))
            .await
            .unwrap();
        assert!(found.is_none());
        assert_eq!(
            *notifier.strategies.lock().unwrap(),
            vec![STRATEGY_NONE_FOUND.to_string()]
        );
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        let other_tenant_lead = lead(tenant_b, json!({"email": "jane@firm.dk"}), 10);

        let notifier = Arc::new(RecordingNotifier::default());
        let finder = finder_with(
            vec![other_tenant_lead],
            DuplicateDetectionConfig::default(),
            notifier,
        );

        let found = finder
            .find_duplicate(tenant_a, &json!({"email": "jane@firm.dk"}))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_find_duplicates_threshold_validation() {
        let notifier = Arc::new(RecordingNotifier::default());
        let finder = finder_with(vec![], DuplicateDetectionConfig::default(), notifier);

        let err = finder
            .find_duplicates(Uuid::new_v4(), &json!({"email": "a@b.dk"}), 1.5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_find_duplicates_dedupes_and_sorts() {
        let tenant = Uuid::new_v4();
        // Matches both email_exact and phone_exact; must appear once.
        let both = lead(
            tenant,
            json!({"email": "jane@firm.dk", "phone": "12 34 56 78", "name": "Jane Smith"}),
            10,
        );
        let phone_only = lead(
            tenant,
            json!({"email": "other@firm.dk", "phone": "12 34 56 78", "name": "Someone Else"}),
            20,
        );

        let notifier = Arc::new(RecordingNotifier::default());
        let finder = finder_with(
            vec![both.clone(), phone_only.clone()],
            DuplicateDetectionConfig::default(),
            notifier,
        );

        let candidates = finder
            .find_duplicates(
                tenant,
                &json!({"email": "jane@firm.dk", "phone": "12345678", "name": "Jane Smith"}),
                0.5,
                None,
            )
            .await
            .unwrap();

        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].similarity_score >= candidates[1].similarity_score);
        // Each lead appears exactly once despite matching several strategies.
        let ids: Vec<Uuid> = candidates.iter().map(|c| c.lead_id).collect();
        assert_eq!(ids.iter().filter(|id| **id == both.id).count(), 1);
        assert_eq!(ids.iter().filter(|id| **id == phone_only.id).count(), 1);
        let both_candidate = candidates.iter().find(|c| c.lead_id == both.id).unwrap();
        assert!(both_candidate.matched_fields.contains(&"email".to_string()));
        assert!(both_candidate.matched_fields.contains(&"phone".to_string()));
    }

    #[tokio::test]
    async fn test_find_duplicates_excludes_self() {
        let tenant = Uuid::new_v4();
        let existing = lead(tenant, json!({"email": "jane@firm.dk"}), 10);

        let notifier = Arc::new(RecordingNotifier::default());
        let finder = finder_with(
            vec![existing.clone()],
            DuplicateDetectionConfig::default(),
            notifier,
        );

        let candidates = finder
            .find_duplicates(tenant, &existing.payload, 0.5, Some(existing.id))
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_find_duplicates_for_missing_lead() {
        let notifier = Arc::new(RecordingNotifier::default());
        let finder = finder_with(vec![], DuplicateDetectionConfig::default(), notifier);

        let err = finder
            .find_duplicates_for_lead(Uuid::new_v4(), Uuid::new_v4(), 0.8)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LeadNotFound(_)));
    }

    #[tokio::test]
    async fn test_find_duplicates_store_failure_returns_empty() {
        let notifier = Arc::new(RecordingNotifier::default());
        let finder = DuplicateFinder::new(
            Arc::new(ListLookup::failing()),
            Arc::new(FixedConfig(DuplicateDetectionConfig::default())),
            notifier,
        );

        let candidates = finder
            .find_duplicates(Uuid::new_v4(), &json!({"email": "a@b.dk"}), 0.8, None)
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_custom_rules_raise_confidence() {
        let tenant = Uuid::new_v4();
        let candidate = lead(
            tenant,
            json!({"email": "jane@firm.dk", "company": "ACME ApS"}),
            10,
        );

        let config = DuplicateDetectionConfig {
            custom_rules: vec![leadflow_core::DuplicateRule {
                name: "same-company".to_string(),
                fields: vec!["company".to_string()],
                weight: 1.0,
                condition: leadflow_core::RuleCondition::Exact,
                pattern: None,
            }],
            ..Default::default()
        };

        let notifier = Arc::new(RecordingNotifier::default());
        let finder = finder_with(vec![candidate.clone()], config, notifier);

        let candidates = finder
            .find_duplicates(
                tenant,
                &json!({"email": "jane@firm.dk", "company": "acme aps"}),
                0.9,
                None,
            )
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].confidence_score, 1.0);
        let matched = candidates[0].details["rules"]["matched"].as_array().unwrap();
        assert_eq!(matched[0], "same-company");
    }
}
