//! The match strategy cascade.
//!
//! Each strategy is an explicit object in an ordered list rather than an
//! early-return chain, which makes the ordering and the `none_found`
//! terminal state testable data. The single-hit cascade walks the list and
//! stops at the first strategy producing a candidate; the bulk scan runs
//! every applicable strategy.

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use leadflow_core::{DuplicateDetectionConfig, LeadLookup, LeadRecord, Result};

use crate::normalize::{
    normalize_address, normalize_name, normalize_phone, NormalizedAttributes,
};
use crate::similarity::similarity;

/// Strategy names, also emitted as the `strategy` log field.
pub const STRATEGY_EMAIL_EXACT: &str = "email_exact";
pub const STRATEGY_PHONE_EXACT: &str = "phone_exact";
pub const STRATEGY_NAME_ADDRESS_FUZZY: &str = "name_address_fuzzy";
pub const STRATEGY_NAME_PHONE_FUZZY: &str = "name_phone_fuzzy";
/// Terminal outcome when no strategy matched.
pub const STRATEGY_NONE_FOUND: &str = "none_found";

/// A candidate produced by one strategy.
#[derive(Debug, Clone)]
pub struct StrategyHit {
    pub lead: LeadRecord,
    /// 0.0 - 1.0; exact strategies report 1.0.
    pub similarity: f64,
    /// Attribute names that contributed to the match.
    pub matched_fields: Vec<String>,
    /// Per-strategy diagnostics (field similarities, pool size).
    pub details: serde_json::Value,
}

/// One step of the cascade.
#[async_trait]
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the normalized input carries the fields this strategy needs.
    fn applicable(&self, attrs: &NormalizedAttributes, config: &DuplicateDetectionConfig) -> bool;

    /// All candidates this strategy can produce, best first. Ties keep the
    /// store's newest-first ordering.
    async fn find_candidates(
        &self,
        lookup: &dyn LeadLookup,
        tenant_id: Uuid,
        attrs: &NormalizedAttributes,
        config: &DuplicateDetectionConfig,
    ) -> Result<Vec<StrategyHit>>;
}

/// The ordered default cascade: exact email, exact phone, fuzzy
/// name+address, fuzzy name+phone.
pub fn default_cascade() -> Vec<Box<dyn MatchStrategy>> {
    vec![
        Box::new(EmailExact),
        Box::new(PhoneExact),
        Box::new(NameAddressFuzzy),
        Box::new(NamePhoneFuzzy),
    ]
}

/// Stable descending sort by similarity; stable so the store's
/// newest-first ordering breaks score ties.
fn sort_hits(hits: &mut [StrategyHit]) {
    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

// =============================================================================
// EXACT STRATEGIES
// =============================================================================

/// Exact match on the normalized email address.
pub struct EmailExact;

#[async_trait]
impl MatchStrategy for EmailExact {
    fn name(&self) -> &'static str {
        STRATEGY_EMAIL_EXACT
    }

    fn applicable(&self, attrs: &NormalizedAttributes, _config: &DuplicateDetectionConfig) -> bool {
        attrs.email.is_some()
    }

    async fn find_candidates(
        &self,
        lookup: &dyn LeadLookup,
        tenant_id: Uuid,
        attrs: &NormalizedAttributes,
        _config: &DuplicateDetectionConfig,
    ) -> Result<Vec<StrategyHit>> {
        let Some(email) = attrs.email.as_deref() else {
            return Ok(Vec::new());
        };
        let leads = lookup.find_by_exact_field(tenant_id, "email", email).await?;
        Ok(exact_hits(leads, "email"))
    }
}

/// Exact match on the normalized phone number.
pub struct PhoneExact;

#[async_trait]
impl MatchStrategy for PhoneExact {
    fn name(&self) -> &'static str {
        STRATEGY_PHONE_EXACT
    }

    fn applicable(&self, attrs: &NormalizedAttributes, _config: &DuplicateDetectionConfig) -> bool {
        attrs.phone.is_some()
    }

    async fn find_candidates(
        &self,
        lookup: &dyn LeadLookup,
        tenant_id: Uuid,
        attrs: &NormalizedAttributes,
        _config: &DuplicateDetectionConfig,
    ) -> Result<Vec<StrategyHit>> {
        let Some(phone) = attrs.phone.as_deref() else {
            return Ok(Vec::new());
        };
        let leads = lookup.find_by_exact_field(tenant_id, "phone", phone).await?;
        Ok(exact_hits(leads, "phone"))
    }
}

fn exact_hits(leads: Vec<LeadRecord>, field: &str) -> Vec<StrategyHit> {
    leads
        .into_iter()
        .map(|lead| StrategyHit {
            lead,
            similarity: 1.0,
            matched_fields: vec![field.to_string()],
            details: json!({ "field": field, "exact": true }),
        })
        .collect()
}

// =============================================================================
// FUZZY STRATEGIES
// =============================================================================

/// Fuzzy name + address match within the same postal code.
///
/// Candidate pool: leads sharing the normalized postal code. A match
/// requires both name and address similarity at or above the fuzzy
/// threshold; the combined score ranks the hits.
pub struct NameAddressFuzzy;

#[async_trait]
impl MatchStrategy for NameAddressFuzzy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME_ADDRESS_FUZZY
    }

    fn applicable(&self, attrs: &NormalizedAttributes, config: &DuplicateDetectionConfig) -> bool {
        config.fuzzy_matching_enabled
            && attrs.name.is_some()
            && attrs.address.is_some()
            && attrs.postal_code.is_some()
    }

    async fn find_candidates(
        &self,
        lookup: &dyn LeadLookup,
        tenant_id: Uuid,
        attrs: &NormalizedAttributes,
        config: &DuplicateDetectionConfig,
    ) -> Result<Vec<StrategyHit>> {
        let (Some(name), Some(address), Some(postal)) = (
            attrs.name.as_deref(),
            attrs.address.as_deref(),
            attrs.postal_code.as_deref(),
        ) else {
            return Ok(Vec::new());
        };

        let pool = lookup.find_by_field(tenant_id, "postal_code", postal).await?;

        let mut hits = Vec::new();
        for lead in pool {
            let lead_name = lead.field("name").and_then(normalize_name);
            let lead_address = lead.field("address").and_then(normalize_address);
            let (Some(lead_name), Some(lead_address)) = (lead_name, lead_address) else {
                continue;
            };

            let name_sim = similarity(name, &lead_name);
            let address_sim = similarity(address, &lead_address);
            if name_sim >= config.fuzzy_threshold && address_sim >= config.fuzzy_threshold {
                hits.push(StrategyHit {
                    lead,
                    similarity: (name_sim + address_sim) / 2.0,
                    matched_fields: vec!["name".to_string(), "address".to_string()],
                    details: json!({
                        "name_similarity": name_sim,
                        "address_similarity": address_sim,
                        "postal_code": postal,
                    }),
                });
            }
        }

        sort_hits(&mut hits);
        Ok(hits)
    }
}

/// Fuzzy name match among leads carrying the identical normalized phone.
///
/// The phone itself is never fuzzy-compared; only the name is.
pub struct NamePhoneFuzzy;

#[async_trait]
impl MatchStrategy for NamePhoneFuzzy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME_PHONE_FUZZY
    }

    fn applicable(&self, attrs: &NormalizedAttributes, config: &DuplicateDetectionConfig) -> bool {
        config.fuzzy_matching_enabled && attrs.name.is_some() && attrs.phone.is_some()
    }

    async fn find_candidates(
        &self,
        lookup: &dyn LeadLookup,
        tenant_id: Uuid,
        attrs: &NormalizedAttributes,
        config: &DuplicateDetectionConfig,
    ) -> Result<Vec<StrategyHit>> {
        let (Some(name), Some(phone)) = (attrs.name.as_deref(), attrs.phone.as_deref()) else {
            return Ok(Vec::new());
        };

        let pool = lookup.find_by_field(tenant_id, "phone", phone).await?;

        let mut hits = Vec::new();
        for lead in pool {
            // The pool may hold raw values; re-verify the normalized phone.
            let lead_phone = lead.field("phone").and_then(normalize_phone);
            if lead_phone.as_deref() != Some(phone) {
                continue;
            }
            let Some(lead_name) = lead.field("name").and_then(normalize_name) else {
                continue;
            };

            let name_sim = similarity(name, &lead_name);
            if name_sim >= config.fuzzy_threshold {
                hits.push(StrategyHit {
                    lead,
                    similarity: name_sim,
                    matched_fields: vec!["name".to_string(), "phone".to_string()],
                    details: json!({
                        "name_similarity": name_sim,
                        "phone": phone,
                    }),
                });
            }
        }

        sort_hits(&mut hits);
        Ok(hits)
    }
}
