//! Core data models for leadflow.
//!
//! These types are shared across all leadflow crates and represent the
//! domain entities of duplicate detection and merging. Leads themselves
//! are owned by the surrounding system; the engine reads them and
//! proposes merges, it never creates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// LEAD TYPES
// =============================================================================

/// Lifecycle status of a lead record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Live record, eligible as a merge source or target.
    Active,
    /// Absorbed into another lead; `merged_into` points at the survivor.
    Merged,
}

impl LeadStatus {
    /// Stable string form used in storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Active => "active",
            LeadStatus::Merged => "merged",
        }
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "active" => Ok(LeadStatus::Active),
            "merged" => Ok(LeadStatus::Merged),
            other => Err(crate::Error::Internal(format!(
                "unknown lead status: {other}"
            ))),
        }
    }
}

/// A tenant-scoped lead record.
///
/// `payload` is a JSON object mapping attribute names (email, phone, name,
/// address, postal_code, plus arbitrary additional keys) to values.
/// `version` backs the compare-and-set guard the persistence layer provides
/// for merge writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub payload: JsonValue,
    pub status: LeadStatus,
    /// Target lead this record was merged into, if status is Merged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_into: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeadRecord {
    /// String value of a payload attribute, if present and non-blank.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.payload
            .get(name)
            .and_then(JsonValue::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// True for values the merge and detection logic treat as absent:
/// JSON null, and empty or whitespace-only strings.
pub fn is_blank(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

// =============================================================================
// DETECTION TYPES
// =============================================================================

/// A lead suspected of being a duplicate of another, produced transiently
/// by the candidate finder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub lead_id: Uuid,
    /// 0.0 - 1.0 aggregate string similarity across compared fields.
    pub similarity_score: f64,
    /// 0.0 - 1.0 confidence that this is a true duplicate.
    pub confidence_score: f64,
    /// Attribute names that contributed to the match.
    pub matched_fields: Vec<String>,
    /// Free-form diagnostic map (per-field scores, resolving strategy).
    pub details: JsonValue,
}

/// How a duplicate group was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    Merged,
    Separate,
    Manual,
}

impl ResolutionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMethod::Merged => "merged",
            ResolutionMethod::Separate => "separate",
            ResolutionMethod::Manual => "manual",
        }
    }
}

impl std::str::FromStr for ResolutionMethod {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "merged" => Ok(ResolutionMethod::Merged),
            "separate" => Ok(ResolutionMethod::Separate),
            "manual" => Ok(ResolutionMethod::Manual),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown resolution method: {other}"
            ))),
        }
    }
}

/// A cluster of leads suspected of being duplicates of each other.
///
/// Created by a bulk scan, mutated only through an explicit resolve
/// operation. Once `resolved` is true the group is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub group_id: Uuid,
    pub tenant_id: Uuid,
    /// Candidates ordered by descending similarity score.
    pub candidates: Vec<DuplicateCandidate>,
    /// All member lead ids, primary included.
    pub member_ids: Vec<Uuid>,
    /// Representative record; defaults to the oldest member.
    pub primary_lead_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_method: Option<ResolutionMethod>,
}

// =============================================================================
// MERGE TYPES
// =============================================================================

/// Which side of a conflicting field won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    Source,
    Target,
    Custom,
}

/// A field where source and target both carried a non-empty value that
/// differs after normalization-aware comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConflict {
    pub field: String,
    pub source_value: JsonValue,
    pub target_value: JsonValue,
    pub resolution: ConflictResolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_value: Option<JsonValue>,
}

/// Explicit client-provided resolution for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum FieldResolution {
    /// Keep the source lead's value.
    Source,
    /// Keep the target lead's value.
    Target,
    /// Use a caller-supplied value.
    Custom(JsonValue),
}

/// One entry in a merge's append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeAuditEvent {
    pub timestamp: DateTime<Utc>,
    /// "merge_started", "merge_committed", or "merge_failed".
    pub action: String,
    pub actor: String,
    pub details: JsonValue,
}

impl MergeAuditEvent {
    pub fn new(action: &str, actor: &str, details: JsonValue) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.to_string(),
            actor: actor.to_string(),
            details,
        }
    }
}

/// The outcome of a single merge invocation.
///
/// Immutable after creation except for `audit_trail`, which only grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOperation {
    pub source_lead_id: Uuid,
    pub target_lead_id: Uuid,
    /// Resulting payload written to the target.
    pub merged_fields: JsonValue,
    pub conflicts: Vec<MergeConflict>,
    pub performed_by: String,
    pub performed_at: DateTime<Utc>,
    pub audit_trail: Vec<MergeAuditEvent>,
}
