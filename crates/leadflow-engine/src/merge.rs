//! Field-level lead merging with conflict resolution and audit history.
//!
//! Detection fails soft; merges fail loud. Every merge is committed as one
//! atomic persistence operation guarded by compare-and-set versions, with
//! an audit event appended before and after the write so crash recovery
//! can distinguish "attempted" from "finished".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Map, Value as JsonValue};
use tracing::{info, warn};
use uuid::Uuid;

use leadflow_core::{
    defaults, is_blank, AuditSink, ConflictResolution, DedupNotifier, Error, FieldResolution,
    LeadLookup, LeadRecord, LeadStatus, LeadWriter, MergeAuditEvent, MergeConflict,
    MergeOperation, Result,
};
use leadflow_match::{
    normalize_address, normalize_email, normalize_name, normalize_phone, normalize_postal_code,
};

/// Audit trail action names.
pub const AUDIT_MERGE_STARTED: &str = "merge_started";
pub const AUDIT_MERGE_COMMITTED: &str = "merge_committed";
pub const AUDIT_MERGE_FAILED: &str = "merge_failed";

/// Merge two lead payloads field by field.
///
/// For every key present in either payload the incoming value wins when it
/// is non-empty; otherwise the existing value is kept. Keys present on only
/// one side carry through unchanged. The rule is applied independently per
/// field, so the merge is order-independent across fields and idempotent.
pub fn merge_lead_payloads(existing: &JsonValue, incoming: &JsonValue) -> JsonValue {
    let empty = Map::new();
    let existing_map = existing.as_object().unwrap_or(&empty);
    let incoming_map = incoming.as_object().unwrap_or(&empty);

    let mut merged = existing_map.clone();
    for (key, value) in incoming_map {
        if !is_blank(value) {
            merged.insert(key.clone(), value.clone());
        } else {
            merged.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    JsonValue::Object(merged)
}

/// Normalization-aware equality for conflict detection.
///
/// The identifying attributes compare in canonical form so
/// "12 34 56 78" and "+45 12 34 56 78" are not a conflict; other string
/// fields compare trimmed and lowercased; non-strings compare directly.
fn values_equal(field: &str, a: &JsonValue, b: &JsonValue) -> bool {
    match (a.as_str(), b.as_str()) {
        (Some(a_str), Some(b_str)) => {
            let canon = |s: &str| -> Option<String> {
                match field {
                    "email" => normalize_email(s),
                    "phone" => normalize_phone(s),
                    "name" => normalize_name(s),
                    "address" => normalize_address(s),
                    "postal_code" => normalize_postal_code(s),
                    _ => Some(s.trim().to_lowercase()),
                }
            };
            canon(a_str) == canon(b_str)
        }
        _ => a == b,
    }
}

/// Merges two lead records under a conflict-resolution policy.
pub struct MergeEngine {
    lookup: Arc<dyn LeadLookup>,
    writer: Arc<dyn LeadWriter>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn DedupNotifier>,
    audit_timeout: Duration,
}

impl MergeEngine {
    pub fn new(
        lookup: Arc<dyn LeadLookup>,
        writer: Arc<dyn LeadWriter>,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn DedupNotifier>,
    ) -> Self {
        Self {
            lookup,
            writer,
            audit,
            notifier,
            audit_timeout: Duration::from_millis(defaults::AUDIT_APPEND_TIMEOUT_MS),
        }
    }

    /// Override the audit append timeout.
    pub fn with_audit_timeout(mut self, timeout: Duration) -> Self {
        self.audit_timeout = timeout;
        self
    }

    /// Append an audit event, bounded by the audit timeout. The sink is
    /// fire-and-forget: failure is logged, never propagated.
    async fn append_audit(&self, event: &MergeAuditEvent) {
        let result = tokio::time::timeout(self.audit_timeout, self.audit.append_event(event)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(
                    subsystem = "merge",
                    component = "audit",
                    action = %event.action,
                    error = %e,
                    "Audit append failed"
                );
            }
            Err(_) => {
                warn!(
                    subsystem = "merge",
                    component = "audit",
                    action = %event.action,
                    timeout_ms = self.audit_timeout.as_millis() as u64,
                    "Audit append timed out"
                );
            }
        }
    }

    /// Merge the source lead into the target lead.
    ///
    /// Loads both records (NotFound when either is missing or belongs to a
    /// different tenant), computes the default field-by-field merge,
    /// applies explicit per-field resolutions, and commits the write pair
    /// (target payload update + source marked merged) as one atomic unit
    /// guarded by the versions read here. A source that is already merged
    /// fails fast with Conflict; concurrent merges of the same source are
    /// serialized by the store's compare-and-set so the loser observes
    /// Conflict too.
    pub async fn merge_leads(
        &self,
        tenant_id: Uuid,
        source_id: Uuid,
        target_id: Uuid,
        field_resolutions: &HashMap<String, FieldResolution>,
        performed_by: &str,
    ) -> Result<MergeOperation> {
        let start = Instant::now();

        if source_id == target_id {
            return Err(Error::InvalidInput(
                "source and target lead must differ".to_string(),
            ));
        }

        let source = self
            .lookup
            .find_by_id(tenant_id, source_id)
            .await?
            .ok_or(Error::LeadNotFound(source_id))?;
        let target = self
            .lookup
            .find_by_id(tenant_id, target_id)
            .await?
            .ok_or(Error::LeadNotFound(target_id))?;

        if source.status == LeadStatus::Merged {
            return Err(Error::Conflict(format!(
                "source lead {source_id} is already merged"
            )));
        }
        if target.status == LeadStatus::Merged {
            return Err(Error::Conflict(format!(
                "target lead {target_id} is already merged"
            )));
        }

        let conflicts = identify_conflicts(&source, &target, field_resolutions);
        let mut merged = merge_lead_payloads(&target.payload, &source.payload);
        apply_resolutions(&mut merged, &source, &target, field_resolutions);

        let mut audit_trail = Vec::new();
        let started = MergeAuditEvent::new(
            AUDIT_MERGE_STARTED,
            performed_by,
            json!({
                "tenant_id": tenant_id,
                "source_lead_id": source_id,
                "target_lead_id": target_id,
                "conflict_count": conflicts.len(),
            }),
        );
        // Awaited (bounded) before the write so the "attempted" marker is
        // observable first.
        self.append_audit(&started).await;
        audit_trail.push(started);

        let commit = self
            .writer
            .commit_merge(
                target_id,
                &merged,
                target.version,
                source_id,
                source.version,
            )
            .await;

        match commit {
            Ok(()) => {
                let committed = MergeAuditEvent::new(
                    AUDIT_MERGE_COMMITTED,
                    performed_by,
                    json!({
                        "source_lead_id": source_id,
                        "target_lead_id": target_id,
                        "merged_keys": merged.as_object().map(|m| m.len()).unwrap_or(0),
                    }),
                );
                self.append_audit(&committed).await;
                audit_trail.push(committed);

                let operation = MergeOperation {
                    source_lead_id: source_id,
                    target_lead_id: target_id,
                    merged_fields: merged,
                    conflicts,
                    performed_by: performed_by.to_string(),
                    performed_at: Utc::now(),
                    audit_trail,
                };

                info!(
                    subsystem = "merge",
                    component = "merge_engine",
                    op = "merge_leads",
                    %tenant_id,
                    source_lead_id = %source_id,
                    target_lead_id = %target_id,
                    conflict_count = operation.conflicts.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Leads merged"
                );
                self.notifier.on_merge_completed(&operation).await;
                Ok(operation)
            }
            Err(e) => {
                let failed = MergeAuditEvent::new(
                    AUDIT_MERGE_FAILED,
                    performed_by,
                    json!({
                        "source_lead_id": source_id,
                        "target_lead_id": target_id,
                        "error": e.to_string(),
                    }),
                );
                self.append_audit(&failed).await;

                warn!(
                    subsystem = "merge",
                    component = "merge_engine",
                    op = "merge_leads",
                    %tenant_id,
                    source_lead_id = %source_id,
                    target_lead_id = %target_id,
                    error = %e,
                    "Merge failed"
                );
                self.notifier
                    .on_merge_failed(source_id, target_id, &e.to_string())
                    .await;
                Err(e)
            }
        }
    }
}

/// A conflict exists for a field when both source and target carry a
/// non-empty value that differs after normalization-aware comparison.
fn identify_conflicts(
    source: &LeadRecord,
    target: &LeadRecord,
    field_resolutions: &HashMap<String, FieldResolution>,
) -> Vec<MergeConflict> {
    let empty = Map::new();
    let source_map = source.payload.as_object().unwrap_or(&empty);
    let target_map = target.payload.as_object().unwrap_or(&empty);

    let mut conflicts = Vec::new();
    for (field, source_value) in source_map {
        let Some(target_value) = target_map.get(field) else {
            continue;
        };
        if is_blank(source_value) || is_blank(target_value) {
            continue;
        }
        if values_equal(field, source_value, target_value) {
            continue;
        }

        let (resolution, custom_value) = match field_resolutions.get(field) {
            Some(FieldResolution::Target) => (ConflictResolution::Target, None),
            Some(FieldResolution::Custom(v)) => (ConflictResolution::Custom, Some(v.clone())),
            // Default policy: the incoming (source) value wins.
            Some(FieldResolution::Source) | None => (ConflictResolution::Source, None),
        };
        conflicts.push(MergeConflict {
            field: field.clone(),
            source_value: source_value.clone(),
            target_value: target_value.clone(),
            resolution,
            custom_value,
        });
    }
    conflicts
}

/// Overlay explicit client-provided resolutions on the default merge.
fn apply_resolutions(
    merged: &mut JsonValue,
    source: &LeadRecord,
    target: &LeadRecord,
    field_resolutions: &HashMap<String, FieldResolution>,
) {
    let Some(map) = merged.as_object_mut() else {
        return;
    };
    for (field, resolution) in field_resolutions {
        let value = match resolution {
            FieldResolution::Source => source.payload.get(field).cloned(),
            FieldResolution::Target => target.payload.get(field).cloned(),
            FieldResolution::Custom(v) => Some(v.clone()),
        };
        match value {
            Some(v) => {
                map.insert(field.clone(), v);
            }
            None => {
                map.remove(field);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{
        lead_with, MemoryLeadStore, RecordingAuditSink, RecordingNotifier,
    };
    use leadflow_core::NoOpNotifier;

    #[test]
    fn test_merge_payloads_incoming_wins_when_non_empty() {
        let existing = json!({
            "name": "John Doe",
            "email": "john@x.com",
            "phone": "",
            "address": "Old",
        });
        let incoming = json!({
            "name": "",
            "email": "john.doe@x.com",
            "phone": "+4512345678",
            "address": "New",
            "service_type": "privat",
        });

        let merged = merge_lead_payloads(&existing, &incoming);
        assert_eq!(
            merged,
            json!({
                "name": "John Doe",
                "email": "john.doe@x.com",
                "phone": "+4512345678",
                "address": "New",
                "service_type": "privat",
            })
        );
    }

    #[test]
    fn test_merge_payloads_idempotent() {
        let existing = json!({"name": "John", "email": ""});
        let incoming = json!({"name": "", "email": "j@x.com", "extra": "v"});

        let once = merge_lead_payloads(&existing, &incoming);
        let twice = merge_lead_payloads(&once, &incoming);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_payloads_carries_one_sided_keys() {
        let merged = merge_lead_payloads(&json!({"only_existing": "a"}), &json!({"only_incoming": "b"}));
        assert_eq!(merged["only_existing"], "a");
        assert_eq!(merged["only_incoming"], "b");
    }

    #[test]
    fn test_merge_payloads_non_object_inputs() {
        let merged = merge_lead_payloads(&JsonValue::Null, &json!({"a": 1}));
        assert_eq!(merged, json!({"a": 1}));
    }

    #[test]
    fn test_values_equal_normalization_aware() {
        assert!(values_equal(
            "phone",
            &json!("12 34 56 78"),
            &json!("+45 12 34 56 78")
        ));
        assert!(values_equal(
            "email",
            &json!(" Jane@Firm.DK "),
            &json!("jane@firm.dk")
        ));
        assert!(values_equal("company", &json!("ACME"), &json!(" acme ")));
        assert!(!values_equal("name", &json!("John"), &json!("Jane")));
        assert!(values_equal("count", &json!(3), &json!(3)));
        assert!(!values_equal("count", &json!(3), &json!(4)));
    }

    fn engine(
        store: Arc<MemoryLeadStore>,
        audit: Arc<RecordingAuditSink>,
        notifier: Arc<RecordingNotifier>,
    ) -> MergeEngine {
        MergeEngine::new(store.clone(), store, audit, notifier)
    }

    #[tokio::test]
    async fn test_merge_leads_happy_path() {
        let store = Arc::new(MemoryLeadStore::new());
        let tenant = Uuid::new_v4();
        let source = lead_with(tenant, json!({"name": "John Doe", "phone": "12345678"}), 10);
        let target = lead_with(tenant, json!({"name": "", "email": "john@x.com"}), 60);
        store.insert(source.clone());
        store.insert(target.clone());

        let audit = Arc::new(RecordingAuditSink::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = engine(store.clone(), audit.clone(), notifier.clone());

        let op = engine
            .merge_leads(tenant, source.id, target.id, &HashMap::new(), "agent-7")
            .await
            .unwrap();

        assert_eq!(op.source_lead_id, source.id);
        assert_eq!(op.merged_fields["name"], "John Doe");
        assert_eq!(op.merged_fields["email"], "john@x.com");
        assert_eq!(op.merged_fields["phone"], "12345678");

        // Source marked merged, target payload updated.
        let merged_source = store.get(source.id).unwrap();
        assert_eq!(merged_source.status, LeadStatus::Merged);
        assert_eq!(merged_source.merged_into, Some(target.id));
        let updated_target = store.get(target.id).unwrap();
        assert_eq!(updated_target.payload["name"], "John Doe");

        // Audit ordering: started before committed.
        let actions = audit.actions();
        assert_eq!(actions, vec![AUDIT_MERGE_STARTED, AUDIT_MERGE_COMMITTED]);
        assert_eq!(op.audit_trail.len(), 2);
        assert_eq!(notifier.completed_count(), 1);
    }

    #[tokio::test]
    async fn test_merge_conflict_recorded_with_default_resolution() {
        let store = Arc::new(MemoryLeadStore::new());
        let tenant = Uuid::new_v4();
        let source = lead_with(tenant, json!({"address": "New Street 1"}), 10);
        let target = lead_with(tenant, json!({"address": "Old Street 9"}), 60);
        store.insert(source.clone());
        store.insert(target.clone());

        let engine = engine(
            store,
            Arc::new(RecordingAuditSink::new()),
            Arc::new(RecordingNotifier::default()),
        );

        let op = engine
            .merge_leads(tenant, source.id, target.id, &HashMap::new(), "agent")
            .await
            .unwrap();

        assert_eq!(op.conflicts.len(), 1);
        assert_eq!(op.conflicts[0].field, "address");
        assert_eq!(op.conflicts[0].resolution, ConflictResolution::Source);
        assert_eq!(op.merged_fields["address"], "New Street 1");
    }

    #[tokio::test]
    async fn test_merge_explicit_resolutions() {
        let store = Arc::new(MemoryLeadStore::new());
        let tenant = Uuid::new_v4();
        let source = lead_with(tenant, json!({"address": "New", "name": "J. Doe"}), 10);
        let target = lead_with(tenant, json!({"address": "Old", "name": "John Doe"}), 60);
        store.insert(source.clone());
        store.insert(target.clone());

        let engine = engine(
            store,
            Arc::new(RecordingAuditSink::new()),
            Arc::new(RecordingNotifier::default()),
        );

        let mut resolutions = HashMap::new();
        resolutions.insert("address".to_string(), FieldResolution::Target);
        resolutions.insert(
            "name".to_string(),
            FieldResolution::Custom(json!("John R. Doe")),
        );

        let op = engine
            .merge_leads(tenant, source.id, target.id, &resolutions, "agent")
            .await
            .unwrap();

        assert_eq!(op.merged_fields["address"], "Old");
        assert_eq!(op.merged_fields["name"], "John R. Doe");

        let address_conflict = op.conflicts.iter().find(|c| c.field == "address").unwrap();
        assert_eq!(address_conflict.resolution, ConflictResolution::Target);
        let name_conflict = op.conflicts.iter().find(|c| c.field == "name").unwrap();
        assert_eq!(name_conflict.resolution, ConflictResolution::Custom);
        assert_eq!(name_conflict.custom_value, Some(json!("John R. Doe")));
    }

    #[tokio::test]
    async fn test_normalized_equal_values_are_not_conflicts() {
        let store = Arc::new(MemoryLeadStore::new());
        let tenant = Uuid::new_v4();
        let source = lead_with(tenant, json!({"phone": "12 34 56 78"}), 10);
        let target = lead_with(tenant, json!({"phone": "+45 12 34 56 78"}), 60);
        store.insert(source.clone());
        store.insert(target.clone());

        let engine = engine(
            store,
            Arc::new(RecordingAuditSink::new()),
            Arc::new(RecordingNotifier::default()),
        );

        let op = engine
            .merge_leads(tenant, source.id, target.id, &HashMap::new(), "agent")
            .await
            .unwrap();
        assert!(op.conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_merge_missing_lead_is_not_found() {
        let store = Arc::new(MemoryLeadStore::new());
        let tenant = Uuid::new_v4();
        let target = lead_with(tenant, json!({}), 60);
        store.insert(target.clone());

        let engine = engine(
            store,
            Arc::new(RecordingAuditSink::new()),
            Arc::new(RecordingNotifier::default()),
        );

        let err = engine
            .merge_leads(tenant, Uuid::new_v4(), target.id, &HashMap::new(), "agent")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LeadNotFound(_)));
    }

    #[tokio::test]
    async fn test_merge_cross_tenant_is_not_found() {
        let store = Arc::new(MemoryLeadStore::new());
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        let source = lead_with(tenant_a, json!({}), 10);
        let target = lead_with(tenant_b, json!({}), 60);
        store.insert(source.clone());
        store.insert(target.clone());

        let engine = engine(
            store,
            Arc::new(RecordingAuditSink::new()),
            Arc::new(RecordingNotifier::default()),
        );

        // Target lives in another tenant; from tenant A's view it's absent.
        let err = engine
            .merge_leads(tenant_a, source.id, target.id, &HashMap::new(), "agent")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LeadNotFound(_)));
    }

    #[tokio::test]
    async fn test_merge_same_lead_rejected() {
        let store = Arc::new(MemoryLeadStore::new());
        let engine = engine(
            store,
            Arc::new(RecordingAuditSink::new()),
            Arc::new(RecordingNotifier::default()),
        );

        let id = Uuid::new_v4();
        let err = engine
            .merge_leads(Uuid::new_v4(), id, id, &HashMap::new(), "agent")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_second_merge_fails_fast_with_conflict() {
        let store = Arc::new(MemoryLeadStore::new());
        let tenant = Uuid::new_v4();
        let source = lead_with(tenant, json!({"name": "A"}), 10);
        let target = lead_with(tenant, json!({"name": "B"}), 60);
        store.insert(source.clone());
        store.insert(target.clone());

        let audit = Arc::new(RecordingAuditSink::new());
        let engine = engine(store.clone(), audit.clone(), Arc::new(RecordingNotifier::default()));

        engine
            .merge_leads(tenant, source.id, target.id, &HashMap::new(), "agent")
            .await
            .unwrap();
        let target_after_first = store.get(target.id).unwrap();

        let err = engine
            .merge_leads(tenant, source.id, target.id, &HashMap::new(), "agent")
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // Fail-fast: no second merge_started was appended, state unchanged.
        assert_eq!(audit.actions().len(), 2);
        let target_after_second = store.get(target.id).unwrap();
        assert_eq!(target_after_first.version, target_after_second.version);
        assert_eq!(target_after_first.payload, target_after_second.payload);
    }

    #[tokio::test]
    async fn test_conditional_write_conflict_surfaces_and_audits() {
        let store = Arc::new(MemoryLeadStore::new());
        let tenant = Uuid::new_v4();
        let source = lead_with(tenant, json!({"name": "A"}), 10);
        let target = lead_with(tenant, json!({"name": "B"}), 60);
        store.insert(source.clone());
        store.insert(target.clone());

        let audit = Arc::new(RecordingAuditSink::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = engine(store.clone(), audit.clone(), notifier.clone());

        // A concurrent merge wins the compare-and-set between our read and
        // our write.
        store.set_conflict_writes(true);

        let err = engine
            .merge_leads(tenant, source.id, target.id, &HashMap::new(), "agent")
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let actions = audit.actions();
        assert_eq!(actions, vec![AUDIT_MERGE_STARTED, AUDIT_MERGE_FAILED]);
        assert_eq!(notifier.failed_count(), 1);

        // The write pair is atomic: the source must still be active.
        assert_eq!(store.get(source.id).unwrap().status, LeadStatus::Active);
    }

    #[tokio::test]
    async fn test_write_failure_fails_loud_with_audit() {
        let store = Arc::new(MemoryLeadStore::new());
        let tenant = Uuid::new_v4();
        let source = lead_with(tenant, json!({}), 10);
        let target = lead_with(tenant, json!({}), 60);
        store.insert(source.clone());
        store.insert(target.clone());
        store.set_fail_writes(true);

        let audit = Arc::new(RecordingAuditSink::new());
        let engine = engine(store, audit.clone(), Arc::new(RecordingNotifier::default()));

        let err = engine
            .merge_leads(tenant, source.id, target.id, &HashMap::new(), "agent")
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(audit.actions(), vec![AUDIT_MERGE_STARTED, AUDIT_MERGE_FAILED]);
    }

    #[tokio::test]
    async fn test_audit_sink_failure_does_not_block_merge() {
        let store = Arc::new(MemoryLeadStore::new());
        let tenant = Uuid::new_v4();
        let source = lead_with(tenant, json!({"name": "A"}), 10);
        let target = lead_with(tenant, json!({}), 60);
        store.insert(source.clone());
        store.insert(target.clone());

        let audit = Arc::new(RecordingAuditSink::failing());
        let engine = MergeEngine::new(
            store.clone(),
            store,
            audit,
            Arc::new(NoOpNotifier),
        );

        // The sink errors on every append; the merge must still commit.
        let op = engine
            .merge_leads(tenant, source.id, target.id, &HashMap::new(), "agent")
            .await
            .unwrap();
        assert_eq!(op.merged_fields["name"], "A");
    }
}
