//! Collaborator traits consumed by the dedup engine.
//!
//! The engine does not own transport or storage; it consumes a lead-lookup
//! capability, a conditional-write capability, an audit sink, and a config
//! store. These traits define those seams, enabling pluggable backends and
//! testability. Dependencies are passed explicitly to constructors; there
//! is no ambient container.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::config::DuplicateDetectionConfig;
use crate::error::Result;
use crate::models::*;

// =============================================================================
// LEAD STORE TRAITS
// =============================================================================

/// Read access to the tenant's lead store.
///
/// All lookups are tenant-scoped; implementations must never return a lead
/// belonging to another tenant.
#[async_trait]
pub trait LeadLookup: Send + Sync {
    /// Fetch a single lead by id within the tenant.
    async fn find_by_id(&self, tenant_id: Uuid, lead_id: Uuid) -> Result<Option<LeadRecord>>;

    /// Exact-match lookup on a normalized identity field (email, phone).
    ///
    /// `value` is the normalized form; results are ordered newest
    /// `created_at` first.
    async fn find_by_exact_field(
        &self,
        tenant_id: Uuid,
        field: &str,
        value: &str,
    ) -> Result<Vec<LeadRecord>>;

    /// Candidate-pool lookup for fuzzy strategies (e.g. leads sharing a
    /// normalized postal code).
    ///
    /// Results are ordered newest first and may be truncated by the store
    /// to a bounded pool size.
    async fn find_by_field(
        &self,
        tenant_id: Uuid,
        field: &str,
        value: &str,
    ) -> Result<Vec<LeadRecord>>;
}

/// Conditional write access to the lead store.
///
/// Every write carries the version the caller last observed; a write whose
/// condition no longer holds (version moved, source no longer active) fails
/// with [`Error::Conflict`](crate::Error::Conflict) so that two concurrent
/// merges of the same source cannot both succeed. The engine never
/// implements locking itself; this compare-and-set guard is the contract it
/// requires from the store.
#[async_trait]
pub trait LeadWriter: Send + Sync {
    /// Replace the target lead's payload with the merged result.
    async fn update_merged_payload(
        &self,
        target_id: Uuid,
        payload: &JsonValue,
        expected_version: i64,
    ) -> Result<()>;

    /// Mark the source lead as merged into the target.
    async fn mark_merged(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        expected_version: i64,
    ) -> Result<()>;

    /// Commit both halves of a merge as one atomic unit.
    ///
    /// The default implementation issues the two conditional writes in
    /// sequence and is *not* atomic across them; stores that can do better
    /// (a transaction, a single locked region) must override it. Partial
    /// application is never a valid outcome for a merge.
    async fn commit_merge(
        &self,
        target_id: Uuid,
        payload: &JsonValue,
        target_version: i64,
        source_id: Uuid,
        source_version: i64,
    ) -> Result<()> {
        self.update_merged_payload(target_id, payload, target_version)
            .await?;
        self.mark_merged(source_id, target_id, source_version).await
    }
}

// =============================================================================
// AUDIT SINK
// =============================================================================

/// Append-only sink for merge audit events.
///
/// Fire-and-forget from the engine's perspective: the merge path bounds
/// every append with a timeout so a slow sink cannot stall it.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append_event(&self, event: &MergeAuditEvent) -> Result<()>;
}

// =============================================================================
// CONFIG STORE
// =============================================================================

/// Tenant-scoped storage for detection configuration.
///
/// Configs are replaced whole; `put` must never merge into an existing
/// stored value.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the tenant's config, falling back to defaults when none is
    /// stored.
    async fn get_duplicate_config(&self, tenant_id: Uuid) -> Result<DuplicateDetectionConfig>;

    /// Replace the tenant's config.
    async fn put_duplicate_config(
        &self,
        tenant_id: Uuid,
        config: &DuplicateDetectionConfig,
    ) -> Result<()>;
}

// =============================================================================
// GROUP STORE
// =============================================================================

/// Storage for duplicate groups and their resolution state.
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Persist a newly created group.
    async fn insert(&self, group: &DuplicateGroup) -> Result<()>;

    /// Fetch a group by id within the tenant.
    async fn get(&self, tenant_id: Uuid, group_id: Uuid) -> Result<Option<DuplicateGroup>>;

    /// Persist a group's updated resolution state.
    async fn update(&self, group: &DuplicateGroup) -> Result<()>;

    /// List groups for a tenant, optionally filtered by resolution state,
    /// newest first.
    async fn list(
        &self,
        tenant_id: Uuid,
        resolved: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DuplicateGroup>>;

    /// Delete a group (mark the members as not duplicates).
    async fn delete(&self, tenant_id: Uuid, group_id: Uuid) -> Result<()>;
}

// =============================================================================
// NOTIFICATION / OBSERVABILITY
// =============================================================================

/// Notification handler for detection and merge outcomes.
///
/// Also the observability seam: every cascade invocation reports the
/// strategy that resolved it (including `none_found`) through
/// `on_strategy_resolved`, so tests can assert cascade order without
/// scraping logs. Delivery (webhooks, queues) is the caller's concern.
#[async_trait]
pub trait DedupNotifier: Send + Sync {
    /// Called once per cascade invocation with the resolving strategy name.
    async fn on_strategy_resolved(&self, tenant_id: Uuid, strategy: &str);

    /// Called when a duplicate candidate passes the tenant threshold.
    async fn on_duplicate_found(&self, tenant_id: Uuid, lead_id: Uuid, candidate: &DuplicateCandidate);

    /// Called when a bulk scan creates a duplicate group.
    async fn on_group_created(&self, group: &DuplicateGroup);

    /// Called after a merge commits.
    async fn on_merge_completed(&self, operation: &MergeOperation);

    /// Called after a merge fails.
    async fn on_merge_failed(&self, source_id: Uuid, target_id: Uuid, error: &str);
}

/// No-op notifier for when notifications aren't needed.
pub struct NoOpNotifier;

#[async_trait]
impl DedupNotifier for NoOpNotifier {
    async fn on_strategy_resolved(&self, _tenant_id: Uuid, _strategy: &str) {}
    async fn on_duplicate_found(
        &self,
        _tenant_id: Uuid,
        _lead_id: Uuid,
        _candidate: &DuplicateCandidate,
    ) {
    }
    async fn on_group_created(&self, _group: &DuplicateGroup) {}
    async fn on_merge_completed(&self, _operation: &MergeOperation) {}
    async fn on_merge_failed(&self, _source_id: Uuid, _target_id: Uuid, _error: &str) {}
}
