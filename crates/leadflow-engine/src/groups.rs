//! Duplicate group clustering and resolution.
//!
//! Candidates found across a batch of leads are clustered with a disjoint
//! set keyed by lead id: two leads belong to the same group when their
//! candidate sets overlap. Groups track resolution state; a resolved group
//! is terminal and never reopened.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use leadflow_core::{
    DedupNotifier, DuplicateCandidate, DuplicateGroup, Error, GroupStore, LeadLookup,
    LeadRecord, MergeOperation, ResolutionMethod, Result,
};

use crate::merge::MergeEngine;

// =============================================================================
// DISJOINT SET
// =============================================================================

/// Union-find over lead ids with path halving and union by size.
#[derive(Debug, Default)]
pub struct DisjointSet {
    parent: HashMap<Uuid, Uuid>,
    size: HashMap<Uuid, usize>,
    /// Insertion order, for deterministic component output.
    order: Vec<Uuid>,
}

impl DisjointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure `id` is tracked.
    pub fn insert(&mut self, id: Uuid) {
        if !self.parent.contains_key(&id) {
            self.parent.insert(id, id);
            self.size.insert(id, 1);
            self.order.push(id);
        }
    }

    /// Representative of `id`'s component.
    pub fn find(&mut self, id: Uuid) -> Uuid {
        self.insert(id);
        let mut current = id;
        loop {
            let parent = self.parent[&current];
            if parent == current {
                break;
            }
            // Path halving
            let grandparent = self.parent[&parent];
            self.parent.insert(current, grandparent);
            current = grandparent;
        }
        current
    }

    /// Merge the components of `a` and `b`.
    pub fn union(&mut self, a: Uuid, b: Uuid) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        let (small, large) = if self.size[&root_a] < self.size[&root_b] {
            (root_a, root_b)
        } else {
            (root_b, root_a)
        };
        self.parent.insert(small, large);
        let small_size = self.size[&small];
        *self.size.get_mut(&large).unwrap() += small_size; // Safe: roots are tracked
    }

    /// Whether `a` and `b` share a component.
    pub fn connected(&mut self, a: Uuid, b: Uuid) -> bool {
        self.find(a) == self.find(b)
    }

    /// All components, members listed in insertion order, components
    /// ordered by their first-inserted member.
    pub fn components(&mut self) -> Vec<Vec<Uuid>> {
        let ids = self.order.clone();
        let mut by_root: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut root_order = Vec::new();
        for id in ids {
            let root = self.find(id);
            let members = by_root.entry(root).or_insert_with(|| {
                root_order.push(root);
                Vec::new()
            });
            members.push(id);
        }
        root_order
            .into_iter()
            .map(|r| by_root.remove(&r).unwrap()) // Safe: every root was inserted above
            .collect()
    }
}

// =============================================================================
// GROUP MANAGER
// =============================================================================

/// Failure detail for one member pair during a merged resolution.
#[derive(Debug, Clone)]
pub struct GroupMergeFailure {
    pub source_lead_id: Uuid,
    pub target_lead_id: Uuid,
    pub error: String,
}

/// Outcome of a resolve call.
#[derive(Debug)]
pub struct GroupResolution {
    pub group: DuplicateGroup,
    pub merged: Vec<MergeOperation>,
    pub failures: Vec<GroupMergeFailure>,
}

/// Clusters batch scan results into duplicate groups and drives their
/// resolution.
pub struct GroupManager {
    lookup: Arc<dyn LeadLookup>,
    store: Arc<dyn GroupStore>,
    merge_engine: Arc<MergeEngine>,
    notifier: Arc<dyn DedupNotifier>,
}

impl GroupManager {
    pub fn new(
        lookup: Arc<dyn LeadLookup>,
        store: Arc<dyn GroupStore>,
        merge_engine: Arc<MergeEngine>,
        notifier: Arc<dyn DedupNotifier>,
    ) -> Self {
        Self {
            lookup,
            store,
            merge_engine,
            notifier,
        }
    }

    /// Cluster per-lead scan results into persisted duplicate groups.
    ///
    /// Each scan entry pairs a lead id with the candidates found for it.
    /// Leads whose candidate sets overlap land in one group. The primary
    /// defaults to the oldest member by `created_at`; members that no
    /// longer resolve in the store are dropped with a warning.
    pub async fn build_groups(
        &self,
        tenant_id: Uuid,
        scans: &[(Uuid, Vec<DuplicateCandidate>)],
    ) -> Result<Vec<DuplicateGroup>> {
        let mut ds = DisjointSet::new();
        for (lead_id, candidates) in scans {
            ds.insert(*lead_id);
            for candidate in candidates {
                ds.union(*lead_id, candidate.lead_id);
            }
        }

        // Best candidate entry per lead id across all scans.
        let mut best_candidates: HashMap<Uuid, DuplicateCandidate> = HashMap::new();
        for (_, candidates) in scans {
            for candidate in candidates {
                best_candidates
                    .entry(candidate.lead_id)
                    .and_modify(|existing| {
                        if candidate.similarity_score > existing.similarity_score {
                            *existing = candidate.clone();
                        }
                    })
                    .or_insert_with(|| candidate.clone());
            }
        }

        let mut groups = Vec::new();
        for component in ds.components() {
            if component.len() < 2 {
                continue;
            }

            let mut members: Vec<LeadRecord> = Vec::with_capacity(component.len());
            for member_id in &component {
                match self.lookup.find_by_id(tenant_id, *member_id).await {
                    Ok(Some(lead)) => members.push(lead),
                    Ok(None) => {
                        warn!(
                            subsystem = "groups",
                            %tenant_id,
                            lead_id = %member_id,
                            "Dropping unresolvable group member"
                        );
                    }
                    Err(e) => {
                        warn!(
                            subsystem = "groups",
                            %tenant_id,
                            lead_id = %member_id,
                            error = %e,
                            "Dropping group member after lookup failure"
                        );
                    }
                }
            }
            if members.len() < 2 {
                continue;
            }

            // Oldest first; the head becomes the primary.
            members.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            let primary_lead_id = members[0].id;
            let member_ids: Vec<Uuid> = members.iter().map(|m| m.id).collect();

            let mut candidates: Vec<DuplicateCandidate> = member_ids
                .iter()
                .filter_map(|id| best_candidates.get(id).cloned())
                .collect();
            candidates.sort_by(|a, b| {
                b.similarity_score
                    .partial_cmp(&a.similarity_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let group = DuplicateGroup {
                group_id: Uuid::new_v4(),
                tenant_id,
                candidates,
                member_ids,
                primary_lead_id,
                created_at: Utc::now(),
                resolved: false,
                resolution_method: None,
            };

            self.store.insert(&group).await?;
            info!(
                subsystem = "groups",
                op = "build_groups",
                %tenant_id,
                group_id = %group.group_id,
                member_count = group.member_ids.len(),
                primary_lead_id = %group.primary_lead_id,
                "Duplicate group created"
            );
            self.notifier.on_group_created(&group).await;
            groups.push(group);
        }

        Ok(groups)
    }

    /// Resolve a group with the given method.
    ///
    /// For `Merged`, every non-primary member is merged into the primary in
    /// ascending `created_at` order, continuing past individual failures.
    /// The group is marked resolved only when all merges succeeded;
    /// otherwise it stays open and the failures are reported back.
    pub async fn resolve_group(
        &self,
        tenant_id: Uuid,
        group_id: Uuid,
        method: ResolutionMethod,
        primary_override: Option<Uuid>,
        performed_by: &str,
    ) -> Result<GroupResolution> {
        let mut group = self
            .store
            .get(tenant_id, group_id)
            .await?
            .ok_or(Error::GroupNotFound(group_id))?;

        if group.resolved {
            return Err(Error::Conflict(format!(
                "group {group_id} is already resolved"
            )));
        }

        let primary = primary_override.unwrap_or(group.primary_lead_id);
        if !group.member_ids.contains(&primary) {
            return Err(Error::InvalidInput(format!(
                "primary lead {primary} is not a member of group {group_id}"
            )));
        }

        let mut merged = Vec::new();
        let mut failures = Vec::new();

        if method == ResolutionMethod::Merged {
            // Merge order: ascending created_at among the non-primary
            // members. Members that no longer resolve count as failures.
            let mut sources: Vec<LeadRecord> = Vec::new();
            for member_id in group.member_ids.iter().filter(|id| **id != primary) {
                match self.lookup.find_by_id(tenant_id, *member_id).await {
                    Ok(Some(lead)) => sources.push(lead),
                    Ok(None) => failures.push(GroupMergeFailure {
                        source_lead_id: *member_id,
                        target_lead_id: primary,
                        error: Error::LeadNotFound(*member_id).to_string(),
                    }),
                    Err(e) => failures.push(GroupMergeFailure {
                        source_lead_id: *member_id,
                        target_lead_id: primary,
                        error: e.to_string(),
                    }),
                }
            }
            sources.sort_by(|a, b| a.created_at.cmp(&b.created_at));

            for source in sources {
                match self
                    .merge_engine
                    .merge_leads(tenant_id, source.id, primary, &HashMap::new(), performed_by)
                    .await
                {
                    Ok(op) => merged.push(op),
                    Err(e) => {
                        debug!(
                            subsystem = "groups",
                            op = "resolve_group",
                            %tenant_id,
                            %group_id,
                            source_lead_id = %source.id,
                            error = %e,
                            "Member merge failed, continuing"
                        );
                        failures.push(GroupMergeFailure {
                            source_lead_id: source.id,
                            target_lead_id: primary,
                            error: e.to_string(),
                        });
                    }
                }
            }

            if !failures.is_empty() {
                info!(
                    subsystem = "groups",
                    op = "resolve_group",
                    %tenant_id,
                    %group_id,
                    merged_count = merged.len(),
                    failure_count = failures.len(),
                    "Group left unresolved after partial merge failures"
                );
                return Ok(GroupResolution {
                    group,
                    merged,
                    failures,
                });
            }
        }

        group.resolved = true;
        group.resolution_method = Some(method);
        group.primary_lead_id = primary;
        self.store.update(&group).await?;

        info!(
            subsystem = "groups",
            op = "resolve_group",
            %tenant_id,
            %group_id,
            method = method.as_str(),
            primary_lead_id = %primary,
            "Duplicate group resolved"
        );

        Ok(GroupResolution {
            group,
            merged,
            failures,
        })
    }

    /// Fetch a group, failing with NotFound when absent.
    pub async fn get_group(&self, tenant_id: Uuid, group_id: Uuid) -> Result<DuplicateGroup> {
        self.store
            .get(tenant_id, group_id)
            .await?
            .ok_or(Error::GroupNotFound(group_id))
    }

    /// List a tenant's groups, optionally filtered by resolution state.
    pub async fn list_groups(
        &self,
        tenant_id: Uuid,
        resolved: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DuplicateGroup>> {
        self.store.list(tenant_id, resolved, limit, offset).await
    }

    /// Delete a group, marking its members as not duplicates.
    pub async fn delete_group(&self, tenant_id: Uuid, group_id: Uuid) -> Result<()> {
        self.store.delete(tenant_id, group_id).await
    }
}
