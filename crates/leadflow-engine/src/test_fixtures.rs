//! In-memory implementations of the collaborator traits.
//!
//! Always compiled (not `#[cfg(test)]`) so integration tests in dependent
//! crates can reuse them. The lead store serializes all access through one
//! mutex, which makes the merge write pair atomic the same way the SQL
//! adapter's transaction does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use leadflow_core::{
    AuditSink, ConfigStore, DedupNotifier, DuplicateCandidate, DuplicateDetectionConfig,
    DuplicateGroup, Error, GroupStore, LeadLookup, LeadRecord, LeadStatus, LeadWriter,
    MergeAuditEvent, MergeOperation, Result,
};
use leadflow_match::{normalize_email, normalize_phone, normalize_postal_code};

/// Build an active lead created `age_minutes` ago.
pub fn lead_with(tenant_id: Uuid, payload: JsonValue, age_minutes: i64) -> LeadRecord {
    let now = Utc::now();
    LeadRecord {
        id: Uuid::new_v4(),
        tenant_id,
        payload,
        status: LeadStatus::Active,
        merged_into: None,
        version: 1,
        created_at: now - Duration::minutes(age_minutes),
        updated_at: now,
    }
}

// =============================================================================
// LEAD STORE
// =============================================================================

/// In-memory lead store implementing both lookup and conditional writes.
pub struct MemoryLeadStore {
    leads: Mutex<HashMap<Uuid, LeadRecord>>,
    fail_writes: AtomicBool,
    conflict_writes: AtomicBool,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self {
            leads: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
            conflict_writes: AtomicBool::new(false),
        }
    }

    pub fn insert(&self, lead: LeadRecord) {
        self.leads.lock().unwrap().insert(lead.id, lead);
    }

    pub fn get(&self, lead_id: Uuid) -> Option<LeadRecord> {
        self.leads.lock().unwrap().get(&lead_id).cloned()
    }

    /// Simulate a concurrent writer moving a lead's version.
    pub fn bump_version(&self, lead_id: Uuid) {
        if let Some(lead) = self.leads.lock().unwrap().get_mut(&lead_id) {
            lead.version += 1;
        }
    }

    /// Make every subsequent write fail with a transient store error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write lose its compare-and-set guard, the way
    /// a concurrent merge winning the race would.
    pub fn set_conflict_writes(&self, conflict: bool) {
        self.conflict_writes.store(conflict, Ordering::SeqCst);
    }

    fn normalized(lead: &LeadRecord, field: &str) -> Option<String> {
        let raw = lead.field(field)?;
        match field {
            "email" => normalize_email(raw),
            "phone" => normalize_phone(raw),
            "postal_code" => normalize_postal_code(raw),
            _ => Some(raw.trim().to_lowercase()),
        }
    }

    fn active_matching(&self, tenant_id: Uuid, field: &str, value: &str) -> Vec<LeadRecord> {
        let leads = self.leads.lock().unwrap();
        let mut matches: Vec<LeadRecord> = leads
            .values()
            .filter(|l| l.tenant_id == tenant_id && l.status == LeadStatus::Active)
            .filter(|l| Self::normalized(l, field).as_deref() == Some(value))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches
    }
}

impl Default for MemoryLeadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeadLookup for MemoryLeadStore {
    async fn find_by_id(&self, tenant_id: Uuid, lead_id: Uuid) -> Result<Option<LeadRecord>> {
        Ok(self
            .leads
            .lock()
            .unwrap()
            .get(&lead_id)
            .filter(|l| l.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_by_exact_field(
        &self,
        tenant_id: Uuid,
        field: &str,
        value: &str,
    ) -> Result<Vec<LeadRecord>> {
        Ok(self.active_matching(tenant_id, field, value))
    }

    async fn find_by_field(
        &self,
        tenant_id: Uuid,
        field: &str,
        value: &str,
    ) -> Result<Vec<LeadRecord>> {
        Ok(self.active_matching(tenant_id, field, value))
    }
}

#[async_trait]
impl LeadWriter for MemoryLeadStore {
    async fn update_merged_payload(
        &self,
        target_id: Uuid,
        payload: &JsonValue,
        expected_version: i64,
    ) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Store("write failed".into()));
        }
        let mut leads = self.leads.lock().unwrap();
        let lead = leads
            .get_mut(&target_id)
            .ok_or(Error::LeadNotFound(target_id))?;
        if lead.version != expected_version || lead.status != LeadStatus::Active {
            return Err(Error::Conflict(format!(
                "conditional payload update on {target_id} did not apply"
            )));
        }
        lead.payload = payload.clone();
        lead.version += 1;
        lead.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_merged(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        expected_version: i64,
    ) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Store("write failed".into()));
        }
        let mut leads = self.leads.lock().unwrap();
        let lead = leads
            .get_mut(&source_id)
            .ok_or(Error::LeadNotFound(source_id))?;
        if lead.version != expected_version || lead.status != LeadStatus::Active {
            return Err(Error::Conflict(format!(
                "source lead {source_id} is no longer active at the expected version"
            )));
        }
        lead.status = LeadStatus::Merged;
        lead.merged_into = Some(target_id);
        lead.version += 1;
        lead.updated_at = Utc::now();
        Ok(())
    }

    async fn commit_merge(
        &self,
        target_id: Uuid,
        payload: &JsonValue,
        target_version: i64,
        source_id: Uuid,
        source_version: i64,
    ) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Store("write failed".into()));
        }
        if self.conflict_writes.load(Ordering::SeqCst) {
            return Err(Error::Conflict(format!(
                "conditional payload update on {target_id} did not apply"
            )));
        }
        // One lock held across both halves: all-or-nothing.
        let mut leads = self.leads.lock().unwrap();

        {
            let target = leads
                .get(&target_id)
                .ok_or(Error::LeadNotFound(target_id))?;
            if target.version != target_version || target.status != LeadStatus::Active {
                return Err(Error::Conflict(format!(
                    "conditional payload update on {target_id} did not apply"
                )));
            }
            let source = leads
                .get(&source_id)
                .ok_or(Error::LeadNotFound(source_id))?;
            if source.version != source_version || source.status != LeadStatus::Active {
                return Err(Error::Conflict(format!(
                    "source lead {source_id} is no longer active at the expected version"
                )));
            }
        }

        let target = leads.get_mut(&target_id).expect("checked above");
        target.payload = payload.clone();
        target.version += 1;
        target.updated_at = Utc::now();

        let source = leads.get_mut(&source_id).expect("checked above");
        source.status = LeadStatus::Merged;
        source.merged_into = Some(target_id);
        source.version += 1;
        source.updated_at = Utc::now();
        Ok(())
    }
}

// =============================================================================
// GROUP STORE
// =============================================================================

/// In-memory duplicate group store.
pub struct MemoryGroupStore {
    groups: Mutex<HashMap<Uuid, DuplicateGroup>>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryGroupStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GroupStore for MemoryGroupStore {
    async fn insert(&self, group: &DuplicateGroup) -> Result<()> {
        self.groups
            .lock()
            .unwrap()
            .insert(group.group_id, group.clone());
        Ok(())
    }

    async fn get(&self, tenant_id: Uuid, group_id: Uuid) -> Result<Option<DuplicateGroup>> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .get(&group_id)
            .filter(|g| g.tenant_id == tenant_id)
            .cloned())
    }

    async fn update(&self, group: &DuplicateGroup) -> Result<()> {
        let mut groups = self.groups.lock().unwrap();
        if !groups.contains_key(&group.group_id) {
            return Err(Error::GroupNotFound(group.group_id));
        }
        groups.insert(group.group_id, group.clone());
        Ok(())
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        resolved: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DuplicateGroup>> {
        let groups = self.groups.lock().unwrap();
        let mut matching: Vec<DuplicateGroup> = groups
            .values()
            .filter(|g| g.tenant_id == tenant_id)
            .filter(|g| resolved.map(|r| g.resolved == r).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn delete(&self, tenant_id: Uuid, group_id: Uuid) -> Result<()> {
        let mut groups = self.groups.lock().unwrap();
        match groups.get(&group_id) {
            Some(g) if g.tenant_id == tenant_id => {
                groups.remove(&group_id);
                Ok(())
            }
            _ => Err(Error::GroupNotFound(group_id)),
        }
    }
}

// =============================================================================
// CONFIG STORE
// =============================================================================

/// In-memory config store falling back to defaults per tenant.
pub struct MemoryConfigStore {
    configs: Mutex<HashMap<Uuid, DuplicateDetectionConfig>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self {
            configs: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(tenant_id: Uuid, config: DuplicateDetectionConfig) -> Self {
        let store = Self::new();
        store.configs.lock().unwrap().insert(tenant_id, config);
        store
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get_duplicate_config(&self, tenant_id: Uuid) -> Result<DuplicateDetectionConfig> {
        Ok(self
            .configs
            .lock()
            .unwrap()
            .get(&tenant_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_duplicate_config(
        &self,
        tenant_id: Uuid,
        config: &DuplicateDetectionConfig,
    ) -> Result<()> {
        self.configs
            .lock()
            .unwrap()
            .insert(tenant_id, config.clone());
        Ok(())
    }
}

// =============================================================================
// AUDIT SINK
// =============================================================================

/// Audit sink capturing appended events in order.
pub struct RecordingAuditSink {
    events: Mutex<Vec<MergeAuditEvent>>,
    fail: bool,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A sink that errors on every append.
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<MergeAuditEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Action names in append order.
    pub fn actions(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }
}

impl Default for RecordingAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn append_event(&self, event: &MergeAuditEvent) -> Result<()> {
        if self.fail {
            return Err(Error::Store("audit sink down".into()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// =============================================================================
// NOTIFIER
// =============================================================================

/// Notifier capturing every signal, for asserting cascade order and merge
/// outcomes.
#[derive(Default)]
pub struct RecordingNotifier {
    strategies: Mutex<Vec<String>>,
    duplicates: Mutex<Vec<Uuid>>,
    groups: Mutex<Vec<Uuid>>,
    completed: Mutex<Vec<(Uuid, Uuid)>>,
    failed: Mutex<Vec<(Uuid, Uuid, String)>>,
}

impl RecordingNotifier {
    pub fn strategies(&self) -> Vec<String> {
        self.strategies.lock().unwrap().clone()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicates.lock().unwrap().len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.lock().unwrap().len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.lock().unwrap().len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.lock().unwrap().len()
    }
}

#[async_trait]
impl DedupNotifier for RecordingNotifier {
    async fn on_strategy_resolved(&self, _tenant_id: Uuid, strategy: &str) {
        self.strategies.lock().unwrap().push(strategy.to_string());
    }

    async fn on_duplicate_found(
        &self,
        _tenant_id: Uuid,
        lead_id: Uuid,
        _candidate: &DuplicateCandidate,
    ) {
        self.duplicates.lock().unwrap().push(lead_id);
    }

    async fn on_group_created(&self, group: &DuplicateGroup) {
        self.groups.lock().unwrap().push(group.group_id);
    }

    async fn on_merge_completed(&self, operation: &MergeOperation) {
        self.completed
            .lock()
            .unwrap()
            .push((operation.source_lead_id, operation.target_lead_id));
    }

    async fn on_merge_failed(&self, source_id: Uuid, target_id: Uuid, error: &str) {
        self.failed
            .lock()
            .unwrap()
            .push((source_id, target_id, error.to_string()));
    }
}
