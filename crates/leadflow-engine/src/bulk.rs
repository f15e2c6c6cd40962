//! Batch-oriented bulk operations with partial-failure semantics.
//!
//! Bulk operations never throw for partial failures: each item is its own
//! unit of work and the caller gets a structured result with aggregate
//! counts and per-item errors. Only a fully malformed request errors.
//! Cancellation stops scheduling new items; an in-flight merge always runs
//! to completion or explicit failure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use leadflow_core::{
    defaults, ConfigStore, DuplicateCandidate, DuplicateDetectionConfig, DuplicateGroup, Error,
    Result,
};
use leadflow_match::DuplicateFinder;

use crate::groups::GroupManager;
use crate::merge::MergeEngine;

// =============================================================================
// CANCELLATION
// =============================================================================

/// Cooperative cancellation signal for bulk operations.
///
/// Cheap to clone; all clones observe the same flag. Modeled after a
/// worker shutdown signal: checked between items, never interrupting one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// =============================================================================
// REQUEST / RESULT TYPES
// =============================================================================

/// One source/target pair for a bulk merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePair {
    pub source_lead_id: Uuid,
    pub target_lead_id: Uuid,
}

/// Options for bulk merge processing.
#[derive(Debug, Clone)]
pub struct BulkOptions {
    /// Items per batch, bounded 1..=1000.
    pub batch_size: usize,
    /// Abort scheduling after the first failed pair. Already-committed
    /// merges are never rolled back; rollback is per-merge, not per-batch.
    pub stop_on_error: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            batch_size: defaults::BULK_BATCH_SIZE,
            stop_on_error: false,
        }
    }
}

impl BulkOptions {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size < 1 || self.batch_size > defaults::BULK_MAX_BATCH_SIZE {
            return Err(Error::InvalidInput(format!(
                "batch_size must be between 1 and {}, got {}",
                defaults::BULK_MAX_BATCH_SIZE,
                self.batch_size
            )));
        }
        Ok(())
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }
}

/// Per-pair failure detail.
#[derive(Debug, Clone)]
pub struct BulkMergeError {
    pub pair_index: usize,
    pub source_lead_id: Uuid,
    pub target_lead_id: Uuid,
    pub error: String,
}

/// Aggregate outcome of a bulk merge.
#[derive(Debug, Clone, Default)]
pub struct BulkMergeResult {
    pub total_records: usize,
    /// Pairs actually attempted (exact count before any cancellation).
    pub processed_records: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<BulkMergeError>,
    pub cancelled: bool,
}

// =============================================================================
// COORDINATOR
// =============================================================================

/// Drives find/merge/resolve operations over batches of leads.
pub struct BulkCoordinator {
    finder: Arc<DuplicateFinder>,
    merge_engine: Arc<MergeEngine>,
    groups: Arc<GroupManager>,
    config_store: Arc<dyn ConfigStore>,
}

impl BulkCoordinator {
    pub fn new(
        finder: Arc<DuplicateFinder>,
        merge_engine: Arc<MergeEngine>,
        groups: Arc<GroupManager>,
        config_store: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            finder,
            merge_engine,
            groups,
            config_store,
        }
    }

    /// Scan a batch of leads for duplicates and cluster the results into
    /// groups.
    ///
    /// Leads are processed in input order so the result is deterministic
    /// for a given input. Scan failures on individual leads degrade to "no
    /// candidates" in keeping with detection's fail-soft policy.
    pub async fn bulk_check(
        &self,
        tenant_id: Uuid,
        lead_ids: &[Uuid],
        threshold: f64,
        cancel: &CancelToken,
    ) -> Result<Vec<DuplicateGroup>> {
        if !(0.0..=1.0).contains(&threshold) || threshold.is_nan() {
            return Err(Error::InvalidInput(format!(
                "threshold must be between 0.0 and 1.0, got {threshold}"
            )));
        }

        let start = Instant::now();
        let mut scans: Vec<(Uuid, Vec<DuplicateCandidate>)> = Vec::with_capacity(lead_ids.len());

        for lead_id in lead_ids {
            if cancel.is_cancelled() {
                info!(
                    subsystem = "bulk",
                    op = "bulk_check",
                    %tenant_id,
                    processed = scans.len(),
                    "Bulk check cancelled"
                );
                break;
            }
            match self
                .finder
                .find_duplicates_for_lead(tenant_id, *lead_id, threshold)
                .await
            {
                Ok(candidates) => scans.push((*lead_id, candidates)),
                Err(e) => {
                    warn!(
                        subsystem = "bulk",
                        op = "bulk_check",
                        %tenant_id,
                        lead_id = %lead_id,
                        error = %e,
                        "Scan failed for lead, treating as no candidates"
                    );
                    scans.push((*lead_id, Vec::new()));
                }
            }
        }

        let groups = self.groups.build_groups(tenant_id, &scans).await?;

        info!(
            subsystem = "bulk",
            op = "bulk_check",
            %tenant_id,
            processed = scans.len(),
            group_count = groups.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Bulk check complete"
        );
        Ok(groups)
    }

    /// Merge many source/target pairs in batches.
    ///
    /// Each pair is attempted independently; a failure does not abort the
    /// batch unless `stop_on_error` is set, and committed merges from
    /// earlier pairs are never rolled back either way.
    pub async fn bulk_merge(
        &self,
        tenant_id: Uuid,
        pairs: &[MergePair],
        options: &BulkOptions,
        cancel: &CancelToken,
        performed_by: &str,
    ) -> Result<BulkMergeResult> {
        if pairs.is_empty() {
            return Err(Error::InvalidInput("mergePairs must not be empty".into()));
        }
        options.validate()?;

        let start = Instant::now();
        let mut result = BulkMergeResult {
            total_records: pairs.len(),
            ..Default::default()
        };

        'batches: for (batch_index, batch) in pairs.chunks(options.batch_size).enumerate() {
            debug!(
                subsystem = "bulk",
                op = "bulk_merge",
                %tenant_id,
                batch_index,
                batch_len = batch.len(),
                "Processing merge batch"
            );

            for (offset, pair) in batch.iter().enumerate() {
                if cancel.is_cancelled() {
                    result.cancelled = true;
                    break 'batches;
                }

                let pair_index = batch_index * options.batch_size + offset;
                result.processed_records += 1;

                match self
                    .merge_engine
                    .merge_leads(
                        tenant_id,
                        pair.source_lead_id,
                        pair.target_lead_id,
                        &HashMap::new(),
                        performed_by,
                    )
                    .await
                {
                    Ok(_) => result.success_count += 1,
                    Err(e) => {
                        result.error_count += 1;
                        result.errors.push(BulkMergeError {
                            pair_index,
                            source_lead_id: pair.source_lead_id,
                            target_lead_id: pair.target_lead_id,
                            error: e.to_string(),
                        });
                        if options.stop_on_error {
                            break 'batches;
                        }
                    }
                }
            }
        }

        info!(
            subsystem = "bulk",
            op = "bulk_merge",
            %tenant_id,
            processed = result.processed_records,
            success = result.success_count,
            errors = result.error_count,
            cancelled = result.cancelled,
            duration_ms = start.elapsed().as_millis() as u64,
            "Bulk merge complete"
        );
        Ok(result)
    }

    /// Fetch the tenant's detection config.
    pub async fn get_config(&self, tenant_id: Uuid) -> Result<DuplicateDetectionConfig> {
        self.config_store.get_duplicate_config(tenant_id).await
    }

    /// Validate and replace the tenant's detection config.
    pub async fn update_config(
        &self,
        tenant_id: Uuid,
        config: &DuplicateDetectionConfig,
    ) -> Result<()> {
        config.validate()?;
        self.config_store
            .put_duplicate_config(tenant_id, config)
            .await?;
        info!(
            subsystem = "bulk",
            op = "update_config",
            %tenant_id,
            threshold = config.threshold,
            fuzzy_threshold = config.fuzzy_threshold,
            rule_count = config.custom_rules.len(),
            "Detection config replaced"
        );
        Ok(())
    }
}
