//! # leadflow-engine
//!
//! The lead deduplication & merge engine: field-level merging with audit
//! history, duplicate group management, and batch-oriented bulk operations
//! with partial-failure semantics.
//!
//! The engine executes synchronously relative to its caller and holds no
//! in-process lock across persistence calls; concurrency control for merge
//! writes comes from the store's compare-and-set guard.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use leadflow_core::NoOpNotifier;
//! use leadflow_engine::{BulkCoordinator, GroupManager, MergeEngine};
//! use leadflow_match::DuplicateFinder;
//!
//! let notifier = Arc::new(NoOpNotifier);
//! let finder = Arc::new(DuplicateFinder::new(leads.clone(), settings.clone(), notifier.clone()));
//! let merge = Arc::new(MergeEngine::new(leads.clone(), leads.clone(), audit, notifier.clone()));
//! let groups = Arc::new(GroupManager::new(leads.clone(), group_store, merge.clone(), notifier));
//! let bulk = BulkCoordinator::new(finder, merge, groups, settings);
//! ```

pub mod bulk;
pub mod groups;
pub mod merge;
pub mod test_fixtures;

pub use bulk::{
    BulkCoordinator, BulkMergeError, BulkMergeResult, BulkOptions, CancelToken, MergePair,
};
pub use groups::{DisjointSet, GroupManager, GroupMergeFailure, GroupResolution};
pub use merge::{
    merge_lead_payloads, MergeEngine, AUDIT_MERGE_COMMITTED, AUDIT_MERGE_FAILED,
    AUDIT_MERGE_STARTED,
};
