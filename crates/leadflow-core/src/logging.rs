//! Structured logging schema and field name constants for leadflow.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Operation completions (merge committed, group resolved) |
//! | DEBUG | Decision points, strategy outcomes, config choices |
//! | TRACE | Per-item iteration in bulk scans |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "match", "merge", "groups", "bulk", "db"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "finder", "cascade", "merge_engine", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "find_duplicate", "merge_leads", "bulk_merge", "resolve_group"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Tenant UUID scoping the operation.
pub const TENANT_ID: &str = "tenant_id";

/// Lead UUID being operated on.
pub const LEAD_ID: &str = "lead_id";

/// Merge source lead UUID.
pub const SOURCE_LEAD_ID: &str = "source_lead_id";

/// Merge target lead UUID.
pub const TARGET_LEAD_ID: &str = "target_lead_id";

/// Duplicate group UUID.
pub const GROUP_ID: &str = "group_id";

// ─── Detection fields ──────────────────────────────────────────────────────

/// Strategy that resolved a cascade call.
/// Values: "email_exact", "phone_exact", "name_address_fuzzy",
/// "name_phone_fuzzy", "none_found"
pub const STRATEGY: &str = "strategy";

/// Number of duplicate candidates found.
pub const CANDIDATE_COUNT: &str = "candidate_count";

/// Similarity score of the best candidate.
pub const SIMILARITY: &str = "similarity";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of merge conflicts recorded.
pub const CONFLICT_COUNT: &str = "conflict_count";

/// Items processed by a bulk operation.
pub const PROCESSED: &str = "processed";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
