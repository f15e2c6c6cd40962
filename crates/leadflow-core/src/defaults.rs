//! Centralized default constants for the leadflow system.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates reference these constants instead of defining their
//! own magic numbers.

// =============================================================================
// DETECTION
// =============================================================================

/// Minimum confidence for a lead to count as a duplicate candidate.
pub const DETECTION_THRESHOLD: f64 = 0.8;

/// Minimum string similarity for a fuzzy field match.
pub const FUZZY_THRESHOLD: f64 = 0.7;

/// Payload attributes compared by the bulk field-by-field scan.
pub const FIELDS_TO_COMPARE: &[&str] = &["name", "email", "phone", "company"];

/// Upper bound on candidate pool size per strategy. Keeps a fuzzy scan
/// against a large tenant from degrading into a full-table comparison.
pub const CANDIDATE_POOL_LIMIT: usize = 50;

/// Per-item timeout for candidate lookups. A slow scan against a degraded
/// store is treated as "no duplicate found", never as a fatal error.
pub const LOOKUP_TIMEOUT_MS: u64 = 5_000;

// =============================================================================
// PHONE NORMALIZATION
// =============================================================================

/// Country prefix applied to bare local subscriber numbers.
pub const PHONE_COUNTRY_PREFIX: &str = "+45";

/// Digit length of a local Danish subscriber number.
pub const PHONE_LOCAL_DIGITS: usize = 8;

// =============================================================================
// BULK OPERATIONS
// =============================================================================

/// Default number of items per bulk batch.
pub const BULK_BATCH_SIZE: usize = 100;

/// Maximum allowed bulk batch size.
pub const BULK_MAX_BATCH_SIZE: usize = 1_000;

// =============================================================================
// AUDIT
// =============================================================================

/// Upper bound on a single audit append. The sink is fire-and-forget and
/// must never block the merge critical path indefinitely.
pub const AUDIT_APPEND_TIMEOUT_MS: u64 = 2_000;

// =============================================================================
// CONFIG STORE
// =============================================================================

/// Settings key under which a tenant's detection config is stored.
pub const CONFIG_SETTINGS_KEY: &str = "duplicate_detection_config";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_in_unit_range() {
        assert!((0.0..=1.0).contains(&DETECTION_THRESHOLD));
        assert!((0.0..=1.0).contains(&FUZZY_THRESHOLD));
    }

    #[test]
    fn test_batch_bounds_ordered() {
        assert!(BULK_BATCH_SIZE >= 1);
        assert!(BULK_BATCH_SIZE <= BULK_MAX_BATCH_SIZE);
    }

    #[test]
    fn test_phone_prefix_shape() {
        assert!(PHONE_COUNTRY_PREFIX.starts_with('+'));
        assert_eq!(PHONE_LOCAL_DIGITS, 8);
    }
}
