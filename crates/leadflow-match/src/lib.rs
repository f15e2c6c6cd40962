//! # leadflow-match
//!
//! Candidate matching for leadflow: attribute normalization, edit-distance
//! similarity scoring, the ordered match strategy cascade, custom tenant
//! rules, and the duplicate candidate finder.

pub mod finder;
pub mod normalize;
pub mod rules;
pub mod similarity;
pub mod strategy;

pub use finder::DuplicateFinder;
pub use normalize::{
    normalize_address, normalize_email, normalize_name, normalize_phone,
    normalize_postal_code, NormalizedAttributes,
};
pub use rules::{evaluate_rules, RuleOutcome};
pub use similarity::{levenshtein, similarity};
pub use strategy::{
    default_cascade, EmailExact, MatchStrategy, NameAddressFuzzy, NamePhoneFuzzy, PhoneExact,
    StrategyHit, STRATEGY_EMAIL_EXACT, STRATEGY_NAME_ADDRESS_FUZZY, STRATEGY_NAME_PHONE_FUZZY,
    STRATEGY_NONE_FOUND, STRATEGY_PHONE_EXACT,
};
