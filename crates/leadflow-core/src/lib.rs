//! # leadflow-core
//!
//! Core types, traits, and abstractions for the leadflow lead
//! deduplication & merge engine.
//!
//! This crate provides the foundational data structures and trait
//! definitions that the matching, engine, and persistence crates depend
//! on.

pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::{
    DuplicateDetectionConfig, DuplicateRule, RuleCombination, RuleCondition,
};
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
