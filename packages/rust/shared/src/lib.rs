//! Shared types, error model, and configuration for LeadFlow.
//!
//! This crate is the foundation depended on by all other LeadFlow crates.
//! It provides:
//! - [`LeadFlowError`] — the unified error type
//! - Domain types ([`Lead`], [`LeadField`], [`FieldSet`], [`RawLead`], [`ScoreRule`])
//! - Match-key normalization helpers
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod normalize;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, DirectoriesConfig, RegistryEntry, ScoringConfig,
    WaterfallConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, resolve_db_path,
};
pub use error::{LeadFlowError, Result};
pub use types::{
    CURRENT_SCHEMA_VERSION, Condition, FieldSet, FusionUpdate, Lead, LeadField, RawLead,
    ScoreRule,
};
