//! Shared types, error model, and configuration for artmatch.
//!
//! This crate is the foundation depended on by all other artmatch crates.
//! It provides:
//! - [`ArtMatchError`], the unified error type
//! - Domain types ([`Record`], [`Candidate`], [`Item`], [`EnrichedItem`], [`ScoredPair`])
//! - Configuration ([`AppConfig`], [`GatewaySettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ColumnsConfig, DefaultsConfig, DiscoveryConfig, GatewaySettings, ModelConfig,
    RetryConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{ArtMatchError, Result};
pub use types::{
    Candidate, EnrichedItem, Item, Recommendation, Record, RunId, ScoredPair,
    candidates_from_records, items_from_records, split_values,
};
