//! Matching pipeline for artmatch.
//!
//! Discovers which candidate attributes matter, labels every item with
//! catalog values through a [`LanguageModel`](artmatch_gateway::LanguageModel),
//! and ranks candidates per item by mean per-attribute Jaccard similarity.

pub mod attributes;
pub mod catalog;
pub mod enrichment;
pub mod extract;
pub mod pipeline;
pub mod recommend;
pub mod scoring;

#[cfg(test)]
mod testing;

pub use attributes::{build_discovery_prompt, discover_attributes, parse_discovery_answer};
pub use catalog::AttributeCatalog;
pub use enrichment::{
    EnrichOptions, EnrichmentOutcome, EnrichmentSummary, build_enrichment_prompt, enrich_items,
    parse_selections,
};
pub use extract::{decode_object, extract_json_object};
pub use pipeline::{
    MatchConfig, MatchInput, MatchRun, PipelineProgress, SilentProgress, rerank, run_matching,
};
pub use recommend::{rank, recommend};
pub use scoring::{jaccard, score_pair};
