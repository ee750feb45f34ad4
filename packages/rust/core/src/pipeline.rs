//! End-to-end matching run: validate → discover → catalog → enrich → rank.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{Span, field, info, instrument};

use artmatch_gateway::LanguageModel;
use artmatch_shared::{
    AppConfig, ArtMatchError, Candidate, ColumnsConfig, EnrichedItem, Recommendation, Record,
    Result, RunId, candidates_from_records, items_from_records,
};

use crate::attributes::discover_attributes;
use crate::catalog::AttributeCatalog;
use crate::enrichment::{EnrichOptions, EnrichmentSummary, enrich_items};
use crate::recommend::recommend;

/// Stage names attached to errors that abort a run.
pub mod stage {
    pub const INPUT: &str = "input";
    pub const DISCOVERY: &str = "discovery";
    pub const ENRICHMENT: &str = "enrichment";
}

/// Configuration for a matching run.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Candidates kept per item.
    pub top_k: usize,
    /// Items enriched concurrently.
    pub concurrency: usize,
    pub columns: ColumnsConfig,
    /// Attributes used when discovery cannot decode the model's answer.
    pub fallback_attributes: Vec<String>,
}

impl From<&AppConfig> for MatchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            top_k: config.defaults.top_k,
            concurrency: config.defaults.concurrency,
            columns: config.columns.clone(),
            fallback_attributes: config.discovery.fallback_attributes.clone(),
        }
    }
}

/// Raw tables handed to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct MatchInput {
    pub candidate_columns: Vec<String>,
    pub candidates: Vec<Record>,
    pub item_columns: Vec<String>,
    pub items: Vec<Record>,
}

/// Result of a matching run.
#[derive(Debug)]
pub struct MatchRun {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    /// Relevant attributes, in discovery order.
    pub attributes: Vec<String>,
    pub catalog: AttributeCatalog,
    /// Enriched items in input order.
    pub enriched: Vec<EnrichedItem>,
    pub summary: EnrichmentSummary,
    /// One entry per item, in input order.
    pub recommendations: Vec<Recommendation>,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait PipelineProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called each time an item's enrichment answer arrives.
    fn item_enriched(&self, current: usize, total: usize, item_id: &str);
    /// Called when the run completes.
    fn done(&self, run: &MatchRun);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl PipelineProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_enriched(&self, _current: usize, _total: usize, _item_id: &str) {}
    fn done(&self, _run: &MatchRun) {}
}

fn require_column(columns: &[String], column: &str, table: &str) -> Result<()> {
    if columns.iter().any(|c| c == column) {
        Ok(())
    } else {
        Err(ArtMatchError::input(format!(
            "{table} table has no '{column}' column"
        )))
    }
}

/// Validate the candidate table.
pub fn validate_candidates(
    columns: &ColumnsConfig,
    header: &[String],
    records: Vec<Record>,
) -> Result<Vec<Candidate>> {
    require_column(header, &columns.candidate_id, "candidate")?;
    candidates_from_records(records, &columns.candidate_id)
}

/// Run the full matching pipeline.
///
/// 1. Validate both tables
/// 2. Discover relevant attributes (one invocation)
/// 3. Build the value catalog from the candidates
/// 4. Enrich every item (one invocation each)
/// 5. Score and rank candidates per item
///
/// Fatal errors come back wrapped in [`ArtMatchError::Stage`] naming the
/// stage that aborted; nothing is produced for later stages.
#[instrument(skip_all, fields(run_id = field::Empty, candidates = input.candidates.len(), items = input.items.len()))]
pub async fn run_matching(
    config: &MatchConfig,
    model: Arc<dyn LanguageModel>,
    input: MatchInput,
    progress: &dyn PipelineProgress,
) -> Result<MatchRun> {
    let start = Instant::now();
    let run_id = RunId::new();
    let started_at = Utc::now();
    Span::current().record("run_id", field::display(&run_id));

    info!(%run_id, %started_at, top_k = config.top_k, "starting matching run");

    // --- Phase 1: Validation ---
    progress.phase("Validating input");
    let candidates = validate_candidates(&config.columns, &input.candidate_columns, input.candidates)
        .map_err(|e| e.in_stage(stage::INPUT))?;

    require_column(&input.item_columns, &config.columns.item_id, "item")
        .and_then(|()| {
            require_column(
                &input.item_columns,
                &config.columns.item_description,
                "item",
            )
        })
        .map_err(|e| e.in_stage(stage::INPUT))?;
    let items = items_from_records(
        input.items,
        &config.columns.item_id,
        &config.columns.item_description,
    )
    .map_err(|e| e.in_stage(stage::INPUT))?;

    // --- Phase 2: Attribute discovery ---
    progress.phase("Discovering relevant attributes");
    let attributes = discover_attributes(
        model.as_ref(),
        &input.candidate_columns,
        &config.fallback_attributes,
    )
    .await
    .map_err(|e| e.in_stage(stage::DISCOVERY))?;

    // --- Phase 3: Catalog ---
    progress.phase("Building value catalog");
    let catalog = AttributeCatalog::build(&candidates, &attributes);

    // --- Phase 4: Enrichment ---
    progress.phase("Enriching items");
    let outcome = enrich_items(
        Arc::clone(&model),
        &items,
        &catalog,
        &attributes,
        &EnrichOptions {
            concurrency: config.concurrency,
        },
        progress,
    )
    .await
    .map_err(|e| e.in_stage(stage::ENRICHMENT))?;

    // --- Phase 5: Ranking ---
    progress.phase("Scoring candidates");
    let recommendations = recommend(&outcome.items, &candidates, &attributes, config.top_k);

    let run = MatchRun {
        run_id,
        started_at,
        attributes,
        catalog,
        enriched: outcome.items,
        summary: outcome.summary,
        recommendations,
        elapsed: start.elapsed(),
    };

    progress.done(&run);
    info!(
        run_id = %run.run_id,
        items = run.enriched.len(),
        degraded = run.summary.degraded_items,
        elapsed_ms = run.elapsed.as_millis() as u64,
        "matching run complete"
    );

    Ok(run)
}

/// Re-rank an already enriched item table without any model calls.
#[instrument(skip_all, fields(items = enriched.len(), candidates = candidates.len()))]
pub fn rerank(
    config: &MatchConfig,
    candidate_columns: &[String],
    candidates: Vec<Record>,
    enriched: Vec<Record>,
    attributes: &[String],
) -> Result<Vec<Recommendation>> {
    let candidates = validate_candidates(&config.columns, candidate_columns, candidates)?;

    let item_id = &config.columns.item_id;
    let items = enriched
        .into_iter()
        .enumerate()
        .map(|(row, record)| {
            let id = record.value(item_id).trim().to_string();
            if id.is_empty() {
                return Err(ArtMatchError::input(format!(
                    "enriched row {} has no '{item_id}' value",
                    row + 1
                )));
            }
            Ok(EnrichedItem {
                id,
                record,
                degraded: false,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(recommend(&items, &candidates, attributes, config.top_k))
}
