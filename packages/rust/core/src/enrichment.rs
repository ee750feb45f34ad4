//! Item enrichment: label each item's description with catalog values.
//!
//! One model invocation per item. Answers are decoded with the same
//! brace-extraction strategy as discovery. A malformed answer never aborts
//! the batch: the item is emitted with every attribute empty and counted as
//! degraded. Only an unreachable upstream stops enrichment.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use artmatch_gateway::LanguageModel;
use artmatch_shared::{ArtMatchError, EnrichedItem, Item, Result};

use crate::catalog::AttributeCatalog;
use crate::extract::decode_object;
use crate::pipeline::PipelineProgress;

/// Separator used when joining selected values into a cell.
pub const VALUE_SEPARATOR: &str = ", ";

/// Selected values per attribute, in the order the model listed them.
pub type Selections = BTreeMap<String, Vec<String>>;

/// Enrichment tuning.
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Items whose invocations may be in flight at once.
    pub concurrency: usize,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

/// Counters describing how well the model's answers fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentSummary {
    /// Items whose answer could not be decoded (all attributes left empty).
    pub degraded_items: usize,
    /// Selected values that no candidate lists for that attribute.
    pub out_of_catalog_values: usize,
}

/// Enriched items in input order, plus the summary.
#[derive(Debug, Clone)]
pub struct EnrichmentOutcome {
    pub items: Vec<EnrichedItem>,
    pub summary: EnrichmentSummary,
}

// ---------------------------------------------------------------------------
// Prompt and answer handling
// ---------------------------------------------------------------------------

/// Prompt asking the model to pick, per attribute, the catalog values that fit `description`.
///
/// The prompt depends only on its inputs, so byte-identical descriptions
/// produce byte-identical prompts.
pub fn build_enrichment_prompt(
    description: &str,
    attributes: &[String],
    catalog: &AttributeCatalog,
) -> String {
    let example: BTreeMap<&str, Vec<&str>> = attributes
        .iter()
        .map(|attr| {
            let first = catalog
                .values(attr)
                .and_then(|set| set.iter().next())
                .map(String::as_str);
            (attr.as_str(), first.into_iter().collect())
        })
        .collect();
    let example = serde_json::to_string_pretty(&example).unwrap_or_else(|_| "{}".to_string());

    format!(
        "Below is an artwork description:\n\
         \"\"\"{description}\"\"\"\n\
         Attributes to label: {attributes}.\n\
         Possible values for each attribute, as JSON:\n\
         {catalog}\n\
         For each attribute, select the values that apply to the artwork.\n\
         IMPORTANT: answer with valid JSON only, one key per attribute holding a list of strings. \
         No extra text. For example:\n\
         {example}\n",
        attributes = attributes.join(", "),
        catalog = catalog.to_prompt_json(),
    )
}

/// Decode an enrichment answer into per-attribute selections.
///
/// Every attribute gets an entry. A list keeps its string entries; a single
/// string is split on commas; a missing key or any other JSON type is empty.
/// Fails only when no JSON object can be decoded at all.
pub fn parse_selections(text: &str, attributes: &[String]) -> Result<Selections> {
    let object: serde_json::Map<String, Value> = decode_object(text)?;
    Ok(attributes
        .iter()
        .map(|attr| {
            let values = object.get(attr).map(value_list).unwrap_or_default();
            (attr.clone(), values)
        })
        .collect())
}

fn value_list(value: &Value) -> Vec<String> {
    let tokens: Vec<&str> = match value {
        Value::Array(entries) => entries.iter().filter_map(Value::as_str).collect(),
        Value::String(s) => s.split(',').collect(),
        _ => Vec::new(),
    };

    let mut values: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens.into_iter().map(str::trim) {
        if !token.is_empty() && !values.iter().any(|v| v == token) {
            values.push(token.to_string());
        }
    }
    values
}

/// Copy `item`'s record and append one comma-joined column per attribute.
pub fn apply_selections(
    item: &Item,
    attributes: &[String],
    selections: &Selections,
    degraded: bool,
) -> EnrichedItem {
    let mut record = item.record.clone();
    for attr in attributes {
        let cell = selections
            .get(attr)
            .map(|values| values.join(VALUE_SEPARATOR))
            .unwrap_or_default();
        record.set(attr.clone(), cell);
    }
    EnrichedItem {
        id: item.id.clone(),
        record,
        degraded,
    }
}

/// Count (and log) selected values that the catalog does not contain.
fn count_out_of_catalog(item_id: &str, selections: &Selections, catalog: &AttributeCatalog) -> usize {
    let mut count = 0;
    for (attr, values) in selections {
        let unknown: Vec<&str> = values
            .iter()
            .map(String::as_str)
            .filter(|v| !catalog.contains(attr, v))
            .collect();
        if !unknown.is_empty() {
            warn!(item_id, attribute = %attr, values = ?unknown, "model selected values outside the catalog");
            count += unknown.len();
        }
    }
    count
}

// ---------------------------------------------------------------------------
// Enrichment run
// ---------------------------------------------------------------------------

/// Enrich every item, keeping input order.
///
/// At most `options.concurrency` invocations are outstanding at once (the
/// gateway applies its own in-flight cap on top). Returns an error only
/// when an invocation fails for a reason other than an undecodable answer.
#[instrument(skip_all, fields(items = items.len(), attributes = attributes.len(), concurrency = options.concurrency))]
pub async fn enrich_items(
    model: Arc<dyn LanguageModel>,
    items: &[Item],
    catalog: &AttributeCatalog,
    attributes: &[String],
    options: &EnrichOptions,
    progress: &dyn PipelineProgress,
) -> Result<EnrichmentOutcome> {
    let total = items.len();
    let limit = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, item) in items.iter().enumerate() {
        let prompt = build_enrichment_prompt(&item.description, attributes, catalog);
        let model = Arc::clone(&model);
        let limit = Arc::clone(&limit);
        tasks.spawn(async move {
            let _permit = limit.acquire_owned().await;
            (index, model.invoke(&prompt).await)
        });
    }

    let mut answers: Vec<Option<Result<String>>> = (0..total).map(|_| None).collect();
    let mut completed = 0;

    while let Some(joined) = tasks.join_next().await {
        let (index, answer) = joined
            .map_err(|e| ArtMatchError::Upstream(format!("enrichment task failed: {e}")))?;

        // Dropping the JoinSet on return cancels the remaining invocations
        let answer = match answer {
            Err(e) if !e.is_format() => return Err(e),
            other => other,
        };

        completed += 1;
        progress.item_enriched(completed, total, &items[index].id);
        answers[index] = Some(answer);
    }

    let mut summary = EnrichmentSummary::default();
    let mut enriched = Vec::with_capacity(total);

    for (item, answer) in items.iter().zip(answers) {
        let parsed = match answer {
            Some(Ok(text)) => parse_selections(&text, attributes),
            Some(Err(e)) => Err(e),
            None => Err(ArtMatchError::format("no answer recorded")),
        };

        let enriched_item = match parsed {
            Ok(selections) => {
                debug!(item_id = %item.id, ?selections, "enriched item");
                summary.out_of_catalog_values += count_out_of_catalog(&item.id, &selections, catalog);
                apply_selections(item, attributes, &selections, false)
            }
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "could not decode enrichment answer, attributes left empty");
                summary.degraded_items += 1;
                apply_selections(item, attributes, &Selections::new(), true)
            }
        };
        enriched.push(enriched_item);
    }

    info!(
        items = enriched.len(),
        degraded = summary.degraded_items,
        out_of_catalog = summary.out_of_catalog_values,
        "enrichment complete"
    );

    Ok(EnrichmentOutcome {
        items: enriched,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::testing::{Reply, ScriptedModel};
    use artmatch_shared::{Candidate, Record};

    fn attrs() -> Vec<String> {
        vec!["Preferred Styles".into(), "Favorite Mediums".into()]
    }

    fn catalog() -> AttributeCatalog {
        let candidates = vec![
            Candidate {
                id: "B1".into(),
                record: Record::from_pairs([
                    ("Buyer ID", "B1"),
                    ("Preferred Styles", "Abstract, Realist"),
                    ("Favorite Mediums", "Oil"),
                ]),
            },
            Candidate {
                id: "B2".into(),
                record: Record::from_pairs([
                    ("Buyer ID", "B2"),
                    ("Preferred Styles", "Pop"),
                    ("Favorite Mediums", "Ink, Watercolor"),
                ]),
            },
        ];
        AttributeCatalog::build(&candidates, &attrs())
    }

    fn item(id: &str, description: &str) -> Item {
        Item {
            id: id.into(),
            description: description.into(),
            record: Record::from_pairs([("Artwork ID", id), ("Description", description)]),
        }
    }

    async fn run(model: ScriptedModel, items: &[Item], concurrency: usize) -> Result<EnrichmentOutcome> {
        let model: Arc<dyn LanguageModel> = Arc::new(model);
        enrich_items(
            model,
            items,
            &catalog(),
            &attrs(),
            &EnrichOptions { concurrency },
            &SilentProgress,
        )
        .await
    }

    #[test]
    fn prompt_carries_description_attributes_and_catalog() {
        let prompt = build_enrichment_prompt("A misty harbor at dawn", &attrs(), &catalog());
        assert!(prompt.contains("\"\"\"A misty harbor at dawn\"\"\""));
        assert!(prompt.contains("Preferred Styles, Favorite Mediums"));
        assert!(prompt.contains("\"Watercolor\""));
        assert_eq!(
            prompt,
            build_enrichment_prompt("A misty harbor at dawn", &attrs(), &catalog())
        );
    }

    #[test]
    fn selections_accept_lists_strings_and_ignore_other_types() {
        let text = r#"{"Preferred Styles": ["Abstract", " Pop ", 3, "Abstract"], "Favorite Mediums": "Oil, Ink"}"#;
        let selections = parse_selections(text, &attrs()).unwrap();
        assert_eq!(selections["Preferred Styles"], vec!["Abstract", "Pop"]);
        assert_eq!(selections["Favorite Mediums"], vec!["Oil", "Ink"]);

        let selections = parse_selections(r#"{"Preferred Styles": 7}"#, &attrs()).unwrap();
        assert!(selections["Preferred Styles"].is_empty());
        assert!(selections["Favorite Mediums"].is_empty());
    }

    #[tokio::test]
    async fn malformed_answer_degrades_only_that_item() {
        let model = ScriptedModel::new()
            .text("misty harbor", r#"{"Preferred Styles": ["Realist"], "Favorite Mediums": ["Oil"]}"#)
            .text("neon grid", "Sorry, I am not sure.")
            .text("paper crane", r#"{"Preferred Styles": ["Pop"], "Favorite Mediums": ["Ink"]}"#);
        let items = vec![
            item("A1", "A misty harbor at dawn"),
            item("A2", "A neon grid of colour"),
            item("A3", "A folded paper crane"),
        ];
        let outcome = run(model, &items, 1).await.unwrap();

        assert_eq!(outcome.items.len(), 3);
        assert_eq!(outcome.items[0].record.value("Favorite Mediums"), "Oil");
        assert_eq!(outcome.items[1].record.value("Preferred Styles"), "");
        assert_eq!(outcome.items[1].record.value("Favorite Mediums"), "");
        assert!(outcome.items[1].degraded);
        assert_eq!(outcome.items[2].record.value("Preferred Styles"), "Pop");
        assert_eq!(outcome.summary.degraded_items, 1);
    }

    #[tokio::test]
    async fn unusable_response_shape_degrades() {
        let model = ScriptedModel::new().on("misty harbor", Reply::Format);
        let outcome = run(model, &[item("A1", "A misty harbor")], 1).await.unwrap();
        assert!(outcome.items[0].degraded);
        assert_eq!(outcome.summary.degraded_items, 1);
    }

    #[tokio::test]
    async fn missing_key_leaves_attribute_empty() {
        let model = ScriptedModel::new()
            .text("misty harbor", r#"Result: {"Preferred Styles": ["Abstract", "Realist"]}"#);
        let outcome = run(model, &[item("A1", "A misty harbor")], 1).await.unwrap();

        let record = &outcome.items[0].record;
        assert_eq!(record.value("Preferred Styles"), "Abstract, Realist");
        assert_eq!(record.get("Favorite Mediums"), Some(""));
        assert!(!outcome.items[0].degraded);
        assert_eq!(record.value("Description"), "A misty harbor");
    }

    #[tokio::test]
    async fn out_of_catalog_values_are_kept_and_counted() {
        let model = ScriptedModel::new().text(
            "misty harbor",
            r#"{"Preferred Styles": ["Impressionist", "Abstract"], "Favorite Mediums": ["Charcoal"]}"#,
        );
        let outcome = run(model, &[item("A1", "A misty harbor")], 1).await.unwrap();

        assert_eq!(
            outcome.items[0].record.value("Preferred Styles"),
            "Impressionist, Abstract"
        );
        assert_eq!(outcome.summary.out_of_catalog_values, 2);
    }

    #[tokio::test]
    async fn every_item_invokes_even_with_identical_descriptions() {
        let model = Arc::new(
            ScriptedModel::new().text("twin", r#"{"Preferred Styles": ["Pop"]}"#),
        );
        let items = vec![item("A1", "twin canvases"), item("A2", "twin canvases")];
        let outcome = enrich_items(
            model.clone(),
            &items,
            &catalog(),
            &attrs(),
            &EnrichOptions::default(),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(model.calls(), 2);
        let prompts = model.prompts();
        assert_eq!(prompts[0], prompts[1]);
        for enriched in &outcome.items {
            assert_eq!(enriched.record.value("Preferred Styles"), "Pop");
        }
    }

    #[tokio::test]
    async fn exhausted_upstream_aborts() {
        let model = ScriptedModel::new()
            .text("misty harbor", r#"{"Preferred Styles": ["Pop"]}"#)
            .on("neon grid", Reply::Exhausted);
        let items = vec![item("A1", "A misty harbor"), item("A2", "A neon grid")];
        let err = run(model, &items, 1).await.unwrap_err();
        assert!(matches!(err, ArtMatchError::UpstreamExhausted { .. }));
    }

    #[tokio::test]
    async fn concurrent_enrichment_keeps_input_order() {
        let mut model = ScriptedModel::new();
        let mut items = Vec::new();
        for n in 0..12 {
            let needle = format!("canvas number {n}.");
            model = model.text(&needle, &format!(r#"{{"Preferred Styles": ["Style {n}"]}}"#));
            items.push(item(&format!("A{n}"), &needle));
        }
        let outcome = run(model, &items, 4).await.unwrap();

        for (n, enriched) in outcome.items.iter().enumerate() {
            assert_eq!(enriched.id, format!("A{n}"));
            assert_eq!(enriched.record.value("Preferred Styles"), format!("Style {n}"));
        }
        // Every selected value is outside the catalog
        assert_eq!(outcome.summary.out_of_catalog_values, 12);
    }
}
