//! Attribute discovery: ask the model which candidate columns matter for matching.

use serde::Deserialize;
use tracing::{info, instrument, warn};

use artmatch_gateway::LanguageModel;
use artmatch_shared::Result;

use crate::extract::decode_object;

/// Key the model is asked to answer under.
pub const RELEVANT_COLUMNS_KEY: &str = "relevant_columns";

#[derive(Debug, Deserialize)]
struct DiscoveryAnswer {
    #[serde(default)]
    relevant_columns: Vec<String>,
}

/// Prompt listing the candidate columns and requesting a JSON-only answer.
pub fn build_discovery_prompt(columns: &[String]) -> String {
    let listing = columns
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "We have a buyer dataset with these columns:\n\
         {listing}\n\
         Which of these columns are relevant for matching an artwork to a buyer \
         from an artistic point of view (style, medium, motivation, ...)?\n\
         IMPORTANT: answer with valid JSON only, using the key \"{RELEVANT_COLUMNS_KEY}\". \
         No extra text. For example:\n\
         {{\n  \"{RELEVANT_COLUMNS_KEY}\": [\"Preferred Art Styles\", \"Favorite Mediums\"]\n}}\n"
    )
}

/// Decode a discovery answer into an ordered, de-duplicated attribute list.
///
/// A missing key yields an empty list; a wrong-typed key is a format error.
pub fn parse_discovery_answer(text: &str) -> Result<Vec<String>> {
    let answer: DiscoveryAnswer = decode_object(text)?;
    let mut attributes: Vec<String> = Vec::with_capacity(answer.relevant_columns.len());
    for name in answer.relevant_columns {
        let name = name.trim();
        if !name.is_empty() && !attributes.iter().any(|a| a == name) {
            attributes.push(name.to_string());
        }
    }
    Ok(attributes)
}

/// Choose the relevant attributes among `columns`.
///
/// Exactly one model invocation. An undecodable answer (or an unusable
/// response shape) falls back to `fallback`; an unreachable upstream is
/// returned as an error so the run can abort.
#[instrument(skip_all, fields(columns = columns.len()))]
pub async fn discover_attributes(
    model: &dyn LanguageModel,
    columns: &[String],
    fallback: &[String],
) -> Result<Vec<String>> {
    let prompt = build_discovery_prompt(columns);

    let parsed = model
        .invoke(&prompt)
        .await
        .and_then(|text| parse_discovery_answer(&text));

    let attributes = match parsed {
        Ok(attributes) => attributes,
        Err(e) if e.is_format() => {
            warn!(error = %e, fallback = ?fallback, "could not decode discovery answer, using fallback attributes");
            fallback.to_vec()
        }
        Err(e) => return Err(e),
    };

    for attr in attributes.iter().filter(|a| !columns.contains(a)) {
        warn!(attribute = %attr, "relevant attribute is not a candidate column; it will score as empty");
    }

    info!(attributes = ?attributes, "discovered relevant attributes");
    Ok(attributes)
}
