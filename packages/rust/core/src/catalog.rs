//! Per-attribute value catalog built from candidate records.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use artmatch_shared::{Candidate, split_values};

/// For each relevant attribute, the distinct values any candidate lists.
///
/// Every attribute passed to [`AttributeCatalog::build`] gets an entry, even
/// when no candidate has a value for it (or the column is missing).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeCatalog {
    values: BTreeMap<String, BTreeSet<String>>,
}

impl AttributeCatalog {
    /// Collect the distinct trimmed values of `attributes` across `candidates`.
    pub fn build(candidates: &[Candidate], attributes: &[String]) -> Self {
        let mut values: BTreeMap<String, BTreeSet<String>> = attributes
            .iter()
            .map(|attr| (attr.clone(), BTreeSet::new()))
            .collect();

        for candidate in candidates {
            for attr in attributes {
                let Some(raw) = candidate.record.get(attr) else {
                    continue;
                };
                if let Some(set) = values.get_mut(attr) {
                    set.extend(split_values(raw).into_iter().map(str::to_string));
                }
            }
        }

        debug!(
            attributes = values.len(),
            values = values.values().map(BTreeSet::len).sum::<usize>(),
            "built attribute catalog"
        );
        Self { values }
    }

    /// Distinct values known for `attribute`.
    pub fn values(&self, attribute: &str) -> Option<&BTreeSet<String>> {
        self.values.get(attribute)
    }

    /// Whether `value` appears among the candidates' values for `attribute`.
    pub fn contains(&self, attribute: &str, value: &str) -> bool {
        self.values
            .get(attribute)
            .is_some_and(|set| set.contains(value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Render the catalog as a pretty JSON object of sorted value lists.
    ///
    /// Key and value order is deterministic, so identical inputs produce
    /// identical prompts (and therefore cache hits).
    pub fn to_prompt_json(&self) -> String {
        let view: BTreeMap<&str, Vec<&str>> = self
            .values
            .iter()
            .map(|(attr, set)| (attr.as_str(), set.iter().map(String::as_str).collect()))
            .collect();
        serde_json::to_string_pretty(&view).unwrap_or_else(|_| "{}".to_string())
    }
}
