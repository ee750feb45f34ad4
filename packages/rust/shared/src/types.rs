//! Core domain types for artmatch runs.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ArtMatchError, Result};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One row of a delimited table: column name to string value, in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from `(column, value)` pairs. Later duplicates overwrite earlier ones.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut record = Self::new();
        for (column, value) in pairs {
            record.set(column, value);
        }
        record
    }

    /// Value of `column`, if the column exists.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Value of `column`, or `""` when absent.
    pub fn value(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    /// Set `column`, replacing an existing value in place or appending a new column.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((column, value)),
        }
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Split a comma-separated attribute value into its distinct trimmed tokens.
///
/// Empty tokens are dropped, so `"a, ,b,"` yields `{"a", "b"}`.
pub fn split_values(raw: &str) -> BTreeSet<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Candidates and items
// ---------------------------------------------------------------------------

/// A recipient that items are matched against (a buyer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Value of the candidate id column.
    pub id: String,
    /// The full input row.
    pub record: Record,
}

/// A catalog entry to be matched (an artwork).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Value of the item id column.
    pub id: String,
    /// Free-text description sent to the model.
    pub description: String,
    /// The full input row.
    pub record: Record,
}

/// An item whose record carries one extra column per relevant attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedItem {
    pub id: String,
    /// Original item columns followed by the attribute columns (comma-joined values).
    pub record: Record,
    /// True when the model answer for this item could not be decoded.
    pub degraded: bool,
}

/// Score of one (item, candidate) pair, always within `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPair {
    pub item_id: String,
    pub candidate_id: String,
    pub score: f64,
}

/// Ranked matches for one item, best first, at most K entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub item_id: String,
    pub matches: Vec<ScoredPair>,
}

/// Validate candidate rows: the id column must be present, non-empty and unique.
pub fn candidates_from_records(records: Vec<Record>, id_column: &str) -> Result<Vec<Candidate>> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .enumerate()
        .map(|(row, record)| {
            let id = required_value(&record, id_column, "candidate", row)?;
            if !seen.insert(id.clone()) {
                return Err(ArtMatchError::input(format!(
                    "duplicate candidate id '{id}' at row {}",
                    row + 1
                )));
            }
            Ok(Candidate { id, record })
        })
        .collect()
}

/// Validate item rows: id and description columns must be present; ids non-empty and unique.
pub fn items_from_records(
    records: Vec<Record>,
    id_column: &str,
    description_column: &str,
) -> Result<Vec<Item>> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .enumerate()
        .map(|(row, record)| {
            let id = required_value(&record, id_column, "item", row)?;
            let description = record.get(description_column).ok_or_else(|| {
                ArtMatchError::input(format!(
                    "item row {} has no '{description_column}' column",
                    row + 1
                ))
            })?;
            if !seen.insert(id.clone()) {
                return Err(ArtMatchError::input(format!(
                    "duplicate item id '{id}' at row {}",
                    row + 1
                )));
            }
            Ok(Item {
                id,
                description: description.to_string(),
                record,
            })
        })
        .collect()
}

fn required_value(record: &Record, column: &str, kind: &str, row: usize) -> Result<String> {
    let value = record.get(column).ok_or_else(|| {
        ArtMatchError::input(format!("{kind} row {} has no '{column}' column", row + 1))
    })?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ArtMatchError::input(format!(
            "{kind} row {} has an empty '{column}'",
            row + 1
        )));
    }
    Ok(value.to_string())
}
