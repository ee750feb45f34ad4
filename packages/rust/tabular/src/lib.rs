//! Delimited-record I/O for artmatch.
//!
//! Input tables (candidates, items) are read into [`Table`]s of
//! [`Record`]s; output tables (enriched items, recommendations) are built
//! from pipeline results and written back as CSV.
//!
//! # Output contracts
//!
//! - **Enriched items**: the item table's columns in their original order,
//!   then one column per relevant attribute holding the selected values
//!   joined by `", "`. An attribute that shares a name with an existing
//!   column overwrites it in place.
//! - **Recommendations**: `item id, candidate id, score`, grouped by item
//!   in input order, best score first, score with exactly 3 decimals.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, info};

use artmatch_shared::{ArtMatchError, ColumnsConfig, EnrichedItem, Recommendation, Record, Result};

/// Decimal places of formatted scores.
pub const SCORE_PRECISION: usize = 3;

/// A header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Record>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Format a score with fixed precision (`0.8` becomes `"0.800"`).
pub fn format_score(score: f64) -> String {
    format!("{:.*}", SCORE_PRECISION, score)
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read a CSV file with a header row.
pub fn read_table(path: &Path) -> Result<Table> {
    let file = File::open(path).map_err(|e| ArtMatchError::io(path, e))?;
    let table = read_from(file)?;
    info!(path = %path.display(), rows = table.len(), columns = table.headers.len(), "read table");
    Ok(table)
}

/// Read CSV from any reader. A missing header row is a fatal input error.
pub fn read_from<R: Read>(reader: R) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ArtMatchError::Table(format!("failed to read header row: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(String::is_empty) {
        return Err(ArtMatchError::input("table has no header row"));
    }

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let row = result
            .map_err(|e| ArtMatchError::Table(format!("row {}: {e}", idx + 1)))?;
        rows.push(Record::from_pairs(
            headers.iter().cloned().zip(row.iter().map(str::to_string)),
        ));
    }

    Ok(Table { headers, rows })
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write a table to a CSV file, creating parent directories as needed.
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ArtMatchError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| ArtMatchError::io(path, e))?;
    write_to(BufWriter::new(file), table)?;
    info!(path = %path.display(), rows = table.len(), "wrote table");
    Ok(())
}

/// Write CSV to any writer. The header row is always written, even with zero rows.
pub fn write_to<W: Write>(writer: W, table: &Table) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    csv_writer
        .write_record(&table.headers)
        .map_err(|e| ArtMatchError::Table(format!("CSV write error: {e}")))?;

    for row in &table.rows {
        csv_writer
            .write_record(table.headers.iter().map(|h| row.value(h)))
            .map_err(|e| ArtMatchError::Table(format!("CSV write error: {e}")))?;
    }

    csv_writer
        .flush()
        .map_err(|e| ArtMatchError::Table(format!("CSV flush error: {e}")))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Output tables
// ---------------------------------------------------------------------------

/// Build the enriched-item table from the item table's headers and the attributes.
pub fn enriched_table(
    item_headers: &[String],
    attributes: &[String],
    items: &[EnrichedItem],
) -> Table {
    let mut headers = item_headers.to_vec();
    for attr in attributes {
        if !headers.contains(attr) {
            headers.push(attr.clone());
        }
    }
    debug!(columns = headers.len(), rows = items.len(), "building enriched table");

    Table {
        headers,
        rows: items.iter().map(|item| item.record.clone()).collect(),
    }
}

/// Flatten recommendations into `item id, candidate id, score` rows.
pub fn recommendation_table(columns: &ColumnsConfig, recommendations: &[Recommendation]) -> Table {
    let headers = vec![
        columns.item_id.clone(),
        columns.candidate_id.clone(),
        columns.recommendation_score.clone(),
    ];

    let rows = recommendations
        .iter()
        .flat_map(|rec| rec.matches.iter())
        .map(|pair| {
            Record::from_pairs([
                (columns.item_id.as_str(), pair.item_id.clone()),
                (columns.candidate_id.as_str(), pair.candidate_id.clone()),
                (columns.recommendation_score.as_str(), format_score(pair.score)),
            ])
        })
        .collect();

    Table { headers, rows }
}
