//! Streaming access to comma-separated source files.
//!
//! Two passes over the file, both streaming:
//!
//! - [`count_rows`] counts data rows without materializing them, so the
//!   engine can report progress against a known total.
//! - [`CsvChunks`] re-reads the file in bounded windows of rows, normalizing
//!   the header row once (the normalizer is pure, so the per-window column
//!   list is identical for every window) and coercing each cell to a
//!   `string | number | null` scalar.
//!
//! Short records are padded with nulls and long records are truncated to the
//! header width; the `csv` reader runs in flexible mode so ragged files do
//! not abort ingestion.

use std::fs::File;
use std::path::Path;

use csv::ReaderBuilder;
use serde_json::{Map, Value};

use silo_core::RowDraft;

use crate::error::Result;
use crate::normalize::normalize_headers;

/// Counts data rows in a delimited file without materializing them.
///
/// The header row is not counted. Counting the same file twice yields the
/// same total.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or a record cannot be
/// parsed.
pub fn count_rows(path: &Path) -> Result<i64> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let mut total = 0_i64;
    let mut record = csv::ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        total += 1;
    }
    Ok(total)
}

/// Coerces one raw cell into a scalar value.
///
/// Empty (or whitespace-only) cells become null; integer and decimal text
/// becomes a JSON number; everything else is kept as a trimmed string.
#[must_use]
pub fn coerce_cell(cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }

    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }

    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }

    Value::String(trimmed.to_string())
}

/// Streams a delimited file as bounded windows of row drafts.
pub struct CsvChunks {
    reader: csv::Reader<File>,
    columns: Vec<String>,
    chunk_size: usize,
}

impl CsvChunks {
    /// Opens the file and normalizes its header row.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the header row
    /// cannot be parsed.
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let raw_headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(ToString::to_string)
            .collect();
        let columns = normalize_headers(&raw_headers);

        Ok(Self {
            reader,
            columns,
            chunk_size: chunk_size.max(1),
        })
    }

    /// The normalized column list, stable for the lifetime of this reader.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Reads the next window of up to `chunk_size` rows.
    ///
    /// Returns `None` once the file is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be parsed.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<RowDraft>>> {
        let mut drafts = Vec::new();
        let mut record = csv::StringRecord::new();

        while drafts.len() < self.chunk_size {
            if !self.reader.read_record(&mut record)? {
                break;
            }

            let mut data = Map::new();
            for (idx, column) in self.columns.iter().enumerate() {
                let cell = record.get(idx).unwrap_or("");
                data.insert(column.clone(), coerce_cell(cell));
            }
            drafts.push(RowDraft::new(data));
        }

        if drafts.is_empty() {
            Ok(None)
        } else {
            Ok(Some(drafts))
        }
    }
}
