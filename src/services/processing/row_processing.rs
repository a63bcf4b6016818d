//! Row normalization for measurement spreadsheets
//!
//! Each data row becomes a `NormalizedRow`. How malformed cells are handled is
//! decided by the `ParsePolicy`: `Lenient` substitutes the current time for a
//! bad timestamp and zero for a bad voltage or current, `Strict` rejects the
//! row and with it the whole file.

use anyhow::{Result, anyhow};
use calamine::Data;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    structure::{SheetColumn, SheetStructure},
    utils::{extract_integer, extract_number, parse_timestamp_cell},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ParsePolicy {
    #[default]
    Lenient,
    Strict,
}

/// A measurement row ready for insertion. Power is derived at write time.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub sequence_number: i32,
    pub timestamp: DateTime<Utc>,
    pub voltage: f64,
    pub current: f64,
    pub resistance: Option<f64>,
    pub temperature: Option<f64>,
}

fn measurement(
    row: &[Data],
    structure: &SheetStructure,
    column: SheetColumn,
    policy: ParsePolicy,
) -> Result<f64, String> {
    match structure.cell(row, column).and_then(extract_number) {
        Some(value) => Ok(value),
        None if policy == ParsePolicy::Lenient => Ok(0.0),
        None => Err(format!("missing or non-numeric {}", column.header())),
    }
}

fn optional_measurement(row: &[Data], structure: &SheetStructure, column: SheetColumn) -> Option<f64> {
    structure.cell(row, column).and_then(extract_number)
}

/// Normalize one data row. `position` is the 1-based index among the file's data rows,
/// `zone` the offset for timestamps written without one.
pub fn normalize_row(
    row: &[Data],
    structure: &SheetStructure,
    position: usize,
    policy: ParsePolicy,
    zone: FixedOffset,
    now: DateTime<Utc>,
) -> Result<NormalizedRow, String> {
    // A zero or absent sequence falls back to the row position
    let sequence_number = structure
        .cell(row, SheetColumn::Sequence)
        .and_then(extract_integer)
        .filter(|&seq| seq != 0)
        .unwrap_or_else(|| i32::try_from(position).unwrap_or(i32::MAX));

    let timestamp = match structure
        .cell(row, SheetColumn::Timestamp)
        .and_then(|cell| parse_timestamp_cell(cell, zone))
    {
        Some(timestamp) => timestamp,
        None if policy == ParsePolicy::Lenient => now,
        None => return Err(format!("invalid {}", SheetColumn::Timestamp.header())),
    };

    Ok(NormalizedRow {
        sequence_number,
        timestamp,
        voltage: measurement(row, structure, SheetColumn::Voltage, policy)?,
        current: measurement(row, structure, SheetColumn::Current, policy)?,
        resistance: optional_measurement(row, structure, SheetColumn::Resistance),
        temperature: optional_measurement(row, structure, SheetColumn::Temperature),
    })
}

/// Normalize every data row of a file.
///
/// Under `Strict` any rejected row fails the file, naming the first offender.
pub fn normalize_rows(
    rows: &[&[Data]],
    structure: &SheetStructure,
    policy: ParsePolicy,
    zone: FixedOffset,
) -> Result<Vec<NormalizedRow>> {
    let now = Utc::now();
    let mut normalized = Vec::with_capacity(rows.len());
    let mut rejected = 0usize;
    let mut first_issue = None;

    for (idx, row) in rows.iter().enumerate() {
        match normalize_row(row, structure, idx + 1, policy, zone, now) {
            Ok(record) => normalized.push(record),
            Err(issue) => {
                rejected += 1;
                first_issue.get_or_insert_with(|| format!("row {}: {issue}", idx + 1));
            }
        }
    }

    match first_issue {
        Some(first) => Err(anyhow!("{rejected} rows rejected (first: {first})")),
        None => Ok(normalized),
    }
}

/// Split rows into consecutive batches of at most `batch_size`, preserving order
pub fn partition_batches<T>(rows: Vec<T>, batch_size: usize) -> Vec<Vec<T>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(rows.len().div_ceil(batch_size));
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
        batches.push(rows.by_ref().take(batch_size).collect());
    }
    batches
}
