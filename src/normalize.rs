//! Turns raw spreadsheet rows into typed [`WbsRecord`]s.
//!
//! Coercion is driven by the declared [`ColumnKind`] of each target column,
//! never by inspecting the data. After coercion, rows are deduplicated on the
//! natural key (first occurrence wins, a missing key counts as one key value)
//! and rows with no values at all are dropped. Input order is preserved.

use std::collections::HashSet;

use log::{info, warn};
use serde::Serialize;

use crate::{
    data::{Param, RawCell, Value},
    error::WbsError,
    schema::{COLUMNS, ColumnKind, KEY_INDEX, column_index},
    spreadsheet::SourceTable,
};

/// Text values treated as null after trimming. Case-sensitive.
pub const NULL_TOKENS: &[&str] = &["", "nan", "None", "NULL"];

const TRUTHY: &[&str] = &["Y", "YES", "TRUE", "1"];
const FALSY: &[&str] = &["N", "NO", "FALSE", "0"];

/// One row shaped to the target schema; `values[i]` belongs to `COLUMNS[i]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WbsRecord {
    values: Vec<Option<Value>>,
}

impl Default for WbsRecord {
    fn default() -> Self {
        Self {
            values: vec![None; COLUMNS.len()],
        }
    }
}

impl WbsRecord {
    pub fn with_key(key: &str) -> Self {
        let mut record = Self::default();
        record.values[KEY_INDEX] = Some(Value::Text(key.to_string()));
        record
    }

    /// Sets a column by name; unknown names are rejected.
    pub fn set(&mut self, column: &str, value: Option<Value>) -> Result<(), WbsError> {
        let idx = column_index(column).ok_or_else(|| WbsError::InvalidIdentifier(column.into()))?;
        self.values[idx] = value;
        Ok(())
    }

    pub fn with(mut self, column: &str, value: Value) -> Result<Self, WbsError> {
        self.set(column, Some(value))?;
        Ok(self)
    }

    pub fn key(&self) -> Option<&str> {
        self.values[KEY_INDEX].as_ref().and_then(Value::as_text)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        column_index(column).and_then(|idx| self.values[idx].as_ref())
    }

    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// Statement parameters in declared column order.
    pub fn params(&self) -> impl Iterator<Item = Param> + '_ {
        self.values.iter().map(|v| Param::from(v.as_ref()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeSummary {
    pub rows_read: usize,
    pub duplicates_removed: usize,
    pub empty_rows_removed: usize,
    pub extra_columns: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub records: Vec<WbsRecord>,
    pub summary: NormalizeSummary,
}

impl Normalized {
    /// Rows discarded because their natural key was already seen.
    pub fn discarded(&self) -> usize {
        self.summary.duplicates_removed
    }
}

pub fn normalize(table: &SourceTable) -> Result<Normalized, WbsError> {
    let positions = COLUMNS
        .iter()
        .map(|c| table.column_index(c.name))
        .collect::<Vec<_>>();
    let missing = COLUMNS
        .iter()
        .zip(&positions)
        .filter(|(_, pos)| pos.is_none())
        .map(|(c, _)| c.name.to_string())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(WbsError::SchemaMismatch { missing });
    }

    let extra_columns = table
        .headers
        .iter()
        .filter(|h| column_index(h).is_none())
        .cloned()
        .collect::<Vec<_>>();
    if !extra_columns.is_empty() {
        warn!(
            "Extra columns found (will be ignored): {}",
            extra_columns.join(", ")
        );
    }

    let mut seen: HashSet<Option<String>> = HashSet::new();
    let mut summary = NormalizeSummary {
        rows_read: table.rows.len(),
        extra_columns,
        ..NormalizeSummary::default()
    };
    let mut records = Vec::with_capacity(table.rows.len());

    for row in &table.rows {
        let values = COLUMNS
            .iter()
            .zip(&positions)
            .map(|(column, pos)| {
                pos.and_then(|pos| row.get(pos))
                    .and_then(|cell| coerce(cell, column.kind))
            })
            .collect();
        let record = WbsRecord { values };
        if !seen.insert(record.key().map(str::to_string)) {
            summary.duplicates_removed += 1;
            continue;
        }
        if record.is_empty() {
            summary.empty_rows_removed += 1;
            continue;
        }
        records.push(record);
    }

    if summary.duplicates_removed > 0 {
        warn!(
            "Found {} duplicate WBS code(s); kept first occurrence",
            summary.duplicates_removed
        );
    }
    if summary.empty_rows_removed > 0 {
        warn!("Dropped {} row(s) with no values", summary.empty_rows_removed);
    }
    info!(
        "Normalized {} of {} row(s) ({} duplicate, {} empty)",
        records.len(),
        summary.rows_read,
        summary.duplicates_removed,
        summary.empty_rows_removed
    );
    Ok(Normalized { records, summary })
}

/// Applies the rule for one declared column kind to a raw cell.
pub fn coerce(cell: &RawCell, kind: ColumnKind) -> Option<Value> {
    match kind {
        ColumnKind::Text => clean_text(cell).map(Value::Text),
        ColumnKind::Integer => coerce_integer(cell).map(Value::Integer),
        ColumnKind::Real => coerce_real(cell).map(Value::Real),
        ColumnKind::Indicator => normalize_indicator(cell).map(|flag| Value::Text(flag.to_string())),
        ColumnKind::DateTime => format_datetime(cell).map(Value::Text),
    }
}

fn clean_text(cell: &RawCell) -> Option<String> {
    let text = cell.as_display()?;
    let trimmed = text.trim();
    (!NULL_TOKENS.contains(&trimmed)).then(|| trimmed.to_string())
}

fn coerce_integer(cell: &RawCell) -> Option<i64> {
    match cell {
        RawCell::Int(i) => Some(*i),
        RawCell::Float(f) => integral(*f),
        RawCell::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

fn integral(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64)
        .then_some(value as i64)
}

fn coerce_real(cell: &RawCell) -> Option<f64> {
    let value = match cell {
        RawCell::Int(i) => *i as f64,
        RawCell::Float(f) => *f,
        RawCell::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Canonical `Y`/`N` flag, or `None` for blanks and unrecognised values.
pub fn normalize_indicator(cell: &RawCell) -> Option<&'static str> {
    let text = cell.as_display()?;
    let upper = text.trim().to_ascii_uppercase();
    if TRUTHY.contains(&upper.as_str()) {
        Some("Y")
    } else if FALSY.contains(&upper.as_str()) {
        Some("N")
    } else {
        None
    }
}

fn format_datetime(cell: &RawCell) -> Option<String> {
    match cell {
        RawCell::Time(t) => Some(t.format("%H:%M:%S").to_string()),
        RawCell::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        other => clean_text(other),
    }
}
