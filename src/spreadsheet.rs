//! Reads source rows from workbooks (`calamine`) or delimited text (`csv`).
//!
//! The first row is always the header row. Cells are mapped to [`RawCell`]
//! without applying any column rules; placeholder tokens such as `#N/A` are
//! read as empty so every downstream step sees one representation of
//! "missing".

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Reader, open_workbook_auto};
use chrono::{NaiveDateTime, NaiveTime};
use encoding_rs::Encoding;
use log::{debug, info};

use crate::{data::RawCell, io_utils};

/// Tokens read as empty regardless of the target column.
pub const PLACEHOLDER_TOKENS: &[&str] = &["N/A", "NULL", "null", "None", "none", "#N/A", "#NULL!"];

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

impl SourceTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub sheet: Option<String>,
    pub limit: Option<usize>,
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            sheet: None,
            limit: None,
            delimiter: None,
            encoding: encoding_rs::UTF_8,
        }
    }
}

pub fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| WORKBOOK_EXTENSIONS.iter().any(|w| ext.eq_ignore_ascii_case(w)))
}

pub fn read_table(path: &Path, options: &ReadOptions) -> Result<SourceTable> {
    if !io_utils::is_dash(path) && !path.exists() {
        return Err(anyhow!("Input file not found: {}", path.display()));
    }
    let table = if is_workbook(path) {
        read_workbook(path, options)?
    } else {
        read_delimited(path, options)?
    };
    info!(
        "Read {} row(s) and {} column(s) from {:?}",
        table.row_count(),
        table.headers.len(),
        path
    );
    Ok(table)
}

fn read_workbook(path: &Path, options: &ReadOptions) -> Result<SourceTable> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("Opening workbook {path:?}"))?;
    let sheet = match &options.sheet {
        Some(name) => name.clone(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("Workbook {path:?} contains no worksheets"))?,
    };
    debug!("Reading worksheet '{sheet}' from {path:?}");
    let range = workbook
        .worksheet_range(&sheet)
        .with_context(|| format!("Reading worksheet '{sheet}' from {path:?}"))?;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_row) => {
            normalize_headers(header_row.iter().map(|cell| cell_to_raw(cell).as_display()))
        }
        None => return Ok(SourceTable::default()),
    };

    let width = headers.len();
    let body = rows
        .take(options.limit.unwrap_or(usize::MAX))
        .map(|row| {
            let mut cells = row.iter().take(width).map(cell_to_raw).collect::<Vec<_>>();
            cells.resize(width, RawCell::Empty);
            cells
        })
        .collect();
    Ok(SourceTable { headers, rows: body })
}

fn read_delimited(path: &Path, options: &ReadOptions) -> Result<SourceTable> {
    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = normalize_headers(
        io_utils::reader_headers(&mut reader, options.encoding)
            .with_context(|| format!("Reading headers from {path:?}"))?
            .into_iter()
            .map(Some),
    );
    let width = headers.len();

    let mut rows = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        if options.limit.is_some_and(|limit| row_idx >= limit) {
            break;
        }
        let record = record.with_context(|| format!("Reading row {} in {:?}", row_idx + 2, path))?;
        let decoded = io_utils::decode_record(&record, options.encoding)
            .with_context(|| format!("Decoding row {} in {:?}", row_idx + 2, path))?;
        let mut cells = decoded
            .into_iter()
            .take(width)
            .map(|field| text_to_raw(&field))
            .collect::<Vec<_>>();
        cells.resize(width, RawCell::Empty);
        rows.push(cells);
    }
    Ok(SourceTable { headers, rows })
}

fn normalize_headers<I>(headers: I) -> Vec<String>
where
    I: Iterator<Item = Option<String>>,
{
    headers
        .enumerate()
        .map(|(idx, name)| match name.map(|n| n.trim().to_string()) {
            Some(name) if !name.is_empty() => name,
            _ => format!("Unnamed: {idx}"),
        })
        .collect()
}

fn text_to_raw(value: &str) -> RawCell {
    let trimmed = value.trim();
    if trimmed.is_empty() || PLACEHOLDER_TOKENS.contains(&trimmed) {
        RawCell::Empty
    } else {
        RawCell::String(value.to_string())
    }
}

fn cell_to_raw(cell: &Data) -> RawCell {
    match cell {
        Data::Empty | Data::Error(_) => RawCell::Empty,
        Data::String(s) => text_to_raw(s),
        Data::Int(i) => RawCell::Int(*i),
        Data::Float(f) => RawCell::Float(*f),
        Data::Bool(b) => RawCell::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) if dt.is_duration() || dt.as_f64() < 1.0 => RawCell::Time(value.time()),
            Some(value) => RawCell::DateTime(value),
            None => RawCell::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) => parse_iso_cell(s),
        Data::DurationIso(s) => text_to_raw(s),
    }
}

fn parse_iso_cell(value: &str) -> RawCell {
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return RawCell::DateTime(parsed);
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return RawCell::from(date);
    }
    if let Ok(time) = NaiveTime::parse_from_str(value, "%H:%M:%S%.f") {
        return RawCell::Time(time);
    }
    text_to_raw(value)
}
