use std::collections::HashSet;

use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::PreviewArgs,
    normalize::{self, NormalizeSummary, WbsRecord},
    schema::COLUMNS,
    source_options, spreadsheet, table,
};

const PREVIEW_COLUMNS: &[&str] = &[
    "WBS_ELEMENT_CDE",
    "WBS_ELEMENT_NME",
    "PROJ_ID",
    "COMPANY_CDE",
    "PROJ_FY",
    "CLOSED_IND",
    "CREATE_DATE",
];

pub fn execute(args: &PreviewArgs) -> Result<()> {
    let options = source_options(&args.source)?;
    let source = spreadsheet::read_table(&args.source.input, &options)?;
    let normalized = normalize::normalize(&source)
        .with_context(|| format!("Normalizing {:?}", args.source.input))?;

    let shown = &normalized.records[..args.rows.min(normalized.records.len())];
    let headers = PREVIEW_COLUMNS.iter().map(|c| c.to_string()).collect::<Vec<_>>();
    let rows = shown.iter().map(preview_row).collect::<Vec<_>>();
    table::print_table(&headers, &rows);

    print_summary(&normalized.summary, normalized.records.len());

    if args.column_stats {
        let mut profile = ColumnProfile::new();
        for record in &normalized.records {
            profile.ingest(record);
        }
        println!();
        table::print_table(
            &["column", "type", "non_null", "null", "distinct"].map(String::from),
            &profile.render_rows(),
        );
    }
    info!("Displayed {} record(s) from {:?}", shown.len(), args.source.input);
    Ok(())
}

fn preview_row(record: &WbsRecord) -> Vec<String> {
    PREVIEW_COLUMNS
        .iter()
        .map(|column| record.get(column).map(|v| v.as_display()).unwrap_or_default())
        .collect()
}

pub fn print_summary(summary: &NormalizeSummary, kept: usize) {
    println!(
        "\nRows read: {}  kept: {}  duplicates removed: {}  empty removed: {}",
        summary.rows_read, kept, summary.duplicates_removed, summary.empty_rows_removed
    );
    if !summary.extra_columns.is_empty() {
        println!("Ignored columns: {}", summary.extra_columns.join(", "));
    }
}

/// Per-column fill and cardinality over normalized records.
pub struct ColumnProfile {
    non_null: Vec<usize>,
    distinct: Vec<HashSet<String>>,
    total: usize,
}

impl Default for ColumnProfile {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnProfile {
    pub fn new() -> Self {
        Self {
            non_null: vec![0; COLUMNS.len()],
            distinct: vec![HashSet::new(); COLUMNS.len()],
            total: 0,
        }
    }

    pub fn ingest(&mut self, record: &WbsRecord) {
        self.total += 1;
        for (idx, value) in record.values().iter().enumerate() {
            if let Some(value) = value {
                self.non_null[idx] += 1;
                self.distinct[idx].insert(value.as_display());
            }
        }
    }

    pub fn render_rows(&self) -> Vec<Vec<String>> {
        COLUMNS
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                vec![
                    column.name.to_string(),
                    column.kind.sql_type().to_string(),
                    self.non_null[idx].to_string(),
                    (self.total - self.non_null[idx]).to_string(),
                    self.distinct[idx].len().to_string(),
                ]
            })
            .collect()
    }
}
