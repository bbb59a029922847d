use std::{num::NonZeroUsize, path::PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::{io_utils::parse_delimiter, schema::TableName};

#[derive(Debug, Parser)]
#[command(author, version, about = "Load WBS spreadsheets into a hosted D1 database", long_about = None)]
pub struct Cli {
    /// Target table name
    #[arg(long, global = true, default_value = "wbs_2", value_parser = parse_table)]
    pub table: TableName,
    /// Per-request timeout in seconds
    #[arg(long = "timeout-secs", global = true, default_value_t = 45)]
    pub timeout_secs: u64,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the target table if it does not exist
    Init(InitArgs),
    /// Read a spreadsheet, normalize it and load the records in batches
    Load(LoadArgs),
    /// Report row count, sample rows and a grouped count for the target table
    Verify(VerifyArgs),
    /// List loaded records page by page
    List(ListArgs),
    /// Search records by code or name
    Search(SearchArgs),
    /// Show one record by its WBS code
    Show(ShowArgs),
    /// Show total count and the most common code prefixes
    Stats(StatsArgs),
    /// Normalize a spreadsheet locally and show what would be loaded
    Preview(PreviewArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Drop the table before creating it
    #[arg(long)]
    pub recreate: bool,
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Input spreadsheet (.xlsx, .xls, .ods, .csv or .tsv)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Worksheet to read (defaults to the first one)
    #[arg(long)]
    pub sheet: Option<String>,
    /// Read at most this many data rows
    #[arg(long)]
    pub limit: Option<usize>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of delimited input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Records per bulk statement
    #[arg(long = "batch-size", default_value = "25")]
    pub batch_size: NonZeroUsize,
    /// Delete existing rows before loading
    #[arg(long)]
    pub clear: bool,
    /// Skip the verification report after loading
    #[arg(long = "no-verify")]
    pub no_verify: bool,
    /// Print load statistics as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Column to group counts by
    #[arg(long = "group-by", default_value = "COMPANY_CDE")]
    pub group_by: String,
    /// Number of sample rows to show
    #[arg(long, default_value_t = 3)]
    pub sample: usize,
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct PageArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: usize,
    /// Records per page
    #[arg(long = "per-page", default_value_t = 15)]
    pub per_page: usize,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub paging: PageArgs,
    /// Print every record instead of one page
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Text to match against the code and name
    pub term: String,
    #[command(flatten)]
    pub paging: PageArgs,
    /// Print up to 10 suggestions as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Exact WBS element code
    pub code: String,
    /// Print the record as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Print statistics as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Number of normalized records to display
    #[arg(long, default_value_t = 5)]
    pub rows: usize,
    /// Show non-null, null and distinct counts per column
    #[arg(long = "column-stats")]
    pub column_stats: bool,
}

fn parse_table(value: &str) -> Result<TableName, String> {
    TableName::parse(value).map_err(|err| err.to_string())
}
