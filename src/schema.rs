//! Target table definition and the SQL built from it.
//!
//! The column set is fixed: one natural key (`WBS_ELEMENT_CDE`) plus 22 typed
//! attributes. Cost-center and fund-center codes are declared `REAL` even
//! though they are identifiers; existing deployments depend on that typing.
//!
//! Table names are interpolated into statements, so they go through
//! [`TableName::parse`] first. Values are always bound as positional `?`
//! parameters.

use std::{fmt, str::FromStr};

use itertools::Itertools;

use crate::error::WbsError;

pub const KEY_COLUMN: &str = "WBS_ELEMENT_CDE";
pub const DEFAULT_TABLE: &str = "wbs_2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
    /// Single-character `Y`/`N` flag, or null.
    Indicator,
    /// Date-time or time-of-day, stored as text.
    DateTime,
}

impl ColumnKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text | ColumnKind::Indicator | ColumnKind::DateTime => "TEXT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> ColumnDef {
    ColumnDef { name, kind }
}

pub const COLUMNS: [ColumnDef; 23] = [
    col(KEY_COLUMN, ColumnKind::Text),
    col("WBS_ELEMENT_NME", ColumnKind::Text),
    col("PROJ_ID", ColumnKind::Text),
    col("PROJ_NAME", ColumnKind::Text),
    col("PROJ_TYPE_CDE", ColumnKind::Text),
    col("PROJ_FY", ColumnKind::Integer),
    col("REQ_COST_CENTER_CDE", ColumnKind::Real),
    col("RESP_COST_CENTER_CDE", ColumnKind::Real),
    col("COMPANY_CDE", ColumnKind::Text),
    col("CNTRY_CODE", ColumnKind::Text),
    col("FUND_CENTER_CDE", ColumnKind::Real),
    col("RGN_ABBR_NME", ColumnKind::Text),
    col("SECTOR_CDE", ColumnKind::Text),
    col("BUS_AREA_CDE", ColumnKind::Text),
    col("BUS_AREA_NME", ColumnKind::Text),
    col("BUS_PROC_CDE", ColumnKind::Text),
    col("BUS_PROC_NME", ColumnKind::Text),
    col("ACCT_IND", ColumnKind::Indicator),
    col("CLOSED_IND", ColumnKind::Indicator),
    col("RELEASED_IND", ColumnKind::Indicator),
    col("SAP_STATUS", ColumnKind::Text),
    col("CREATE_DATE", ColumnKind::DateTime),
    col("LAST_UPDATE_DATE", ColumnKind::DateTime),
];

pub const KEY_INDEX: usize = 0;

/// Most positional parameters the store accepts in one statement.
pub const MAX_BOUND_PARAMS: usize = 100;

/// Rows per multi-row insert that stay within [`MAX_BOUND_PARAMS`].
pub const MAX_ROWS_PER_INSERT: usize = MAX_BOUND_PARAMS / COLUMNS.len();

const _: () = assert!(MAX_ROWS_PER_INSERT > 0 && COLUMNS.len() < MAX_BOUND_PARAMS);

pub fn column_index(name: &str) -> Option<usize> {
    COLUMNS.iter().position(|c| c.name == name)
}

pub fn column_names() -> impl Iterator<Item = &'static str> {
    COLUMNS.iter().map(|c| c.name)
}

/// A table identifier that is safe to splice into SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn parse(value: &str) -> Result<Self, WbsError> {
        let trimmed = value.trim();
        let mut chars = trimmed.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(WbsError::InvalidIdentifier(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self(DEFAULT_TABLE.to_string())
    }
}

impl FromStr for TableName {
    type Err = WbsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves a user-supplied column name against the declared schema.
pub fn declared_column(name: &str) -> Result<&'static ColumnDef, WbsError> {
    COLUMNS
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| WbsError::InvalidIdentifier(name.to_string()))
}

pub fn create_table_sql(table: &TableName) -> String {
    let columns = COLUMNS
        .iter()
        .map(|c| {
            if c.name == KEY_COLUMN {
                format!("    {} TEXT PRIMARY KEY", c.name)
            } else {
                format!("    {} {}", c.name, c.kind.sql_type())
            }
        })
        .join(",\n");
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n{columns},\n    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,\n    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP\n)"
    )
}

pub fn drop_table_sql(table: &TableName) -> String {
    format!("DROP TABLE IF EXISTS {table}")
}

fn placeholder_group() -> String {
    format!("({})", std::iter::repeat_n("?", COLUMNS.len()).join(", "))
}

/// Multi-row insert that leaves rows with an existing key untouched.
pub fn insert_or_ignore_sql(table: &TableName, rows: usize) -> String {
    let values = std::iter::repeat_n(placeholder_group(), rows.max(1)).join(", ");
    format!(
        "INSERT OR IGNORE INTO {table} ({}) VALUES {values}",
        column_names().join(", ")
    )
}

/// Single-row insert guarded by a key lookup; binds all columns then the key again.
pub fn insert_if_absent_sql(table: &TableName) -> String {
    let placeholders = std::iter::repeat_n("?", COLUMNS.len()).join(", ");
    format!(
        "INSERT INTO {table} ({}) SELECT {placeholders} WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE {KEY_COLUMN} = ?)",
        column_names().join(", ")
    )
}
