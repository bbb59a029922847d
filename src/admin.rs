use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    client::QueryExecutor,
    data::Param,
    error::WbsError,
    schema::{self, TableName},
};

/// One row of `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
    pub primary_key: bool,
}

/// Creates the table if needed. An "already exists" answer counts as success.
pub fn create_table<E: QueryExecutor>(executor: &E, table: &TableName) -> Result<(), WbsError> {
    match executor.query(&schema::create_table_sql(table), &[]) {
        Ok(_) => {
            info!("Table {table} is ready");
            Ok(())
        }
        Err(err) if err.is_already_exists() => {
            debug!("Table {table} already exists");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

pub fn drop_table<E: QueryExecutor>(executor: &E, table: &TableName) -> Result<(), WbsError> {
    executor.query(&schema::drop_table_sql(table), &[])?;
    info!("Dropped table {table}");
    Ok(())
}

pub fn recreate_table<E: QueryExecutor>(executor: &E, table: &TableName) -> Result<(), WbsError> {
    drop_table(executor, table)?;
    create_table(executor, table)
}

/// Deletes every row. Failures are logged and swallowed; returns whether the delete succeeded.
pub fn clear_table<E: QueryExecutor>(executor: &E, table: &TableName) -> bool {
    match executor.query(&format!("DELETE FROM {table}"), &[]) {
        Ok(envelope) => {
            info!("Cleared {} row(s) from {table}", envelope.changes());
            true
        }
        Err(err) => {
            warn!("Could not clear table {table}: {err}");
            false
        }
    }
}

pub fn table_exists<E: QueryExecutor>(executor: &E, table: &TableName) -> Result<bool, WbsError> {
    let envelope = executor.query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
        &[Param::from(table.as_str())],
    )?;
    Ok(!envelope.rows().is_empty())
}

pub fn table_columns<E: QueryExecutor>(
    executor: &E,
    table: &TableName,
) -> Result<Vec<ColumnInfo>, WbsError> {
    let envelope = executor.query(&format!("PRAGMA table_info('{table}')"), &[])?;
    Ok(envelope
        .rows()
        .iter()
        .filter_map(|row| {
            let name = row.get("name")?.as_str()?.to_string();
            let sql_type = row
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let primary_key = row
                .get("pk")
                .and_then(|v| v.as_i64())
                .is_some_and(|pk| pk > 0);
            Some(ColumnInfo {
                name,
                sql_type,
                primary_key,
            })
        })
        .collect())
}
