use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use crate::{
    admin::{self, ColumnInfo},
    cli::VerifyArgs,
    client::{QueryExecutor, Row},
    error::WbsError,
    schema::{self, TableName},
    table,
};

pub const DEFAULT_GROUP_BY: &str = "COMPANY_CDE";
pub const DEFAULT_SAMPLE_SIZE: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct GroupCount {
    pub value: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub table: String,
    pub total_records: i64,
    pub sample: Vec<Row>,
    pub group_by: String,
    pub distribution: Vec<GroupCount>,
    pub columns: Vec<ColumnInfo>,
}

pub fn execute(args: &VerifyArgs, table: &TableName, executor: &impl QueryExecutor) -> Result<()> {
    let report = verify(executor, table, &args.group_by, args.sample)
        .with_context(|| format!("Verifying table {table}"))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Reads back the total count, a few sample rows and per-value counts of `group_by`.
pub fn verify<E: QueryExecutor>(
    executor: &E,
    table: &TableName,
    group_by: &str,
    sample: usize,
) -> Result<VerificationReport, WbsError> {
    let group_column = schema::declared_column(group_by)?.name;

    let total_records = executor
        .query(&format!("SELECT COUNT(*) AS total FROM {table}"), &[])?
        .scalar_i64("total")
        .unwrap_or(0);

    let sample = executor
        .query(&format!("SELECT * FROM {table} LIMIT {sample}"), &[])?
        .into_rows();

    let distribution = executor
        .query(
            &format!(
                "SELECT {group_column} AS value, COUNT(*) AS count FROM {table} \
                 WHERE {group_column} IS NOT NULL GROUP BY {group_column} ORDER BY count DESC"
            ),
            &[],
        )?
        .into_rows()
        .iter()
        .map(|row| GroupCount {
            value: row.get("value").map(table::json_cell).unwrap_or_default(),
            count: row.get("count").and_then(|v| v.as_i64()).unwrap_or(0),
        })
        .collect::<Vec<_>>();

    let columns = admin::table_columns(executor, table)?;

    info!(
        "Verification complete: {total_records} record(s) in {table}, {} distinct {group_column} value(s)",
        distribution.len()
    );
    Ok(VerificationReport {
        table: table.to_string(),
        total_records,
        sample,
        group_by: group_column.to_string(),
        distribution,
        columns,
    })
}

pub fn print_report(report: &VerificationReport) {
    println!("Total records in {}: {}", report.table, report.total_records);

    if !report.sample.is_empty() {
        println!("\nSample records:");
        print!(
            "{}",
            table::render_rows(&["WBS_ELEMENT_CDE", "WBS_ELEMENT_NME", "COMPANY_CDE"], &report.sample)
        );
    }

    println!("\nDistribution by {}:", report.group_by);
    let rows = report
        .distribution
        .iter()
        .map(|g| vec![g.value.clone(), g.count.to_string()])
        .collect::<Vec<_>>();
    table::print_table(&[report.group_by.clone(), "count".to_string()], &rows);

    println!("\nColumns ({}):", report.columns.len());
    let rows = report
        .columns
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.sql_type.clone(),
                if c.primary_key { "PK".to_string() } else { String::new() },
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&["name".to_string(), "type".to_string(), "key".to_string()], &rows);
}
