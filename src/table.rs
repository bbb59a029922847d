//! Plain-text table rendering for command output.

use std::{borrow::Cow, fmt::Write as _};

use serde_json::Value as JsonValue;

use crate::client::Row;

/// Cells wider than this are cut and suffixed with `...`.
pub const MAX_CELL_WIDTH: usize = 40;

const NULL_DISPLAY: &str = "";

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let cells = rows
        .iter()
        .map(|row| row.iter().map(|cell| fit_cell(cell)).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    let mut widths = headers.iter().map(|h| h.chars().count().max(3)).collect::<Vec<_>>();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers.iter().map(String::as_str), &widths));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(separator.iter().map(String::as_str), &widths));
    for row in &cells {
        let _ = writeln!(output, "{}", format_row(row.iter().map(|c| &**c), &widths));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

/// Renders result rows, one column per name in `columns`.
pub fn render_rows(columns: &[&str], rows: &[Row]) -> String {
    let headers = columns.iter().map(|c| c.to_string()).collect::<Vec<_>>();
    let body = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| row.get(*column).map(json_cell).unwrap_or_default())
                .collect()
        })
        .collect::<Vec<Vec<String>>>();
    render_table(&headers, &body)
}

/// Two-column `field | value` layout for a single record.
pub fn render_record(row: &Row) -> String {
    let width = row.keys().map(|k| k.chars().count()).max().unwrap_or(0);
    let mut output = String::new();
    for (key, value) in row {
        let _ = writeln!(output, "{key:<width$}  {}", sanitize_cell(&json_cell(value)));
    }
    output
}

pub fn json_cell(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => NULL_DISPLAY.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => crate::data::format_float(f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn format_row<'a, I>(values: I, widths: &[usize]) -> String
where
    I: Iterator<Item = &'a str>,
{
    let mut line = values
        .zip(widths)
        .map(|(value, &width)| format!("{value:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    line.truncate(line.trim_end().len());
    line
}

fn fit_cell(value: &str) -> Cow<'_, str> {
    let sanitized = sanitize_cell(value);
    if sanitized.chars().count() <= MAX_CELL_WIDTH {
        return sanitized;
    }
    let mut cut = sanitized.chars().take(MAX_CELL_WIDTH - 3).collect::<String>();
    cut.push_str("...");
    Cow::Owned(cut)
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
