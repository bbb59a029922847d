#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Value as JsonValue, json};
use tempfile::{TempDir, tempdir};
use wbs_loader::{
    client::{QueryEnvelope, QueryExecutor, Row, StatementMeta, StatementResult},
    data::{Param, RawCell},
    error::WbsError,
    normalize::{self, WbsRecord},
    schema::{COLUMNS, KEY_INDEX, MAX_BOUND_PARAMS, column_names},
    spreadsheet::SourceTable,
};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

/// A fully populated source row for `code`, in declared column order.
pub fn sample_row(code: &str) -> Vec<String> {
    [
        code,
        format!("Site preparation {code}").as_str(),
        "P-1001",
        "North Plant Upgrade",
        "CAP",
        "2024",
        "7014",
        "7020",
        "1000",
        "US",
        "5501",
        "NA",
        "ENG",
        "BA10",
        "Operations",
        "BP1",
        "Maintenance",
        "Y",
        "N",
        "TRUE",
        "REL",
        "2023-11-05 14:03:09",
        "2024-01-10 08:00:00",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn header_line(delimiter: char) -> String {
    column_names().collect::<Vec<_>>().join(&delimiter.to_string())
}

pub fn csv_contents(rows: &[Vec<String>]) -> String {
    let mut out = header_line(',');
    out.push('\n');
    for row in rows {
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

pub fn source_table(rows: &[Vec<String>]) -> SourceTable {
    SourceTable {
        headers: column_names().map(str::to_string).collect(),
        rows: rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| {
                        if cell.trim().is_empty() {
                            RawCell::Empty
                        } else {
                            RawCell::from(cell.as_str())
                        }
                    })
                    .collect()
            })
            .collect(),
    }
}

/// Normalized records for the given codes, using [`sample_row`] values.
pub fn records(codes: &[&str]) -> Vec<WbsRecord> {
    let rows = codes.iter().map(|code| sample_row(code)).collect::<Vec<_>>();
    normalize::normalize(&source_table(&rows))
        .expect("sample rows normalize")
        .records
}

pub fn codes(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("C.{i:04}")).collect()
}

/// In-memory stand-in for the hosted store. It understands the statements the
/// crate issues and can be told to fail some of them.
#[derive(Default)]
pub struct MemoryStore {
    rows: RefCell<Vec<Vec<Param>>>,
    table_created: Cell<bool>,
    statements: RefCell<Vec<String>>,
    fail_bulk: Cell<bool>,
    failing_bulk_keys: RefCell<HashSet<String>>,
    failing_keys: RefCell<HashSet<String>>,
    widest_statement: Cell<usize>,
    fail_everything: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: &[WbsRecord]) -> Self {
        let store = Self::new();
        store.table_created.set(true);
        for record in records {
            store.rows.borrow_mut().push(record.params().collect());
        }
        store
    }

    /// Every multi-row `INSERT OR IGNORE` answers with HTTP 500.
    pub fn fail_bulk_inserts(&self) {
        self.fail_bulk.set(true);
    }

    /// Multi-row inserts that carry `key` answer with HTTP 500.
    pub fn fail_bulk_inserts_with(&self, key: &str) {
        self.failing_bulk_keys.borrow_mut().insert(key.to_string());
    }

    /// Largest number of parameters bound by any statement so far.
    pub fn widest_statement(&self) -> usize {
        self.widest_statement.get()
    }

    /// Conditional inserts for `key` answer with HTTP 500.
    pub fn fail_key(&self, key: &str) {
        self.failing_keys.borrow_mut().insert(key.to_string());
    }

    pub fn go_offline(&self) {
        self.fail_everything.set(true);
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.borrow().clone()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.borrow().len()
    }

    pub fn count_matching(&self, prefix: &str) -> usize {
        self.statements
            .borrow()
            .iter()
            .filter(|sql| sql.starts_with(prefix))
            .count()
    }

    pub fn row_count(&self) -> usize {
        self.rows.borrow().len()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys = self
            .rows
            .borrow()
            .iter()
            .filter_map(|row| text(&row[KEY_INDEX]))
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    pub fn row(&self, key: &str) -> Option<Row> {
        self.rows
            .borrow()
            .iter()
            .find(|row| text(&row[KEY_INDEX]).as_deref() == Some(key))
            .map(|row| to_row(row))
    }

    fn contains_key(&self, key: &Param) -> bool {
        match key {
            Param::Text(key) => self
                .rows
                .borrow()
                .iter()
                .any(|row| matches!(&row[KEY_INDEX], Param::Text(existing) if existing == key)),
            _ => false,
        }
    }

    fn sorted_rows(&self) -> Vec<Vec<Param>> {
        let mut rows = self
            .rows
            .borrow()
            .iter()
            .filter(|row| !matches!(row[KEY_INDEX], Param::Null))
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by_key(|row| text(&row[KEY_INDEX]));
        rows
    }

    fn insert_or_ignore(&self, params: &[Param]) -> Result<QueryEnvelope, WbsError> {
        if self.fail_bulk.get() {
            return Err(server_error());
        }
        assert_eq!(params.len() % COLUMNS.len(), 0, "bulk params per row");
        let failing = self.failing_bulk_keys.borrow();
        if params
            .chunks(COLUMNS.len())
            .any(|chunk| text(&chunk[KEY_INDEX]).is_some_and(|key| failing.contains(&key)))
        {
            return Err(server_error());
        }
        let mut changes = 0;
        for chunk in params.chunks(COLUMNS.len()) {
            if !self.contains_key(&chunk[KEY_INDEX]) {
                self.rows.borrow_mut().push(chunk.to_vec());
                changes += 1;
            }
        }
        Ok(changed(changes))
    }

    fn insert_if_absent(&self, params: &[Param]) -> Result<QueryEnvelope, WbsError> {
        assert_eq!(params.len(), COLUMNS.len() + 1, "conditional insert params");
        let key = &params[COLUMNS.len()];
        if let Some(key) = text(key)
            && self.failing_keys.borrow().contains(&key)
        {
            return Err(server_error());
        }
        if self.contains_key(key) {
            return Ok(changed(0));
        }
        self.rows.borrow_mut().push(params[..COLUMNS.len()].to_vec());
        Ok(changed(1))
    }

    fn select(&self, sql: &str, params: &[Param]) -> QueryEnvelope {
        if sql.contains("COUNT(*) AS total") {
            let total = if sql.contains("IS NOT NULL") {
                self.sorted_rows().len()
            } else {
                self.row_count()
            };
            return rows(vec![json!({ "total": total })]);
        }
        if sql.contains("SUBSTR(") {
            return rows(self.group_by(|row| {
                text(&row[KEY_INDEX]).map(|k| k.chars().take(2).collect())
            }, "prefix"));
        }
        if sql.contains("AS value, COUNT(*) AS count") {
            let column = sql
                .trim_start_matches("SELECT ")
                .split(" AS value")
                .next()
                .unwrap_or_default();
            let idx = COLUMNS.iter().position(|c| c.name == column).expect("group column");
            return rows(self.group_by(|row| display(&row[idx]), "value"));
        }
        if sql.contains("LIKE ?") {
            let escape = sql.contains("ESCAPE '\\'").then_some('\\');
            let pattern = like_tokens(&text(&params[0]).unwrap_or_default(), escape);
            let name_idx = COLUMNS.iter().position(|c| c.name == "WBS_ELEMENT_NME").unwrap();
            let matches = self
                .sorted_rows()
                .into_iter()
                .filter(|row| {
                    [&row[KEY_INDEX], &row[name_idx]].iter().any(|p| {
                        text(p).is_some_and(|t| {
                            like_matches(&pattern, &t.to_lowercase().chars().collect::<Vec<_>>())
                        })
                    })
                })
                .map(|row| JsonValue::Object(to_row(&row)))
                .collect();
            return rows(matches);
        }
        if sql.contains("WBS_ELEMENT_CDE = ?") {
            let found = self
                .sorted_rows()
                .into_iter()
                .filter(|row| row[KEY_INDEX] == params[0])
                .take(1)
                .map(|row| JsonValue::Object(to_row(&row)))
                .collect();
            return rows(found);
        }
        let (limit, offset) = limit_offset(sql);
        let source = if sql.contains("ORDER BY") {
            self.sorted_rows()
        } else {
            self.rows.borrow().clone()
        };
        rows(source
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| JsonValue::Object(to_row(&row)))
            .collect())
    }

    fn group_by<F>(&self, key: F, label: &str) -> Vec<JsonValue>
    where
        F: Fn(&[Param]) -> Option<String>,
    {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for row in self.sorted_rows() {
            if let Some(value) = key(row.as_slice()) {
                match counts.iter_mut().find(|(v, _)| *v == value) {
                    Some((_, count)) => *count += 1,
                    None => counts.push((value, 1)),
                }
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
            .into_iter()
            .map(|(value, count)| json!({ label: value, "count": count }))
            .collect()
    }
}

impl QueryExecutor for MemoryStore {
    fn query(&self, sql: &str, params: &[Param]) -> Result<QueryEnvelope, WbsError> {
        self.statements.borrow_mut().push(sql.to_string());
        self.widest_statement.set(self.widest_statement.get().max(params.len()));
        if self.fail_everything.get() {
            return Err(WbsError::Transport("connection refused".into()));
        }
        if params.len() > MAX_BOUND_PARAMS {
            return Err(WbsError::Query {
                errors: vec![json!({ "code": 7500, "message": "too many SQL variables: SQLITE_ERROR" })],
            });
        }
        if sql.starts_with("INSERT OR IGNORE") {
            return self.insert_or_ignore(params);
        }
        if sql.starts_with("INSERT INTO") {
            return self.insert_if_absent(params);
        }
        if sql.starts_with("CREATE TABLE") {
            self.table_created.set(true);
            return Ok(changed(0));
        }
        if sql.starts_with("DROP TABLE") {
            self.table_created.set(false);
            self.rows.borrow_mut().clear();
            return Ok(changed(0));
        }
        if sql.starts_with("DELETE FROM") {
            let removed = self.row_count();
            self.rows.borrow_mut().clear();
            return Ok(changed(removed as u64));
        }
        if sql.starts_with("PRAGMA table_info") {
            return Ok(rows(
                COLUMNS
                    .iter()
                    .enumerate()
                    .map(|(cid, c)| {
                        json!({ "cid": cid, "name": c.name, "type": c.kind.sql_type(), "pk": i64::from(cid == KEY_INDEX) })
                    })
                    .collect(),
            ));
        }
        if sql.contains("sqlite_master") {
            let found = if self.table_created.get() {
                vec![json!({ "name": text(&params[0]) })]
            } else {
                Vec::new()
            };
            return Ok(rows(found));
        }
        if sql.starts_with("SELECT") {
            return Ok(self.select(sql, params));
        }
        Err(WbsError::Query {
            errors: vec![json!({ "code": 7500, "message": format!("unsupported statement: {sql}") })],
        })
    }
}

fn server_error() -> WbsError {
    WbsError::Remote {
        status: 500,
        body: r#"{"success":false,"errors":[{"code":7500,"message":"Internal error"}]}"#.into(),
    }
}

fn changed(changes: u64) -> QueryEnvelope {
    QueryEnvelope {
        success: true,
        result: vec![StatementResult {
            results: Vec::new(),
            success: Some(true),
            meta: Some(StatementMeta {
                changes,
                ..StatementMeta::default()
            }),
        }],
        ..QueryEnvelope::default()
    }
}

fn rows(values: Vec<JsonValue>) -> QueryEnvelope {
    QueryEnvelope {
        success: true,
        result: vec![StatementResult {
            results: values
                .into_iter()
                .filter_map(|v| match v {
                    JsonValue::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            success: Some(true),
            meta: Some(StatementMeta::default()),
        }],
        ..QueryEnvelope::default()
    }
}

fn text(param: &Param) -> Option<String> {
    match param {
        Param::Text(s) => Some(s.clone()),
        _ => None,
    }
}

fn display(param: &Param) -> Option<String> {
    match param {
        Param::Null => None,
        Param::Text(s) => Some(s.clone()),
        Param::Integer(i) => Some(i.to_string()),
        Param::Real(f) => Some(f.to_string()),
        Param::Boolean(b) => Some(b.to_string()),
    }
}

fn to_row(row: &[Param]) -> Row {
    column_names()
        .zip(row)
        .map(|(name, param)| (name.to_string(), serde_json::to_value(param).expect("param json")))
        .collect()
}

fn limit_offset(sql: &str) -> (usize, usize) {
    let number_after = |marker: &str| {
        sql.split(marker)
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|n| n.parse::<usize>().ok())
    };
    (
        number_after(" LIMIT ").unwrap_or(usize::MAX),
        number_after(" OFFSET ").unwrap_or(0),
    )
}

#[derive(Debug, Clone, PartialEq)]
enum LikeToken {
    Any,
    One,
    Char(char),
}

/// Lowercased SQLite `LIKE` pattern with an optional escape character.
fn like_tokens(pattern: &str, escape: Option<char>) -> Vec<LikeToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        let token = match ch {
            c if Some(c) == escape => LikeToken::Char(chars.next().unwrap_or(c)),
            '%' => LikeToken::Any,
            '_' => LikeToken::One,
            c => LikeToken::Char(c),
        };
        tokens.push(match token {
            LikeToken::Char(c) => LikeToken::Char(c.to_ascii_lowercase()),
            other => other,
        });
    }
    tokens
}

fn like_matches(pattern: &[LikeToken], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((LikeToken::Any, rest)) => (0..=text.len()).any(|skip| like_matches(rest, &text[skip..])),
        Some((LikeToken::One, rest)) => !text.is_empty() && like_matches(rest, &text[1..]),
        Some((LikeToken::Char(c), rest)) => text.first() == Some(c) && like_matches(rest, &text[1..]),
    }
}
