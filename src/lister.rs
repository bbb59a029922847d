//! Read-only access for browsing loaded records.
//!
//! A [`WbsLister`] is built once per process and passed to whatever needs
//! it. Listing and counting go through an [`ExpiringCache`], so repeated page
//! requests within the TTL cost a single remote call. Search and exact lookup
//! always hit the store.

use std::time::Duration;

use log::debug;
use serde::Serialize;

use crate::{
    cache::{DEFAULT_TTL, ExpiringCache},
    client::{QueryExecutor, Row},
    data::Param,
    error::WbsError,
    schema::{KEY_COLUMN, TableName},
    table::json_cell,
};

pub const MAX_SUGGESTIONS: usize = 10;
pub const MIN_SUGGESTION_TERM: usize = 2;
pub const TOP_PREFIXES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub code: String,
    pub description: String,
    pub created: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixCount {
    pub prefix: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_count: i64,
    pub top_prefixes: Vec<PrefixCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageView {
    pub items: Vec<Row>,
    pub total_count: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    pub search_term: Option<String>,
}

impl PageView {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

pub struct WbsLister<E> {
    executor: E,
    table: TableName,
    rows_cache: ExpiringCache<String, Vec<Row>>,
    count_cache: ExpiringCache<String, i64>,
}

impl<E: QueryExecutor> WbsLister<E> {
    pub fn new(executor: E, table: TableName) -> Self {
        Self::with_ttl(executor, table, DEFAULT_TTL)
    }

    pub fn with_ttl(executor: E, table: TableName, ttl: Duration) -> Self {
        Self {
            executor,
            table,
            rows_cache: ExpiringCache::new(ttl),
            count_cache: ExpiringCache::new(ttl),
        }
    }

    /// Records with a key, ordered by key. `None` returns every row.
    pub fn list(&mut self, limit: Option<usize>, offset: usize) -> Result<Vec<Row>, WbsError> {
        let mut sql = format!(
            "SELECT * FROM {} WHERE {KEY_COLUMN} IS NOT NULL ORDER BY {KEY_COLUMN}",
            self.table
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
        }
        let executor = &self.executor;
        self.rows_cache.get_or_compute(sql.clone(), || {
            debug!("Listing rows (cache miss)");
            executor.query(&sql, &[]).map(|envelope| envelope.into_rows())
        })
    }

    pub fn count(&mut self) -> Result<i64, WbsError> {
        let sql = format!(
            "SELECT COUNT(*) AS total FROM {} WHERE {KEY_COLUMN} IS NOT NULL",
            self.table
        );
        let executor = &self.executor;
        self.count_cache.get_or_compute(sql.clone(), || {
            debug!("Counting rows (cache miss)");
            executor
                .query(&sql, &[])
                .map(|envelope| envelope.scalar_i64("total").unwrap_or(0))
        })
    }

    /// Substring match on the code and name columns.
    pub fn search(&self, term: &str) -> Result<Vec<Row>, WbsError> {
        let pattern = like_pattern(term.trim());
        let sql = format!(
            "SELECT * FROM {} WHERE {KEY_COLUMN} LIKE ? ESCAPE '\\' \
             OR WBS_ELEMENT_NME LIKE ? ESCAPE '\\' ORDER BY {KEY_COLUMN}",
            self.table
        );
        let rows = self
            .executor
            .query(&sql, &[Param::from(pattern.as_str()), Param::from(pattern)])?
            .into_rows();
        debug!("Search for '{term}' matched {} row(s)", rows.len());
        Ok(rows)
    }

    /// Short suggestion list for type-ahead lookups.
    pub fn suggest(&self, term: &str) -> Result<Vec<Suggestion>, WbsError> {
        if term.trim().chars().count() < MIN_SUGGESTION_TERM {
            return Ok(Vec::new());
        }
        Ok(self
            .search(term)?
            .iter()
            .take(MAX_SUGGESTIONS)
            .map(|row| {
                let field = |name: &str| row.get(name).map(json_cell).unwrap_or_default();
                Suggestion {
                    code: field(KEY_COLUMN),
                    description: field("WBS_ELEMENT_NME"),
                    created: field("CREATE_DATE"),
                }
            })
            .collect())
    }

    pub fn find(&self, code: &str) -> Result<Option<Row>, WbsError> {
        let sql = format!("SELECT * FROM {} WHERE {KEY_COLUMN} = ? LIMIT 1", self.table);
        Ok(self
            .executor
            .query(&sql, &[Param::from(code)])?
            .into_rows()
            .into_iter()
            .next())
    }

    pub fn stats(&mut self) -> Result<Stats, WbsError> {
        let total_count = self.count()?;
        let sql = format!(
            "SELECT SUBSTR({KEY_COLUMN}, 1, 2) AS prefix, COUNT(*) AS count FROM {} \
             WHERE {KEY_COLUMN} IS NOT NULL GROUP BY SUBSTR({KEY_COLUMN}, 1, 2) \
             ORDER BY count DESC LIMIT {TOP_PREFIXES}",
            self.table
        );
        let top_prefixes = self
            .executor
            .query(&sql, &[])?
            .rows()
            .iter()
            .map(|row| PrefixCount {
                prefix: row.get("prefix").map(json_cell).unwrap_or_default(),
                count: row.get("count").and_then(|v| v.as_i64()).unwrap_or(0),
            })
            .collect();
        Ok(Stats {
            total_count,
            top_prefixes,
        })
    }

    /// One page of either the full listing or the results for `term`.
    pub fn page(
        &mut self,
        page: usize,
        per_page: usize,
        term: Option<&str>,
    ) -> Result<PageView, WbsError> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let offset = (page - 1).saturating_mul(per_page);
        let term = term.map(str::trim).filter(|t| !t.is_empty());

        let (items, total_count) = match term {
            Some(term) => {
                let matches = self.search(term)?;
                let total = matches.len();
                let items = matches.into_iter().skip(offset).take(per_page).collect();
                (items, total)
            }
            None => {
                let total = usize::try_from(self.count()?).unwrap_or(0);
                // past the last page: nothing to fetch
                if offset >= total {
                    (Vec::new(), total)
                } else {
                    (self.list(Some(per_page), offset)?, total)
                }
            }
        };

        Ok(PageView {
            items,
            total_count,
            page,
            per_page,
            total_pages: total_count.div_ceil(per_page),
            search_term: term.map(str::to_string),
        })
    }

    pub fn invalidate(&mut self) {
        self.rows_cache.clear();
        self.count_cache.clear();
    }
}

/// `%term%` with `\`, `%` and `_` escaped so the term matches literally.
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
