//! HTTP client for the hosted SQL-over-HTTP query endpoint.
//!
//! Every call is one independent POST: no pooling across processes, no
//! session state, and no retries. Callers decide what to do with a failure;
//! the batch loader, for example, demotes a failed bulk statement to
//! per-record inserts.

use std::time::Duration;

use log::debug;
use reqwest::{StatusCode, blocking::Client};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{config::D1Config, data::Param, error::WbsError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);

/// One result row keyed by column name.
pub type Row = Map<String, JsonValue>;

/// Anything that can execute a parameterized statement against the store.
pub trait QueryExecutor {
    fn query(&self, sql: &str, params: &[Param]) -> Result<QueryEnvelope, WbsError>;
}

impl<T: QueryExecutor + ?Sized> QueryExecutor for &T {
    fn query(&self, sql: &str, params: &[Param]) -> Result<QueryEnvelope, WbsError> {
        (**self).query(sql, params)
    }
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    sql: &'a str,
    #[serde(skip_serializing_if = "no_params")]
    params: &'a [Param],
}

fn no_params(params: &&[Param]) -> bool {
    params.is_empty()
}

/// Response body returned by the store, kept as received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub result: Vec<StatementResult>,
    #[serde(default)]
    pub errors: Vec<JsonValue>,
    #[serde(default)]
    pub messages: Vec<JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub results: Vec<Row>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub meta: Option<StatementMeta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementMeta {
    #[serde(default)]
    pub changes: u64,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub rows_read: Option<u64>,
    #[serde(default)]
    pub rows_written: Option<u64>,
}

impl QueryEnvelope {
    /// Rows of the first statement, or an empty slice when none were returned.
    pub fn rows(&self) -> &[Row] {
        self.result
            .first()
            .map(|r| r.results.as_slice())
            .unwrap_or_default()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.result
            .into_iter()
            .next()
            .map(|r| r.results)
            .unwrap_or_default()
    }

    /// Rows changed by the first statement.
    pub fn changes(&self) -> u64 {
        self.result
            .first()
            .and_then(|r| r.meta.as_ref())
            .map(|m| m.changes)
            .unwrap_or(0)
    }

    /// Integer stored under `column` in the first row, e.g. a `COUNT(*)` alias.
    pub fn scalar_i64(&self, column: &str) -> Option<i64> {
        self.rows()
            .first()
            .and_then(|row| row.get(column))
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
    }
}

#[derive(Debug, Clone)]
pub struct D1Client {
    http: Client,
    endpoint: String,
    api_token: String,
}

impl D1Client {
    pub fn new(config: &D1Config, timeout: Duration) -> Result<Self, WbsError> {
        Self::with_endpoint(config.endpoint(), config.api_token.clone(), timeout)
    }

    pub fn with_endpoint(
        endpoint: impl Into<String>,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, WbsError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| WbsError::Transport(format!("building HTTP client: {err}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_token: api_token.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl QueryExecutor for D1Client {
    fn query(&self, sql: &str, params: &[Param]) -> Result<QueryEnvelope, WbsError> {
        debug!("Executing statement with {} param(s): {}", params.len(), sql.trim());
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&QueryRequest { sql, params })
            .send()
            .map_err(|err| WbsError::Transport(transport_message(&err)))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|err| WbsError::Transport(transport_message(&err)))?;
        decode_response(status, &body)
    }
}

fn transport_message(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

/// Maps an HTTP status and body onto the envelope or a typed failure.
pub fn decode_response(status: StatusCode, body: &str) -> Result<QueryEnvelope, WbsError> {
    if status.is_client_error() || status.is_server_error() {
        return Err(WbsError::Remote {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }
    let envelope: QueryEnvelope = serde_json::from_str(body)
        .map_err(|err| WbsError::Transport(format!("invalid response body: {err}")))?;
    if !envelope.success {
        return Err(WbsError::Query {
            errors: envelope.errors,
        });
    }
    Ok(envelope)
}
