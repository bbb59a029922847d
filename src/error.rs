//! Typed failures raised while talking to the remote store or validating input.
//!
//! Command handlers wrap these in `anyhow` with context; the library keeps the
//! variants distinct so the batch loader can decide when to fall back.

use itertools::Itertools;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WbsError {
    /// Required settings were absent at startup.
    #[error("Missing environment variables: {}", .missing.join(", "))]
    Configuration { missing: Vec<String> },

    /// Network failure, timeout, or an unreadable response body.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The store answered with a non-2xx HTTP status.
    #[error("HTTP {status}: {body}")]
    Remote { status: u16, body: String },

    /// The store accepted the request but reported the statement as failed.
    #[error("Query failed: {}", describe_errors(.errors))]
    Query { errors: Vec<Value> },

    /// Source data lacks columns the target schema declares.
    #[error("Missing columns in source data: {}", .missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),
}

impl WbsError {
    /// True when the failure only says the object being created is already there.
    pub fn is_already_exists(&self) -> bool {
        match self {
            WbsError::Query { .. } | WbsError::Remote { .. } => {
                self.to_string().to_ascii_lowercase().contains("already exists")
            }
            _ => false,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, WbsError::Transport(_))
    }
}

fn describe_errors(errors: &[Value]) -> String {
    if errors.is_empty() {
        return "no error detail returned".to_string();
    }
    errors
        .iter()
        .map(|err| match err.get("message").and_then(Value::as_str) {
            Some(message) => match err.get("code") {
                Some(code) => format!("{message} (code {code})"),
                None => message.to_string(),
            },
            None => err.to_string(),
        })
        .join("; ")
}
