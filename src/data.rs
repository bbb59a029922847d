use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A cell as handed over by the spreadsheet reader, before any column rules apply.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
}

impl RawCell {
    pub fn is_empty(&self) -> bool {
        matches!(self, RawCell::Empty)
    }

    /// Text rendering used when a cell lands in a text-typed column.
    pub fn as_display(&self) -> Option<String> {
        match self {
            RawCell::Empty => None,
            RawCell::String(s) => Some(s.clone()),
            RawCell::Int(i) => Some(i.to_string()),
            RawCell::Float(f) => Some(format_float(*f)),
            RawCell::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            RawCell::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            RawCell::Time(t) => Some(t.format("%H:%M:%S").to_string()),
        }
    }
}

impl From<&str> for RawCell {
    fn from(value: &str) -> Self {
        RawCell::String(value.to_string())
    }
}

impl From<NaiveDate> for RawCell {
    fn from(value: NaiveDate) -> Self {
        RawCell::DateTime(value.and_time(NaiveTime::MIN))
    }
}

/// A coerced value that conforms to its declared column type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Integer(i64),
    Real(f64),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Real(f) => format_float(*f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Positional statement parameter, serialized as a bare JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Param {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
}

impl From<Option<&Value>> for Param {
    fn from(value: Option<&Value>) -> Self {
        match value {
            None => Param::Null,
            Some(Value::Text(s)) => Param::Text(s.clone()),
            Some(Value::Integer(i)) => Param::Integer(*i),
            Some(Value::Real(f)) => Param::Real(*f),
        }
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Integer(value)
    }
}

pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}
