//! Row values returned by backends and consumed by formulas.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::definition::{FieldType, Schema};

/// A result row keyed by column name.
pub type Row = BTreeMap<String, Value>;

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Long(i64),
    Double(f64),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

/// A vendor value that could not be read as its schema type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Column '{column}' value '{value}' cannot be read as {expected}")]
pub struct CoercionError {
    pub column: String,
    pub value: String,
    pub expected: &'static str,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Interpret a vendor value according to its schema type.
    ///
    /// Strings holding dates are parsed; anything already of the right
    /// shape passes through.
    pub fn coerce(self, field_type: FieldType, column: &str) -> Result<Value, CoercionError> {
        let fail = |value: &Value| CoercionError {
            column: column.to_string(),
            value: value.to_string(),
            expected: field_type.as_str(),
        };

        match (field_type, self) {
            (_, Value::Null) => Ok(Value::Null),
            (FieldType::Date, Value::String(s)) => parse_date(&s)
                .map(Value::Date)
                .or_else(|| parse_date_time(&s).map(|dt| Value::Date(dt.date())))
                .ok_or_else(|| fail(&Value::String(s))),
            (FieldType::DateTime | FieldType::Timestamp, Value::String(s)) => parse_date_time(&s)
                .map(Value::DateTime)
                .or_else(|| {
                    parse_date(&s).and_then(|d| d.and_hms_opt(0, 0, 0).map(Value::DateTime))
                })
                .ok_or_else(|| fail(&Value::String(s))),
            (FieldType::Long, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Long)
                .map_err(|_| fail(&Value::String(s))),
            (FieldType::Double, Value::Long(n)) => Ok(Value::Double(n as f64)),
            (FieldType::Boolean, Value::Long(n)) => Ok(Value::Boolean(n != 0)),
            (_, value) => Ok(value),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Long(n) => write!(f, "{}", n),
            Value::Double(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Long(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn parse_date_time(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Build a row from column names and positional vendor values.
pub fn row_from_columns(columns: &[String], values: Vec<serde_json::Value>) -> Row {
    columns
        .iter()
        .cloned()
        .zip(values.into_iter().map(Value::from))
        .collect()
}

/// Coerce every column that the schema declares.
///
/// Columns unknown to the schema keep their vendor value.
pub fn coerce_row(row: Row, schema: &Schema) -> Result<Row, CoercionError> {
    row.into_iter()
        .map(|(column, value)| match schema.field(&column) {
            Some(field) => {
                let value = value.coerce(field.field_type, &column)?;
                Ok((column, value))
            }
            None => Ok((column, value)),
        })
        .collect()
}
