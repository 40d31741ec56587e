//! Typed result sets and execution outcomes for generated SQL.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single cell as returned by the engine. Values keep their native type:
/// an integer `1` and a float `1.0` are different cells.
#[derive(Debug, Clone)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(BigDecimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(uuid::Uuid),
    /// Canonical serialized JSON text.
    Json(String),
}

impl SqlValue {
    fn rank(&self) -> u8 {
        match self {
            SqlValue::Null => 0,
            SqlValue::Bool(_) => 1,
            SqlValue::Int(_) => 2,
            SqlValue::Float(_) => 3,
            SqlValue::Decimal(_) => 4,
            SqlValue::Text(_) => 5,
            SqlValue::Bytes(_) => 6,
            SqlValue::Date(_) => 7,
            SqlValue::Time(_) => 8,
            SqlValue::Timestamp(_) => 9,
            SqlValue::TimestampTz(_) => 10,
            SqlValue::Uuid(_) => 11,
            SqlValue::Json(_) => 12,
        }
    }

    pub fn json(value: &serde_json::Value) -> Self {
        SqlValue::Json(value.to_string())
    }
}

impl Ord for SqlValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SqlValue::Null, SqlValue::Null) => Ordering::Equal,
            (SqlValue::Bool(a), SqlValue::Bool(b)) => a.cmp(b),
            (SqlValue::Int(a), SqlValue::Int(b)) => a.cmp(b),
            (SqlValue::Float(a), SqlValue::Float(b)) => a.total_cmp(b),
            (SqlValue::Decimal(a), SqlValue::Decimal(b)) => a.cmp(b),
            (SqlValue::Text(a), SqlValue::Text(b)) => a.cmp(b),
            (SqlValue::Bytes(a), SqlValue::Bytes(b)) => a.cmp(b),
            (SqlValue::Date(a), SqlValue::Date(b)) => a.cmp(b),
            (SqlValue::Time(a), SqlValue::Time(b)) => a.cmp(b),
            (SqlValue::Timestamp(a), SqlValue::Timestamp(b)) => a.cmp(b),
            (SqlValue::TimestampTz(a), SqlValue::TimestampTz(b)) => a.cmp(b),
            (SqlValue::Uuid(a), SqlValue::Uuid(b)) => a.cmp(b),
            (SqlValue::Json(a), SqlValue::Json(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for SqlValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SqlValue {}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{}", v),
            SqlValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            SqlValue::Date(v) => write!(f, "{}", v),
            SqlValue::Time(v) => write!(f, "{}", v),
            SqlValue::Timestamp(v) => write!(f, "{}", v),
            SqlValue::TimestampTz(v) => write!(f, "{}", v.to_rfc3339()),
            SqlValue::Uuid(v) => write!(f, "{}", v),
            SqlValue::Json(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(v) => serializer.serialize_bool(*v),
            SqlValue::Int(v) => serializer.serialize_i64(*v),
            SqlValue::Float(v) => serializer.serialize_f64(*v),
            SqlValue::Json(v) => match serde_json::from_str::<serde_json::Value>(v) {
                Ok(parsed) => parsed.serialize(serializer),
                Err(_) => serializer.serialize_str(v),
            },
            other => serializer.collect_str(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionErrorKind {
    Syntax,
    UndefinedObject,
    TypeMismatch,
    Timeout,
    ReadOnlyViolation,
    Decode,
    Database,
}

impl ExecutionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionErrorKind::Syntax => "SyntaxError",
            ExecutionErrorKind::UndefinedObject => "UndefinedObject",
            ExecutionErrorKind::TypeMismatch => "TypeMismatch",
            ExecutionErrorKind::Timeout => "Timeout",
            ExecutionErrorKind::ReadOnlyViolation => "ReadOnlyViolation",
            ExecutionErrorKind::Decode => "DecodeError",
            ExecutionErrorKind::Database => "DatabaseError",
        }
    }
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-reported failure. `message` is the engine's text, unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    /// SQLSTATE or engine error code when one is available.
    pub code: Option<String>,
    pub message: String,
}

impl ExecutionError {
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success(QueryResult),
    Failure(ExecutionError),
}

impl ExecutionOutcome {
    pub fn failure(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        ExecutionOutcome::Failure(ExecutionError::new(kind, message))
    }
}

/// One generated statement plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlCandidate {
    pub sql: String,
    pub attempt: u32,
    pub prompt: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_values_do_not_coerce_across_types() {
        assert_ne!(SqlValue::Int(1), SqlValue::Float(1.0));
        assert_ne!(SqlValue::Text("1".to_string()), SqlValue::Int(1));
        assert_eq!(SqlValue::Null, SqlValue::Null);
    }

    #[test]
    fn test_decimal_equality_ignores_scale() {
        let a = SqlValue::Decimal(BigDecimal::from_str("2.50").unwrap());
        let b = SqlValue::Decimal(BigDecimal::from_str("2.5").unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_rows_sort_with_nulls_first() {
        let mut rows = vec![
            vec![SqlValue::Text("b".to_string())],
            vec![SqlValue::Null],
            vec![SqlValue::Text("a".to_string())],
        ];
        rows.sort();
        assert_eq!(rows[0], vec![SqlValue::Null]);
        assert_eq!(rows[1], vec![SqlValue::Text("a".to_string())]);
    }

    #[test]
    fn test_float_nan_is_totally_ordered() {
        let mut values = vec![SqlValue::Float(f64::NAN), SqlValue::Float(1.0)];
        values.sort();
        assert_eq!(values[0], SqlValue::Float(1.0));
    }

    #[test]
    fn test_serialize_value() {
        let json = serde_json::to_string(&vec![
            SqlValue::Int(3),
            SqlValue::Null,
            SqlValue::Text("x".to_string()),
            SqlValue::Json("{\"a\":1}".to_string()),
        ])
        .unwrap();
        assert_eq!(json, "[3,null,\"x\",{\"a\":1}]");
    }

    #[test]
    fn test_error_display_carries_kind_and_message() {
        let err = ExecutionError::new(
            ExecutionErrorKind::UndefinedObject,
            "column \"agee\" does not exist",
        )
        .with_code("42703");
        assert_eq!(
            err.to_string(),
            "UndefinedObject: column \"agee\" does not exist"
        );
        assert_eq!(err.code.as_deref(), Some("42703"));
    }
}
