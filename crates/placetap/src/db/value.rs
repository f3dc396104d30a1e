//! Typed scalar bindings and result rows.
//!
//! Statement values are always bound as parameters, never interpolated into
//! SQL text. Timestamps are stored as fixed-width RFC 3339 strings in UTC so
//! lexical order matches chronological order.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

use super::DatabaseError;

/// A typed scalar statement parameter or result value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

/// Formats a timestamp the way it is persisted.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Bool(b) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(i64::from(*b))),
            Value::Timestamp(ts) => {
                ToSqlOutput::Owned(rusqlite::types::Value::Text(format_timestamp(ts)))
            }
        })
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One result row with named columns.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Reads the current row of a rusqlite cursor.
    pub(crate) fn from_sqlite(
        columns: &Arc<[String]>,
        row: &rusqlite::Row<'_>,
    ) -> Result<Self, DatabaseError> {
        let mut values = Vec::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            let value = match row.get_ref(idx)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(i) => Value::Integer(i),
                ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
                ValueRef::Real(r) => {
                    return Err(DatabaseError::Column {
                        column: name.clone(),
                        reason: format!("unexpected REAL value {}", r),
                    })
                }
                ValueRef::Blob(_) => {
                    return Err(DatabaseError::Column {
                        column: name.clone(),
                        reason: "unexpected BLOB value".to_string(),
                    })
                }
            };
            values.push(value);
        }
        Ok(Self::new(Arc::clone(columns), values))
    }

    fn value(&self, column: &str) -> Result<&Value, DatabaseError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
            .ok_or_else(|| DatabaseError::Column {
                column: column.to_string(),
                reason: "not present in result".to_string(),
            })
    }

    fn type_error(column: &str, expected: &str, found: &Value) -> DatabaseError {
        DatabaseError::Column {
            column: column.to_string(),
            reason: format!("expected {}, found {:?}", expected, found),
        }
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>, DatabaseError> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            other => Err(Self::type_error(column, "text", other)),
        }
    }

    pub fn text(&self, column: &str) -> Result<String, DatabaseError> {
        self.opt_text(column)?
            .ok_or_else(|| Self::type_error(column, "text", &Value::Null))
    }

    pub fn opt_int(&self, column: &str) -> Result<Option<i64>, DatabaseError> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Integer(i) => Ok(Some(*i)),
            other => Err(Self::type_error(column, "integer", other)),
        }
    }

    pub fn int(&self, column: &str) -> Result<i64, DatabaseError> {
        self.opt_int(column)?
            .ok_or_else(|| Self::type_error(column, "integer", &Value::Null))
    }

    pub fn bool(&self, column: &str) -> Result<bool, DatabaseError> {
        Ok(self.int(column)? != 0)
    }

    pub fn opt_timestamp(&self, column: &str) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        match self.opt_text(column)? {
            None => Ok(None),
            Some(s) => DateTime::parse_from_rfc3339(&s)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(|e| DatabaseError::Column {
                    column: column.to_string(),
                    reason: format!("invalid timestamp '{}': {}", s, e),
                }),
        }
    }

    pub fn timestamp(&self, column: &str) -> Result<DateTime<Utc>, DatabaseError> {
        self.opt_timestamp(column)?
            .ok_or_else(|| Self::type_error(column, "timestamp", &Value::Null))
    }
}
