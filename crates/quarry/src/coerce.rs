//! Write-time value coercion against column metadata.

use crate::catalog::{ColumnInfo, ColumnType};
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::value::{DATE_FORMAT, DATETIME_FORMAT, TIME_FORMAT, Value};
use chrono::DateTime;
use serde::Deserialize;

/// What to do with NULL written to a NOT NULL column that the database does
/// not fill in itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullPolicy {
    /// Substitute the type's zero value (`0`, `""`, zero date, ...).
    #[default]
    Lenient,
    /// Fail with [`OrmError::NotNullConstraint`].
    Strict,
}

/// Statement a value is being written by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
}

/// Integers written to temporal columns are Unix timestamps, rendered in UTC.
fn timestamp_to_text(secs: i64, column_type: ColumnType) -> Option<Value> {
    let format = match column_type {
        ColumnType::Date => DATE_FORMAT,
        ColumnType::DateTime | ColumnType::Timestamp => DATETIME_FORMAT,
        ColumnType::Time => TIME_FORMAT,
        ColumnType::Year => "%Y",
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0).map(|dt| Value::Text(dt.format(format).to_string()))
}

/// Zero value stored in place of NULL for a NOT NULL column.
pub fn zero_value(column: &ColumnInfo, dialect: Dialect) -> Value {
    match column.column_type {
        ColumnType::Integer => Value::Int(0),
        ColumnType::Decimal | ColumnType::Float => Value::Float(0.0),
        ColumnType::Boolean => Value::Bool(false),
        ColumnType::Date => Value::Text(dialect.zero_date().to_string()),
        ColumnType::DateTime | ColumnType::Timestamp => {
            Value::Text(dialect.zero_datetime().to_string())
        }
        ColumnType::Time => Value::Text("00:00:00".to_string()),
        ColumnType::Year => Value::Text("0000".to_string()),
        ColumnType::Json => Value::Json(serde_json::Value::Null),
        ColumnType::Blob => Value::Bytes(Vec::new()),
        ColumnType::Uuid => Value::Uuid(uuid::Uuid::nil()),
        ColumnType::Text | ColumnType::Enum | ColumnType::Set | ColumnType::Other => {
            Value::Text(String::new())
        }
    }
}

/// Coerce one written value. `Ok(None)` means the column is left out of the
/// INSERT so the database assigns it; only auto-generated and on-update
/// timestamp columns are left out. An explicit NULL for a column with a plain
/// DEFAULT is written as NULL, or as the NOT NULL fallback.
pub fn coerce_value(
    value: Value,
    table: &str,
    column: &ColumnInfo,
    kind: WriteKind,
    dialect: Dialect,
    policy: NullPolicy,
) -> OrmResult<Option<Value>> {
    match value {
        Value::Int(secs) if column.column_type.is_temporal() => {
            Ok(Some(timestamp_to_text(secs, column.column_type).unwrap_or(Value::Int(secs))))
        }
        Value::Null => {
            if kind == WriteKind::Insert && (column.auto_generated || column.on_update_timestamp) {
                return Ok(None);
            }
            if column.nullable || column.auto_generated || column.on_update_timestamp {
                return Ok(Some(Value::Null));
            }
            match policy {
                NullPolicy::Strict => Err(OrmError::NotNullConstraint {
                    table: table.to_string(),
                    column: column.name.clone(),
                }),
                NullPolicy::Lenient => Ok(Some(zero_value(column, dialect))),
            }
        }
        other => Ok(Some(other)),
    }
}
