//! Shaped results of [`Query::exec`](crate::Query::exec).

use crate::error::{OrmError, OrmResult};
use crate::hydrate::AnonymousRecord;
use crate::record::{Record, hydrate_typed};
use crate::value::{FromValue, Value};

/// Result of executing one statement, shaped by its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// `find`/`select`: every matching row.
    Rows(Vec<AnonymousRecord>),
    /// `find_one`/`select_one`: the first row, if any.
    Row(Option<AnonymousRecord>),
    /// `count`.
    Count(i64),
    /// `max`/`min`/`sum`: one field per aggregated column.
    Aggregate(AnonymousRecord),
    /// `insert`/`update`/`delete`: affected rows.
    Affected(u64),
}

impl QueryOutput {
    fn kind(&self) -> &'static str {
        match self {
            QueryOutput::Rows(_) => "rows",
            QueryOutput::Row(_) => "row",
            QueryOutput::Count(_) => "count",
            QueryOutput::Aggregate(_) => "aggregate",
            QueryOutput::Affected(_) => "affected",
        }
    }

    fn unexpected(&self, expected: &'static str) -> OrmError {
        OrmError::UnexpectedOutput {
            expected,
            actual: self.kind(),
        }
    }

    /// All rows. A single-row result yields zero or one row.
    pub fn into_rows(self) -> OrmResult<Vec<AnonymousRecord>> {
        match self {
            QueryOutput::Rows(rows) => Ok(rows),
            QueryOutput::Row(row) => Ok(row.into_iter().collect()),
            other => Err(other.unexpected("rows")),
        }
    }

    pub fn into_row(self) -> OrmResult<Option<AnonymousRecord>> {
        match self {
            QueryOutput::Row(row) => Ok(row),
            QueryOutput::Rows(rows) => Ok(rows.into_iter().next()),
            other => Err(other.unexpected("row")),
        }
    }

    pub fn into_count(self) -> OrmResult<i64> {
        match self {
            QueryOutput::Count(n) => Ok(n),
            other => Err(other.unexpected("count")),
        }
    }

    pub fn into_affected(self) -> OrmResult<u64> {
        match self {
            QueryOutput::Affected(n) => Ok(n),
            other => Err(other.unexpected("affected")),
        }
    }

    pub fn into_aggregate(self) -> OrmResult<AnonymousRecord> {
        match self {
            QueryOutput::Aggregate(record) => Ok(record),
            other => Err(other.unexpected("aggregate")),
        }
    }

    /// The single aggregated value of a one-column `max`/`min`/`sum`, or the
    /// value of `count`.
    pub fn into_scalar<T: FromValue>(self) -> OrmResult<T> {
        match self {
            QueryOutput::Count(n) => T::from_value(&Value::Int(n))
                .map_err(|message| OrmError::decode("select_count", message)),
            QueryOutput::Aggregate(record) => {
                let mut values = record.values();
                match (values.next(), values.next()) {
                    (Some((name, value)), None) => {
                        T::from_value(value).map_err(|message| OrmError::decode(name, message))
                    }
                    _ => Err(OrmError::UnexpectedOutput {
                        expected: "single aggregate",
                        actual: "aggregate",
                    }),
                }
            }
            other => Err(other.unexpected("scalar")),
        }
    }

    /// Rows hydrated as persisted `R` records.
    pub fn into_records<R: Record>(self) -> OrmResult<Vec<R>> {
        self.into_rows()?.iter().map(hydrate_typed::<R>).collect()
    }

    pub fn into_record<R: Record>(self) -> OrmResult<Option<R>> {
        self.into_row()?.as_ref().map(hydrate_typed::<R>).transpose()
    }
}
