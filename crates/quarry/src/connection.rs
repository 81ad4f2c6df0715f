//! Driver boundary.
//!
//! [`Connection`] is the only trait the builder talks to. Statements arrive
//! with positional placeholders already in the driver's style and rows come
//! back as ordered `(column, Value)` lists.

mod postgres;

pub use postgres::{connect, connect_with};

use crate::dialect::Dialect;
use crate::error::OrmResult;
use crate::value::Value;
use std::sync::Arc;

/// One result row: ordered column names with their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    cells: Vec<(String, Value)>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            cells: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.cells.push((column.into(), value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl IntoIterator for ResultRow {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_iter()
    }
}

/// A database connection able to run positional-parameter statements.
pub trait Connection: Send + Sync {
    /// SQL flavor spoken by this connection.
    fn dialect(&self) -> Dialect;

    /// Run a statement and return all rows.
    fn query(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl std::future::Future<Output = OrmResult<Vec<ResultRow>>> + Send;

    /// Run a statement and return the number of affected rows.
    fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl std::future::Future<Output = OrmResult<u64>> + Send;
}

impl<C: Connection> Connection for &C {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn query(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl std::future::Future<Output = OrmResult<Vec<ResultRow>>> + Send {
        (**self).query(sql, params)
    }

    fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl std::future::Future<Output = OrmResult<u64>> + Send {
        (**self).execute(sql, params)
    }
}

impl<C: Connection> Connection for Arc<C> {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn query(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl std::future::Future<Output = OrmResult<Vec<ResultRow>>> + Send {
        (**self).query(sql, params)
    }

    fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl std::future::Future<Output = OrmResult<u64>> + Send {
        (**self).execute(sql, params)
    }
}
