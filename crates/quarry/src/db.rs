//! Named connections with their schema catalogs.

use crate::catalog::{SchemaCatalog, TableSchema};
use crate::coerce::NullPolicy;
use crate::connection::Connection;
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::hydrate::{AnonymousRecord, hydrate};
use crate::output::QueryOutput;
use crate::query::{CompiledStatement, Fetch, Query, QueryKind};
use crate::record::TableMapped;
use crate::registry;
use crate::value::FromValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-connection behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DbOptions {
    pub null_policy: NullPolicy,
}

/// One database connection, its identifier and its schema catalog.
///
/// ```ignore
/// let client = quarry::connect(&url).await?;
/// let db = Db::new(client).with_id("main");
/// let n = db.query("users").count().exec().await?.into_count()?;
/// ```
#[derive(Debug)]
pub struct Db<C> {
    id: String,
    conn: C,
    catalog: Arc<SchemaCatalog>,
    options: DbOptions,
}

impl<C: Connection> Db<C> {
    /// Wrap `conn` as connection `"default"` with a fresh catalog.
    pub fn new(conn: C) -> Self {
        Self {
            id: "default".to_string(),
            conn,
            catalog: Arc::new(SchemaCatalog::default()),
            options: DbOptions::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Share an existing catalog, e.g. between a pooled client and a
    /// transaction on the same database.
    pub fn with_catalog(mut self, catalog: Arc<SchemaCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_options(mut self, options: DbOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_null_policy(mut self, policy: NullPolicy) -> Self {
        self.options.null_policy = policy;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn conn(&self) -> &C {
        &self.conn
    }

    pub fn schema_catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    pub fn dialect(&self) -> Dialect {
        self.conn.dialect()
    }

    pub fn null_policy(&self) -> NullPolicy {
        self.options.null_policy
    }

    /// Start a statement against `table`.
    pub fn query(&self, table: impl Into<String>) -> Query<'_, C> {
        Query::new(self, table)
    }

    /// Start a statement against the table of `R`.
    pub fn query_for<R: TableMapped>(&self) -> Query<'_, C> {
        Query::new(self, R::TABLE)
    }

    pub async fn table_schema(&self, table: &str) -> OrmResult<Arc<TableSchema>> {
        self.catalog.table_schema(&self.conn, table).await
    }

    /// Introspect every table of the record types registered for this
    /// connection's id.
    pub async fn preload_registered(&self) -> OrmResult<usize> {
        let tables = registry::tables_for_connection(&self.id);
        self.catalog.preload(&self.conn, &tables).await?;
        tracing::debug!(
            target: "quarry.catalog",
            connection = %self.id,
            tables = tables.len(),
            "preloaded registered tables"
        );
        Ok(tables.len())
    }

    /// Execute a compiled statement and shape its result.
    pub async fn run(&self, compiled: CompiledStatement) -> OrmResult<QueryOutput> {
        let (sql, values) = compiled.to_positional(self.dialect())?;
        tracing::debug!(
            target: "quarry.sql",
            connection = %self.id,
            kind = ?compiled.kind,
            param_count = values.len(),
            sql = %sql,
            "executing statement"
        );

        match compiled.kind {
            QueryKind::Insert | QueryKind::Update | QueryKind::Delete => {
                let affected = self.conn.execute(&sql, &values).await?;
                Ok(QueryOutput::Affected(affected))
            }
            QueryKind::Count => {
                let rows = self.conn.query(&sql, &values).await?;
                let count = match rows.first().and_then(|row| row.iter().next()) {
                    Some((column, value)) => i64::from_value(value)
                        .map_err(|message| OrmError::decode(column, message))?,
                    None => 0,
                };
                Ok(QueryOutput::Count(count))
            }
            QueryKind::Aggregate => {
                let rows = self.conn.query(&sql, &values).await?;
                let mut record = AnonymousRecord::new();
                if let Some(row) = rows.into_iter().next() {
                    for (column, value) in row {
                        record.set_value(column, value);
                    }
                }
                Ok(QueryOutput::Aggregate(record))
            }
            QueryKind::Select => {
                let rows = self.conn.query(&sql, &values).await?;
                let mut records = rows.into_iter().map(|row| {
                    hydrate(row, &compiled.root, &compiled.joins, &compiled.tables)
                });
                Ok(match compiled.fetch {
                    Fetch::One => QueryOutput::Row(records.next()),
                    Fetch::Many => QueryOutput::Rows(records.collect()),
                })
            }
        }
    }
}

/// Registry of named connections.
#[derive(Debug)]
pub struct Databases<C> {
    connections: HashMap<String, Db<C>>,
}

impl<C> Default for Databases<C> {
    fn default() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }
}

impl<C: Connection> Databases<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `db` under its id, replacing any previous connection.
    pub fn insert(&mut self, db: Db<C>) {
        self.connections.insert(db.id().to_string(), db);
    }

    pub fn get(&self, id: &str) -> OrmResult<&Db<C>> {
        self.connections
            .get(id)
            .ok_or_else(|| OrmError::Connection(format!("connection '{id}' is not defined")))
    }

    /// Connection the record type `R` is bound to.
    pub fn for_record<R: TableMapped>(&self) -> OrmResult<&Db<C>> {
        self.get(R::CONNECTION)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
