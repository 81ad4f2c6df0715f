//! # quarry
//!
//! A fluent SQL query builder that resolves columns across joined tables,
//! keeps placeholder names collision-free, introspects and caches table
//! metadata, and hydrates flat result rows into nested records.
//!
//! ## Features
//!
//! - **Fluent builder**: `find`, `select`, `insert`, `update`, `delete`,
//!   `count`, `max`/`min`/`sum`, joins, grouped WHERE fragments, ordering and
//!   paging on one reusable [`Query`]
//! - **Schema aware**: column types, keys and defaults come from a
//!   [`SchemaCatalog`] introspected on first use
//! - **Nested hydration**: `{table}_{column}` aliases are split back into one
//!   [`AnonymousRecord`] per joined table
//! - **Typed records**: `#[derive(Record)]` generates field-by-field mapping
//!   plus `save`/`delete`/`reload` and parent/child navigation
//! - **Two dialects**: MySQL and PostgreSQL quoting, LIMIT and placeholders;
//!   `tokio-postgres` (and `deadpool-postgres` with the `pool` feature) drivers
//!   included
//!
//! ```ignore
//! use quarry::prelude::*;
//!
//! let db = Db::new(quarry::connect(&url).await?);
//!
//! db.query("users").insert([("name", "Ana")]).exec().await?;
//!
//! let mut q = db.query("users");
//! let rows = q
//!     .select()
//!     .left_join("orders")
//!     .where_(cond! { "users.id" => 5 })
//!     .or_where(Condition::raw("users.name LIKE :name").bind("name", "A%"))
//!     .exec()
//!     .await?
//!     .into_rows()?;
//! ```

extern crate self as quarry;

pub mod catalog;
pub mod coerce;
pub mod condition;
pub mod config;
pub mod connection;
pub mod db;
pub mod dialect;
pub mod error;
pub mod expr;
pub mod hydrate;
pub mod output;
pub mod params;
pub mod prelude;
pub mod query;
pub mod record;
pub mod registry;
pub mod scope;
pub mod value;

pub use catalog::{ColumnInfo, ColumnType, KeyRole, SchemaCatalog, TableSchema};
pub use coerce::{NullPolicy, WriteKind, coerce_value, zero_value};
pub use condition::{Condition, LogicalOp, build_condition};
pub use config::{ConnectionConfig, QuarryConfig};
pub use connection::{Connection, ResultRow, connect, connect_with};
pub use db::{Databases, Db, DbOptions};
pub use dialect::Dialect;
pub use error::{OrmError, OrmResult};
pub use expr::{Operand, SqlExpr};
pub use hydrate::{AnonymousRecord, Field, JoinEdge, hydrate};
pub use output::QueryOutput;
pub use params::{ParamMap, PlaceholderAllocator, placeholder_names};
pub use query::{
    CompiledStatement, Direction, Fetch, IntoColumns, Join, JoinKind, Query, QueryKind,
};
pub use record::{Record, RecordState, TableMapped, hydrate_nested, hydrate_typed};
pub use registry::RecordRegistration;
pub use scope::{Scope, render_column, resolve_scope, rewrite_scoped_columns};
pub use value::{FromValue, ToValue, Value};

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{DEFAULT_POOL_SIZE, create_pool, pool_from_config};

#[cfg(feature = "derive")]
pub use quarry_derive::Record;

// Re-export inventory for use by derive macros
pub use inventory;
