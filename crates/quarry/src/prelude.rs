//! Convenient imports for typical `quarry` usage.
//!
//! ```ignore
//! use quarry::prelude::*;
//! ```

pub use crate::{
    AnonymousRecord, Condition, Connection, Db, Direction, Join, LogicalOp, OrmError, OrmResult,
    Query, QueryOutput, Record, RecordState, SqlExpr, TableMapped, Value, cond,
};

#[cfg(feature = "pool")]
pub use crate::{create_pool, pool_from_config};
