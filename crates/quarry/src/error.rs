//! Error types for quarry

use thiserror::Error;

/// Result type alias for quarry operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Boxed driver error carried by [`OrmError::QueryExecution`].
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for query building, schema introspection and execution
#[derive(Debug, Error)]
pub enum OrmError {
    /// Table or column metadata could not be obtained
    #[error("Schema error on table '{table}': {message}")]
    Schema { table: String, message: String },

    /// Malformed join target
    #[error("Bad join spec: {0}")]
    BadJoinSpec(String),

    /// `exec()` (or `get_sql()`) was called before any verb method
    #[error("Query kind not defined: call a verb (find, insert, update, delete, count, ...) first")]
    UndefinedQueryKind,

    /// The driver failed to execute a statement
    #[error("Failed to execute query `{sql}`: {source}")]
    QueryExecution {
        sql: String,
        #[source]
        source: DriverError,
    },

    /// NULL written to a NOT NULL column while strict null handling is enabled
    #[error("Column '{table}.{column}' is NOT NULL and has no default")]
    NotNullConstraint { table: String, column: String },

    /// A record is missing the foreign key field needed to reach its parent
    #[error("Record '{record}' has no field for column '{column}'")]
    MissingProperty { record: String, column: String },

    /// `set_parent` was called with a record that was never stored
    #[error("Parent record '{0}' has not been saved")]
    NewParent(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// A result accessor was used on the wrong kind of output
    #[error("Unexpected query output: expected {expected}, got {actual}")]
    UnexpectedOutput {
        expected: &'static str,
        actual: &'static str,
    },

    /// Invalid identifiers or builder arguments
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration could not be loaded or parsed
    #[error("Config error: {0}")]
    Config(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),
}

impl OrmError {
    /// Create a schema error for a table
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wrap a driver error together with the SQL that triggered it
    pub fn execution(
        sql: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::QueryExecution {
            sql: sql.into(),
            source: Box::new(source),
        }
    }

    /// The underlying driver error, if this is a [`OrmError::QueryExecution`]
    pub fn driver_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::QueryExecution { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// The SQLSTATE code of a wrapped PostgreSQL error, if any
    pub fn sqlstate(&self) -> Option<&str> {
        self.driver_error()?
            .downcast_ref::<tokio_postgres::Error>()?
            .as_db_error()
            .map(|db| db.code().code())
    }

    /// Check if this is a unique violation reported by PostgreSQL
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate() == Some("23505")
    }

    /// Check if this is a schema error
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
