//! Schema introspection and the per-connection metadata cache.
//!
//! Column metadata is read from the live database the first time a table is
//! used and cached for the lifetime of the [`SchemaCatalog`]. There is no
//! automatic eviction: after out-of-band DDL call [`SchemaCatalog::invalidate`]
//! or [`SchemaCatalog::clear`].

use crate::connection::{Connection, ResultRow};
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::params::ParamMap;
use crate::scope::validate_ident;
use crate::value::{FromValue, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Index role of a column as reported by the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyRole {
    #[default]
    None,
    Primary,
    Unique,
    Multiple,
}

impl KeyRole {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PRI" => Self::Primary,
            "UNI" => Self::Unique,
            "MUL" => Self::Multiple,
            _ => Self::None,
        }
    }
}

/// Broad type family of a column, parsed from the raw type string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Decimal,
    Float,
    Text,
    Blob,
    Enum,
    Set,
    Date,
    DateTime,
    Time,
    Year,
    Timestamp,
    Boolean,
    Json,
    Uuid,
    Other,
}

impl ColumnType {
    /// Classify a MySQL (`int(11) unsigned`, `varchar(255)`) or PostgreSQL
    /// (`character varying(255)`, `timestamp without time zone`) type name.
    pub fn classify(raw: &str) -> Self {
        let lower = raw.trim().to_ascii_lowercase();
        let base = lower
            .split('(')
            .next()
            .unwrap_or_default()
            .trim_end_matches("[]")
            .trim();

        match base {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "serial"
            | "bigserial" | "smallserial" | "int2" | "int4" | "int8" => Self::Integer,
            "decimal" | "numeric" | "dec" | "fixed" | "money" => Self::Decimal,
            "float" | "double" | "real" | "double precision" | "float4" | "float8" => Self::Float,
            "char" | "varchar" | "text" | "tinytext" | "mediumtext" | "longtext"
            | "character varying" | "character" | "bpchar" | "citext" | "name" => Self::Text,
            "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary"
            | "bytea" => Self::Blob,
            "enum" => Self::Enum,
            "set" => Self::Set,
            "date" => Self::Date,
            "datetime" => Self::DateTime,
            "year" => Self::Year,
            "boolean" | "bool" | "bit" => Self::Boolean,
            "json" | "jsonb" => Self::Json,
            "uuid" => Self::Uuid,
            _ if base.starts_with("timestamp") => Self::Timestamp,
            _ if base == "time" || base.starts_with("time ") => Self::Time,
            _ if base.split_whitespace().next().is_some_and(|w| w.ends_with("int")) => {
                Self::Integer
            }
            _ => Self::Other,
        }
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            Self::Date | Self::DateTime | Self::Time | Self::Year | Self::Timestamp
        )
    }
}

/// Metadata for one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub raw_type: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<String>,
    pub key: KeyRole,
    pub auto_generated: bool,
    pub on_update_timestamp: bool,
    pub extra: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, raw_type: impl Into<String>) -> Self {
        let raw_type = raw_type.into();
        Self {
            name: name.into(),
            column_type: ColumnType::classify(&raw_type),
            raw_type,
            nullable: true,
            default: None,
            key: KeyRole::None,
            auto_generated: false,
            on_update_timestamp: false,
            extra: String::new(),
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.key = KeyRole::Primary;
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_generated = true;
        self.extra = "auto_increment".to_string();
        self
    }

    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn is_primary(&self) -> bool {
        self.key == KeyRole::Primary
    }

    /// Whether the database assigns a value when none is written.
    pub fn has_database_default(&self) -> bool {
        self.auto_generated || self.on_update_timestamp || self.default.is_some()
    }

    fn from_introspection(table: &str, row: &ResultRow) -> OrmResult<Self> {
        let text = |column: &str| -> OrmResult<Option<String>> {
            row.get(column)
                .map(Option::<String>::from_value)
                .transpose()
                .map(Option::flatten)
                .map_err(|message| OrmError::schema(table, format!("{column}: {message}")))
        };

        let name = text("Field")?
            .ok_or_else(|| OrmError::schema(table, "introspection row without Field"))?;
        let raw_type = text("Type")?.unwrap_or_default();
        let extra = text("Extra")?.unwrap_or_default();
        let extra_lower = extra.to_ascii_lowercase();

        let mut info = ColumnInfo::new(name, raw_type);
        info.nullable = text("Null")?.is_some_and(|n| n.eq_ignore_ascii_case("YES"));
        info.default = text("Default")?;
        info.key = KeyRole::parse(&text("Key")?.unwrap_or_default());
        info.auto_generated = extra_lower.contains("auto_increment");
        info.on_update_timestamp = extra_lower.contains("on update");
        info.extra = extra;
        Ok(info)
    }
}

/// Ordered column metadata of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    primary_key: Vec<String>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        let primary_key = columns
            .iter()
            .filter(|c| c.is_primary())
            .map(|c| c.name.clone())
            .collect();
        Self {
            table: table.into(),
            columns,
            primary_key,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// First auto-generated column.
    pub fn auto_column(&self) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.auto_generated)
    }

    /// Column used to locate the most recently inserted row: the first
    /// column that is auto-generated or of timestamp type.
    pub fn last_row_column(&self) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.auto_generated || c.column_type == ColumnType::Timestamp)
    }
}

const POSTGRES_COLUMNS_SQL: &str = r#"
SELECT
  a.attname::text AS "Field",
  pg_catalog.format_type(a.atttypid, a.atttypmod) AS "Type",
  CASE WHEN a.attnotnull THEN 'NO' ELSE 'YES' END AS "Null",
  CASE WHEN pk.indrelid IS NOT NULL THEN 'PRI' ELSE '' END AS "Key",
  pg_get_expr(ad.adbin, ad.adrelid) AS "Default",
  CASE
    WHEN a.attidentity IN ('a', 'd') THEN 'auto_increment'
    WHEN pg_get_expr(ad.adbin, ad.adrelid) LIKE 'nextval(%' THEN 'auto_increment'
    ELSE ''
  END AS "Extra"
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid
LEFT JOIN pg_catalog.pg_attrdef ad ON ad.adrelid = c.oid AND ad.adnum = a.attnum
LEFT JOIN pg_catalog.pg_index pk
  ON pk.indrelid = c.oid AND pk.indisprimary AND a.attnum = ANY(pk.indkey)
WHERE c.relkind IN ('r', 'p', 'v', 'm', 'f')
  AND a.attnum > 0
  AND NOT a.attisdropped
  AND n.nspname = :schema
  AND c.relname = :table
ORDER BY a.attnum
"#;

/// Introspection statement and its positional parameters.
pub(crate) fn introspection_query(
    dialect: Dialect,
    schema: &str,
    table: &str,
) -> OrmResult<(String, Vec<Value>)> {
    match dialect {
        Dialect::MySql => Ok((
            format!("SHOW COLUMNS FROM {}", dialect.quote_ident(table)),
            Vec::new(),
        )),
        Dialect::Postgres => {
            let params = ParamMap::new().with("schema", schema).with("table", table);
            dialect.to_positional(POSTGRES_COLUMNS_SQL, &params)
        }
    }
}

/// Cache of [`TableSchema`]s for one connection.
#[derive(Debug)]
pub struct SchemaCatalog {
    schema: String,
    tables: RwLock<HashMap<String, Arc<TableSchema>>>,
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::new("public")
    }
}

impl SchemaCatalog {
    /// `schema` is the PostgreSQL namespace searched; MySQL ignores it.
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    fn cached(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(table)
            .cloned()
    }

    /// Metadata for `table`, introspected on first use.
    ///
    /// Concurrent misses may both query the database; the last writer wins
    /// and both results are identical.
    pub async fn table_schema<C: Connection>(
        &self,
        conn: &C,
        table: &str,
    ) -> OrmResult<Arc<TableSchema>> {
        if let Some(schema) = self.cached(table) {
            tracing::trace!(target: "quarry.catalog", table, "schema cache hit");
            return Ok(schema);
        }

        validate_ident("table", table).map_err(|e| OrmError::schema(table, e.to_string()))?;
        tracing::debug!(target: "quarry.catalog", table, schema = %self.schema, "introspecting table");

        let (sql, params) = introspection_query(conn.dialect(), &self.schema, table)?;
        let rows = conn
            .query(&sql, &params)
            .await
            .map_err(|e| OrmError::schema(table, e.to_string()))?;
        if rows.is_empty() {
            return Err(OrmError::schema(table, "table does not exist or has no columns"));
        }

        let columns = rows
            .iter()
            .map(|row| ColumnInfo::from_introspection(table, row))
            .collect::<OrmResult<Vec<_>>>()?;
        let schema = Arc::new(TableSchema::new(table, columns));
        self.insert(Arc::clone(&schema));
        Ok(schema)
    }

    pub async fn columns<C: Connection>(&self, conn: &C, table: &str) -> OrmResult<Vec<String>> {
        Ok(self.table_schema(conn, table).await?.column_names())
    }

    pub async fn primary_key_columns<C: Connection>(
        &self,
        conn: &C,
        table: &str,
    ) -> OrmResult<Vec<String>> {
        Ok(self.table_schema(conn, table).await?.primary_key().to_vec())
    }

    /// Introspect every table in `tables` that is not cached yet.
    pub async fn preload<C, I, S>(&self, conn: &C, tables: I) -> OrmResult<()>
    where
        C: Connection,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for table in tables {
            self.table_schema(conn, table.as_ref()).await?;
        }
        Ok(())
    }

    /// Seed the cache with known metadata, replacing any cached entry.
    pub fn insert(&self, schema: Arc<TableSchema>) {
        self.tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(schema.table.clone(), schema);
    }

    pub fn is_cached(&self, table: &str) -> bool {
        self.cached(table).is_some()
    }

    /// Drop one table so the next access re-introspects it.
    pub fn invalidate(&self, table: &str) -> bool {
        let removed = self
            .tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(table)
            .is_some();
        if removed {
            tracing::debug!(target: "quarry.catalog", table, "schema invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        self.tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_both_vocabularies() {
        assert_eq!(ColumnType::classify("int(11) unsigned"), ColumnType::Integer);
        assert_eq!(ColumnType::classify("varchar(255)"), ColumnType::Text);
        assert_eq!(ColumnType::classify("character varying(255)"), ColumnType::Text);
        assert_eq!(
            ColumnType::classify("timestamp without time zone"),
            ColumnType::Timestamp
        );
        assert_eq!(ColumnType::classify("time without time zone"), ColumnType::Time);
        assert_eq!(ColumnType::classify("datetime"), ColumnType::DateTime);
        assert_eq!(ColumnType::classify("numeric(10,2)"), ColumnType::Decimal);
        assert_eq!(ColumnType::classify("enum('a','b')"), ColumnType::Enum);
        assert_eq!(ColumnType::classify("year(4)"), ColumnType::Year);
        assert_eq!(ColumnType::classify("jsonb"), ColumnType::Json);
        assert_eq!(ColumnType::classify("geometry"), ColumnType::Other);
    }

    #[test]
    fn introspection_rows_become_column_info() {
        let row = ResultRow::from_pairs([
            ("Field", Value::from("id")),
            ("Type", Value::from("int(11)")),
            ("Null", Value::from("NO")),
            ("Key", Value::from("PRI")),
            ("Default", Value::Null),
            ("Extra", Value::from("auto_increment")),
        ]);
        let info = ColumnInfo::from_introspection("users", &row).unwrap();
        assert_eq!(info.name, "id");
        assert!(info.is_primary());
        assert!(info.auto_generated);
        assert!(!info.nullable);
        assert!(info.has_database_default());

        let row = ResultRow::from_pairs([
            ("Field", Value::from("updated")),
            ("Type", Value::from("timestamp")),
            ("Null", Value::from("YES")),
            ("Key", Value::from("")),
            ("Default", Value::from("CURRENT_TIMESTAMP")),
            ("Extra", Value::from("DEFAULT_GENERATED on update CURRENT_TIMESTAMP")),
        ]);
        let info = ColumnInfo::from_introspection("users", &row).unwrap();
        assert!(info.on_update_timestamp);
        assert_eq!(info.default.as_deref(), Some("CURRENT_TIMESTAMP"));
    }

    #[test]
    fn table_schema_derives_keys() {
        let schema = TableSchema::new(
            "users",
            vec![
                ColumnInfo::new("id", "int").primary_key().auto_increment(),
                ColumnInfo::new("name", "varchar(20)").not_null(),
                ColumnInfo::new("created_at", "timestamp"),
            ],
        );
        assert_eq!(schema.primary_key(), ["id".to_string()]);
        assert_eq!(schema.auto_column().map(|c| c.name.as_str()), Some("id"));
        assert_eq!(schema.last_row_column().map(|c| c.name.as_str()), Some("id"));
    }

    #[test]
    fn invalidate_and_clear() {
        let catalog = SchemaCatalog::default();
        catalog.insert(Arc::new(TableSchema::new("a", vec![ColumnInfo::new("id", "int")])));
        catalog.insert(Arc::new(TableSchema::new("b", vec![ColumnInfo::new("id", "int")])));
        assert!(catalog.invalidate("a"));
        assert!(!catalog.invalidate("a"));
        assert!(catalog.is_cached("b"));
        catalog.clear();
        assert!(!catalog.is_cached("b"));
    }

    #[test]
    fn introspection_sql_per_dialect() {
        let (sql, params) = introspection_query(Dialect::MySql, "public", "users").unwrap();
        assert_eq!(sql, "SHOW COLUMNS FROM `users`");
        assert!(params.is_empty());

        let (sql, params) = introspection_query(Dialect::Postgres, "public", "users").unwrap();
        assert!(sql.contains("n.nspname = $1"));
        assert!(sql.contains("c.relname = $2"));
        assert!(sql.contains("a.attname::text"));
        assert_eq!(params, vec![Value::from("public"), Value::from("users")]);
    }
}
