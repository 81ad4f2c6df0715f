//! Table-mapped records and their persistence operations.
//!
//! Implement the traits with `#[derive(Record)]`:
//!
//! ```ignore
//! use quarry::prelude::*;
//!
//! #[derive(Debug, Default, Record)]
//! #[orm(table = "users", connection = "main")]
//! struct User {
//!     #[orm(id)]
//!     id: Option<i64>,
//!     name: String,
//!     created_at: Option<chrono::NaiveDateTime>,
//!     #[orm(join)]
//!     orders: Option<Order>,
//!     #[orm(state)]
//!     state: RecordState,
//! }
//!
//! let mut user = User { name: "Ana".into(), ..Default::default() };
//! user.save(&db).await?;
//! assert!(!user.is_new());
//! ```

use crate::condition::Condition;
use crate::connection::Connection;
use crate::db::Db;
use crate::error::{OrmError, OrmResult};
use crate::expr::Operand;
use crate::hydrate::AnonymousRecord;
use crate::value::Value;

/// Static table mapping of a record type.
pub trait TableMapped {
    const TABLE: &'static str;
    const CONNECTION: &'static str;

    fn table_name() -> &'static str {
        Self::TABLE
    }

    fn connection_id() -> &'static str {
        Self::CONNECTION
    }

    /// Mapped column names, in declaration order.
    fn columns() -> &'static [&'static str];

    fn primary_key() -> &'static [&'static str];
}

/// Persistence bookkeeping carried by every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordState {
    persisted: bool,
    error: Option<String>,
}

impl RecordState {
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    pub fn mark_new(&mut self) {
        self.persisted = false;
    }

    /// Message of the last failed `save()`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }
}

/// A record mapped to one table row.
pub trait Record: TableMapped + Default + Send + Sync + Sized + 'static {
    fn state(&self) -> &RecordState;

    fn state_mut(&mut self) -> &mut RecordState;

    /// Current column values, in [`TableMapped::columns`] order.
    fn to_values(&self) -> Vec<(&'static str, Value)>;

    /// Value of a mapped column, `None` if the record has no such field.
    fn get_value(&self, column: &str) -> Option<Value>;

    /// Assign a mapped column. Returns `false` if the record has no such field.
    fn set_value(&mut self, column: &str, value: &Value) -> OrmResult<bool>;

    /// Assign every column (and nested join) present in `record`.
    fn inflate(&mut self, record: &AnonymousRecord) -> OrmResult<()>;

    /// Checked by `save()` before any SQL is built.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    fn from_anonymous(record: &AnonymousRecord) -> OrmResult<Self> {
        let mut out = Self::default();
        out.inflate(record)?;
        Ok(out)
    }

    fn is_new(&self) -> bool {
        !self.state().is_persisted()
    }

    /// Validate, then INSERT or UPDATE and reload what the database stored.
    ///
    /// Returns `Ok(false)` when validation fails or nothing was inserted; the
    /// reason is available from [`RecordState::error`].
    fn save<C: Connection>(
        &mut self,
        db: &Db<C>,
    ) -> impl std::future::Future<Output = OrmResult<bool>> + Send {
        async move { save(self, db).await }
    }

    /// DELETE this row. A new record deletes nothing and returns 0.
    fn delete<C: Connection>(
        &mut self,
        db: &Db<C>,
    ) -> impl std::future::Future<Output = OrmResult<u64>> + Send {
        async move {
            if self.is_new() {
                return Ok(0);
            }
            let pk = primary_key_condition(self);
            let deleted = db
                .query(Self::TABLE)
                .delete()
                .where_(pk)
                .exec()
                .await?
                .into_affected()?;
            self.state_mut().mark_new();
            Ok(deleted)
        }
    }

    /// Reload every column from the database by primary key.
    fn reload<C: Connection>(
        &mut self,
        db: &Db<C>,
    ) -> impl std::future::Future<Output = OrmResult<bool>> + Send {
        async move {
            if self.is_new() {
                return Ok(false);
            }
            let pk = primary_key_condition(self);
            match db.query(Self::TABLE).select_one().where_(pk).exec().await?.into_row()? {
                Some(row) => {
                    self.inflate(&row)?;
                    Ok(true)
                }
                None => {
                    self.state_mut().mark_new();
                    Ok(false)
                }
            }
        }
    }

    /// Load the parent `P` referenced by this record's `{P table}_{pk}` fields.
    fn get_parent<P: Record, C: Connection>(
        &self,
        db: &Db<C>,
    ) -> impl std::future::Future<Output = OrmResult<Option<P>>> + Send {
        async move {
            let mut pairs = Vec::with_capacity(P::primary_key().len());
            for pk in P::primary_key() {
                let related = format!("{}_{}", P::TABLE, pk);
                let value = self.get_value(&related).ok_or_else(|| OrmError::MissingProperty {
                    record: Self::TABLE.to_string(),
                    column: related.clone(),
                })?;
                pairs.push((pk.to_string(), Operand::Value(value)));
            }
            db.query(P::TABLE)
                .find_by_pk::<P>(Condition::Map(pairs))
                .await
        }
    }

    /// Every `Ch` whose `{this table}_{pk}` fields point at this record.
    fn children<Ch: Record, C: Connection>(
        &self,
        db: &Db<C>,
    ) -> impl std::future::Future<Output = OrmResult<Vec<Ch>>> + Send {
        async move {
            if self.is_new() {
                return Ok(Vec::new());
            }
            db.query(Ch::TABLE)
                .find()
                .where_(child_condition(self))
                .fetch_all::<Ch>()
                .await
        }
    }

    fn count_children<Ch: Record, C: Connection>(
        &self,
        db: &Db<C>,
    ) -> impl std::future::Future<Output = OrmResult<i64>> + Send {
        async move {
            if self.is_new() {
                return Ok(0);
            }
            db.query(Ch::TABLE)
                .count()
                .where_(child_condition(self))
                .exec()
                .await?
                .into_count()
        }
    }

    /// Point this record's `{P table}_{pk}` fields at `parent`.
    fn set_parent<P: Record>(&mut self, parent: &P) -> OrmResult<()> {
        if parent.is_new() {
            return Err(OrmError::NewParent(P::TABLE.to_string()));
        }
        for pk in P::primary_key() {
            let related = format!("{}_{}", P::TABLE, pk);
            let value = parent.get_value(pk).unwrap_or_default();
            if !self.set_value(&related, &value)? {
                return Err(OrmError::MissingProperty {
                    record: Self::TABLE.to_string(),
                    column: related,
                });
            }
        }
        Ok(())
    }
}

/// Build `R` from a hydrated row and mark it persisted.
pub fn hydrate_typed<R: Record>(record: &AnonymousRecord) -> OrmResult<R> {
    let mut out = R::from_anonymous(record)?;
    out.state_mut().mark_persisted();
    Ok(out)
}

/// Nested joined record of type `R`; an empty nested record (outer-join
/// miss) or an absent one is `None`.
pub fn hydrate_nested<R: Record>(parent: &AnonymousRecord) -> OrmResult<Option<R>> {
    match parent.nested(R::TABLE) {
        Some(nested) if !nested.is_empty() => hydrate_typed(nested).map(Some),
        _ => Ok(None),
    }
}

fn primary_key_condition<R: Record>(record: &R) -> Condition {
    Condition::Map(
        R::primary_key()
            .iter()
            .map(|pk| {
                let value = record.get_value(pk).unwrap_or_default();
                (pk.to_string(), Operand::Value(value))
            })
            .collect(),
    )
}

fn child_condition<R: Record>(record: &R) -> Condition {
    Condition::Map(
        R::primary_key()
            .iter()
            .map(|pk| {
                let value = record.get_value(pk).unwrap_or_default();
                (format!("{}_{}", R::TABLE, pk), Operand::Value(value))
            })
            .collect(),
    )
}

async fn save<R: Record, C: Connection>(record: &mut R, db: &Db<C>) -> OrmResult<bool> {
    if let Err(message) = record.validate() {
        record.state_mut().set_error(message);
        return Ok(false);
    }
    record.state_mut().clear_error();

    let values: Vec<(String, Operand)> = record
        .to_values()
        .into_iter()
        .map(|(column, value)| (column.to_string(), Operand::Value(value)))
        .collect();
    let columns: Vec<&str> = R::columns().to_vec();

    if !record.is_new() {
        let pk = primary_key_condition(record);
        db.query(R::TABLE)
            .update(values)
            .where_(pk.clone())
            .exec()
            .await?;
        if let Some(row) = db
            .query(R::TABLE)
            .select_one_cols(columns)
            .where_(pk)
            .exec()
            .await?
            .into_row()?
        {
            record.inflate(&row)?;
        }
        return Ok(true);
    }

    // Unset fields leave defaulted columns to the database.
    let schema = db.table_schema(R::TABLE).await?;
    let values: Vec<(String, Operand)> = values
        .into_iter()
        .filter(|(column, operand)| {
            !(matches!(operand, Operand::Value(Value::Null))
                && schema.column(column).is_some_and(|c| c.has_database_default()))
        })
        .collect();
    let inserted = db.query(R::TABLE).insert(values).exec().await?.into_affected()?;
    if inserted == 0 {
        record.state_mut().set_error("The new record was not inserted.");
        return Ok(false);
    }

    let pk_complete = R::primary_key()
        .iter()
        .all(|pk| record.get_value(pk).is_some_and(|v| !v.is_null()));
    let row = if pk_complete && !R::primary_key().is_empty() {
        db.query(R::TABLE)
            .select_one()
            .where_(primary_key_condition(record))
            .exec()
            .await?
            .into_row()?
    } else {
        let mut last_row_columns = columns;
        for pk in R::primary_key() {
            if !last_row_columns.contains(pk) {
                last_row_columns.push(*pk);
            }
        }
        db.query(R::TABLE)
            .get_last_row_cols(last_row_columns)
            .await?
    };

    if let Some(row) = row {
        record.inflate(&row)?;
        record.state_mut().mark_persisted();
    }
    Ok(true)
}
