//! Fluent statement builder.
//!
//! Verb, join, where, order and limit calls only record intent. Nothing is
//! resolved against the schema until the statement is compiled by
//! [`Query::get_sql`], [`Query::compile`] or [`Query::exec`].
//!
//! ```ignore
//! use quarry::prelude::*;
//!
//! let mut q = db.query("Users");
//! let active = q.count().where_(cond! { "status" => "active" }).exec().await?.into_count()?;
//!
//! let users = q
//!     .find()
//!     .left_join("Orders")
//!     .where_(cond! { "Users.id" => 5 })
//!     .order_by("name", Direction::Asc)
//!     .exec()
//!     .await?
//!     .into_rows()?;
//! ```

mod compile;


pub use compile::CompiledStatement;

use crate::condition::{Condition, LogicalOp};
use crate::connection::Connection;
use crate::db::Db;
use crate::error::{OrmError, OrmResult};
use crate::expr::{Operand, SqlExpr};
use crate::hydrate::AnonymousRecord;
use crate::output::QueryOutput;
use crate::params::ParamMap;
use crate::record::Record;
use crate::value::Value;

/// Statement kind selected by the last verb call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
    Count,
    Aggregate,
}

/// How many rows a SELECT returns to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fetch {
    #[default]
    Many,
    One,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

/// Column list argument: `"id, name"`, `["id", "name"]`, `vec![...]`.
pub trait IntoColumns {
    fn into_columns(self) -> Vec<String>;
}

impl IntoColumns for &str {
    fn into_columns(self) -> Vec<String> {
        self.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect()
    }
}

impl IntoColumns for String {
    fn into_columns(self) -> Vec<String> {
        self.as_str().into_columns()
    }
}

impl IntoColumns for &String {
    fn into_columns(self) -> Vec<String> {
        self.as_str().into_columns()
    }
}

impl<S: AsRef<str>> IntoColumns for Vec<S> {
    fn into_columns(self) -> Vec<String> {
        self.iter().map(|c| c.as_ref().trim().to_string()).collect()
    }
}

impl<S: AsRef<str>> IntoColumns for &[S] {
    fn into_columns(self) -> Vec<String> {
        self.iter().map(|c| c.as_ref().trim().to_string()).collect()
    }
}

impl<S: AsRef<str>, const N: usize> IntoColumns for [S; N] {
    fn into_columns(self) -> Vec<String> {
        self.iter().map(|c| c.as_ref().trim().to_string()).collect()
    }
}

/// A join specification for [`Query::join_with`].
///
/// `target` is `"B"` (joined to the builder's table) or `"A.B"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    target: String,
    kind: JoinKind,
    columns: Option<Vec<String>>,
    condition: Option<Condition>,
}

impl Join {
    pub fn new(target: impl Into<String>, kind: JoinKind) -> Self {
        Self {
            target: target.into(),
            kind,
            columns: None,
            condition: None,
        }
    }

    pub fn inner(target: impl Into<String>) -> Self {
        Self::new(target, JoinKind::Inner)
    }

    pub fn left(target: impl Into<String>) -> Self {
        Self::new(target, JoinKind::Left)
    }

    pub fn right(target: impl Into<String>) -> Self {
        Self::new(target, JoinKind::Right)
    }

    /// Columns of the joined table to select. Defaults to all of them.
    pub fn columns(mut self, columns: impl IntoColumns) -> Self {
        self.columns = Some(columns.into_columns());
        self
    }

    /// Explicit join condition. Bare columns refer to the joined table.
    pub fn on(mut self, condition: impl Into<Condition>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JoinIntent {
    pub(crate) left: String,
    pub(crate) right: String,
    pub(crate) kind: JoinKind,
    pub(crate) columns: Option<Vec<String>>,
    pub(crate) condition: Option<Condition>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WhereIntent {
    pub(crate) condition: Condition,
    pub(crate) inner: LogicalOp,
    pub(crate) outer: LogicalOp,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OrderIntent {
    Columns(Vec<String>, Direction),
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AggregateFn {
    Max,
    Min,
    Sum,
}

impl AggregateFn {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            AggregateFn::Max => "MAX",
            AggregateFn::Min => "MIN",
            AggregateFn::Sum => "SUM",
        }
    }
}

/// Accumulated, uncompiled intent of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Statement {
    pub(crate) kind: Option<QueryKind>,
    pub(crate) fetch: Fetch,
    /// Add primary-key columns to explicit column lists.
    pub(crate) ensure_pk: bool,
    pub(crate) columns: Option<Vec<String>>,
    pub(crate) exprs: Vec<SqlExpr>,
    pub(crate) aggregates: Vec<(AggregateFn, String)>,
    pub(crate) joins: Vec<JoinIntent>,
    pub(crate) writes: Vec<(String, Operand)>,
    pub(crate) wheres: Vec<WhereIntent>,
    pub(crate) order: Vec<OrderIntent>,
    pub(crate) limit: Option<(u64, Option<u64>)>,
    pub(crate) bad_join: Option<String>,
}

/// Builder for one statement against `table`, reusable after every `exec()`.
#[derive(Debug)]
pub struct Query<'db, C> {
    db: &'db Db<C>,
    table: String,
    state: Statement,
}

impl<'db, C: Connection> Query<'db, C> {
    pub(crate) fn new(db: &'db Db<C>, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
            state: Statement::default(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn read(
        &mut self,
        kind: QueryKind,
        fetch: Fetch,
        ensure_pk: bool,
        columns: Option<Vec<String>>,
    ) -> &mut Self {
        self.state.kind = Some(kind);
        self.state.fetch = fetch;
        self.state.ensure_pk = ensure_pk;
        self.state.columns = columns;
        self.state.aggregates.clear();
        if fetch == Fetch::One {
            self.state.limit = Some((1, None));
        }
        self
    }

    /// SELECT every column, for typed hydration.
    pub fn find(&mut self) -> &mut Self {
        self.read(QueryKind::Select, Fetch::Many, true, None)
    }

    /// SELECT `columns` plus the primary key.
    pub fn find_cols(&mut self, columns: impl IntoColumns) -> &mut Self {
        self.read(QueryKind::Select, Fetch::Many, true, Some(columns.into_columns()))
    }

    pub fn find_one(&mut self) -> &mut Self {
        self.read(QueryKind::Select, Fetch::One, true, None)
    }

    pub fn find_one_cols(&mut self, columns: impl IntoColumns) -> &mut Self {
        self.read(QueryKind::Select, Fetch::One, true, Some(columns.into_columns()))
    }

    /// SELECT every column into anonymous records.
    pub fn select(&mut self) -> &mut Self {
        self.read(QueryKind::Select, Fetch::Many, false, None)
    }

    /// SELECT exactly `columns`.
    pub fn select_cols(&mut self, columns: impl IntoColumns) -> &mut Self {
        self.read(QueryKind::Select, Fetch::Many, false, Some(columns.into_columns()))
    }

    pub fn select_one(&mut self) -> &mut Self {
        self.read(QueryKind::Select, Fetch::One, false, None)
    }

    pub fn select_one_cols(&mut self, columns: impl IntoColumns) -> &mut Self {
        self.read(QueryKind::Select, Fetch::One, false, Some(columns.into_columns()))
    }

    /// Add an expression to the select list, aliased by [`SqlExpr::alias`].
    pub fn select_expr(&mut self, expr: SqlExpr) -> &mut Self {
        self.state.exprs.push(expr);
        self
    }

    pub fn count(&mut self) -> &mut Self {
        self.state.kind = Some(QueryKind::Count);
        self.state.fetch = Fetch::One;
        self
    }

    fn aggregate(&mut self, func: AggregateFn, columns: impl IntoColumns) -> &mut Self {
        self.state.kind = Some(QueryKind::Aggregate);
        self.state.fetch = Fetch::One;
        self.state.aggregates = columns
            .into_columns()
            .into_iter()
            .map(|c| (func, c))
            .collect();
        self
    }

    /// `MAX(column)` for each column, keyed `{table}_{column}` like selected
    /// columns.
    pub fn max(&mut self, columns: impl IntoColumns) -> &mut Self {
        self.aggregate(AggregateFn::Max, columns)
    }

    pub fn min(&mut self, columns: impl IntoColumns) -> &mut Self {
        self.aggregate(AggregateFn::Min, columns)
    }

    pub fn sum(&mut self, columns: impl IntoColumns) -> &mut Self {
        self.aggregate(AggregateFn::Sum, columns)
    }

    fn write<K, V>(
        &mut self,
        kind: QueryKind,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> &mut Self
    where
        K: Into<String>,
        V: Into<Operand>,
    {
        self.state.kind = Some(kind);
        self.state.writes = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// INSERT one row. Values are coerced against column metadata.
    pub fn insert<K, V>(&mut self, values: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<Operand>,
    {
        self.write(QueryKind::Insert, values)
    }

    pub fn update<K, V>(&mut self, values: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<Operand>,
    {
        self.write(QueryKind::Update, values)
    }

    pub fn delete(&mut self) -> &mut Self {
        self.state.kind = Some(QueryKind::Delete);
        self
    }

    fn push_join(&mut self, join: Join) -> &mut Self {
        let parts: Vec<&str> = join.target.split('.').map(str::trim).collect();
        let (left, right) = match parts.as_slice() {
            [right] => (self.table.clone(), right.to_string()),
            [left, right] => (left.to_string(), right.to_string()),
            _ => {
                if self.state.bad_join.is_none() {
                    self.state.bad_join =
                        Some(format!("join target '{}' has more than two parts", join.target));
                }
                return self;
            }
        };
        self.state.joins.push(JoinIntent {
            left,
            right,
            kind: join.kind,
            columns: join.columns,
            condition: join.condition.filter(|c| !c.is_empty()),
        });
        self
    }

    /// INNER JOIN `target` with a derived condition.
    pub fn join(&mut self, target: &str) -> &mut Self {
        self.push_join(Join::inner(target))
    }

    pub fn left_join(&mut self, target: &str) -> &mut Self {
        self.push_join(Join::left(target))
    }

    pub fn right_join(&mut self, target: &str) -> &mut Self {
        self.push_join(Join::right(target))
    }

    pub fn join_with(&mut self, join: Join) -> &mut Self {
        self.push_join(join)
    }

    /// Append a WHERE fragment. `inner` joins the pairs of a map condition;
    /// `outer` joins the fragment to the ones before it. Empty conditions are
    /// ignored.
    pub fn where_with(
        &mut self,
        condition: impl Into<Condition>,
        inner: LogicalOp,
        outer: LogicalOp,
    ) -> &mut Self {
        let condition = condition.into();
        if !condition.is_empty() {
            self.state.wheres.push(WhereIntent {
                condition,
                inner,
                outer,
            });
        }
        self
    }

    pub fn where_(&mut self, condition: impl Into<Condition>) -> &mut Self {
        self.where_with(condition, LogicalOp::And, LogicalOp::And)
    }

    /// OR-joined to the previous fragments.
    pub fn or_where(&mut self, condition: impl Into<Condition>) -> &mut Self {
        self.where_with(condition, LogicalOp::And, LogicalOp::Or)
    }

    /// Pairs joined with OR inside the fragment.
    pub fn where_or(&mut self, condition: impl Into<Condition>) -> &mut Self {
        self.where_with(condition, LogicalOp::Or, LogicalOp::And)
    }

    pub fn or_where_or(&mut self, condition: impl Into<Condition>) -> &mut Self {
        self.where_with(condition, LogicalOp::Or, LogicalOp::Or)
    }

    pub fn order_by(&mut self, columns: impl IntoColumns, direction: Direction) -> &mut Self {
        let columns = columns.into_columns();
        if !columns.is_empty() {
            self.state.order.push(OrderIntent::Columns(columns, direction));
        }
        self
    }

    pub fn order_by_rand(&mut self) -> &mut Self {
        self.state.order.push(OrderIntent::Random);
        self
    }

    /// `LIMIT offset, count`; without `count`, `offset` is the row count.
    pub fn limit(&mut self, offset: u64, count: Option<u64>) -> &mut Self {
        self.state.limit = Some((offset, count));
        self
    }

    /// 1-indexed page of `rows_per_page` rows.
    pub fn page(&mut self, page: u64, rows_per_page: u64) -> &mut Self {
        let offset = page.saturating_sub(1).saturating_mul(rows_per_page);
        self.limit(offset, Some(rows_per_page))
    }

    /// Compile the accumulated statement without executing or resetting it.
    pub async fn compile(&self) -> OrmResult<CompiledStatement> {
        compile::compile(self.db, &self.table, &self.state).await
    }

    pub async fn get_sql(&self) -> OrmResult<String> {
        Ok(self.compile().await?.sql)
    }

    pub async fn get_params(&self) -> OrmResult<ParamMap> {
        Ok(self.compile().await?.params)
    }

    /// Compile, execute and shape the result. The builder is empty afterwards,
    /// whether or not execution succeeded.
    pub async fn exec(&mut self) -> OrmResult<QueryOutput> {
        let state = std::mem::take(&mut self.state);
        let compiled = compile::compile(self.db, &self.table, &state).await?;
        self.db.run(compiled).await
    }

    /// Discard everything accumulated so far.
    pub fn reset(&mut self) -> &mut Self {
        self.state = Statement::default();
        self
    }

    async fn single_pk_column(&self) -> OrmResult<String> {
        let schema = self.db.table_schema(&self.table).await?;
        match schema.primary_key() {
            [pk] => Ok(pk.clone()),
            [] => Err(OrmError::schema(&self.table, "table has no primary key")),
            _ => Err(OrmError::schema(
                &self.table,
                "table has a composite primary key; use a primary-key map",
            )),
        }
    }

    /// One anonymous row by primary-key map.
    pub async fn select_by_pk(
        &mut self,
        pk: impl Into<Condition>,
    ) -> OrmResult<Option<AnonymousRecord>> {
        self.select_one().where_(pk).exec().await?.into_row()
    }

    /// One anonymous row by single-column primary key.
    pub async fn select_by_id(&mut self, id: impl Into<Value>) -> OrmResult<Option<AnonymousRecord>> {
        let pk = self.single_pk_column().await?;
        self.select_by_pk(Condition::eq(pk, id.into())).await
    }

    pub async fn find_by_pk<R: Record>(&mut self, pk: impl Into<Condition>) -> OrmResult<Option<R>> {
        self.find_one().where_(pk).exec().await?.into_record::<R>()
    }

    pub async fn find_by_id<R: Record>(&mut self, id: impl Into<Value>) -> OrmResult<Option<R>> {
        let pk = self.single_pk_column().await?;
        self.find_by_pk::<R>(Condition::eq(pk, id.into())).await
    }

    /// Execute and hydrate every row as `R`.
    pub async fn fetch_all<R: Record>(&mut self) -> OrmResult<Vec<R>> {
        self.exec().await?.into_records::<R>()
    }

    pub async fn fetch_one<R: Record>(&mut self) -> OrmResult<Option<R>> {
        self.exec().await?.into_record::<R>()
    }

    /// Most recently inserted row, located by the first auto-generated or
    /// timestamp column. `None` when the table has no such column.
    ///
    /// Concurrent inserts can make this return another writer's row.
    pub async fn get_last_row(&mut self) -> OrmResult<Option<AnonymousRecord>> {
        self.last_row(None, false).await?.into_row()
    }

    pub async fn get_last_row_cols(
        &mut self,
        columns: impl IntoColumns,
    ) -> OrmResult<Option<AnonymousRecord>> {
        self.last_row(Some(columns.into_columns()), false).await?.into_row()
    }

    pub async fn get_last_object<R: Record>(&mut self) -> OrmResult<Option<R>> {
        self.last_row(None, true).await?.into_record::<R>()
    }

    async fn last_row(
        &mut self,
        columns: Option<Vec<String>>,
        typed: bool,
    ) -> OrmResult<QueryOutput> {
        let schema = match self.db.table_schema(&self.table).await {
            Ok(schema) => schema,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };
        let Some(column) = schema.last_row_column() else {
            self.reset();
            return Ok(QueryOutput::Row(None));
        };
        let column = column.name.clone();
        self.read(QueryKind::Select, Fetch::One, typed, columns)
            .order_by(column.as_str(), Direction::Desc)
            .exec()
            .await
    }
}
