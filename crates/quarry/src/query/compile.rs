//! Statement compilation.
//!
//! Clause order is fixed: select list, FROM, joins, WHERE, ORDER BY, LIMIT.
//! Every fragment is renamed through one [`PlaceholderAllocator`] per
//! statement, so parameter names never collide inside it.

use super::{Fetch, JoinIntent, OrderIntent, QueryKind, Statement};
use crate::catalog::TableSchema;
use crate::coerce::{WriteKind, coerce_value};
use crate::condition::{LogicalOp, build_condition, merge_expr, unique_name};
use crate::connection::Connection;
use crate::db::Db;
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::expr::Operand;
use crate::hydrate::JoinEdge;
use crate::params::{ParamMap, PlaceholderAllocator};
use crate::scope::{render_column, resolve_scope, validate_ident};
use crate::value::Value;

/// A fully rendered statement with named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub kind: QueryKind,
    pub fetch: Fetch,
    pub sql: String,
    pub params: ParamMap,
    pub(crate) root: String,
    pub(crate) joins: Vec<JoinEdge>,
    pub(crate) tables: Vec<String>,
}

impl CompiledStatement {
    /// SQL with the driver's positional placeholders and the ordered values.
    pub fn to_positional(&self, dialect: Dialect) -> OrmResult<(String, Vec<Value>)> {
        dialect.to_positional(&self.sql, &self.params)
    }

    pub fn root_table(&self) -> &str {
        &self.root
    }
}

struct Compiler<'a, C> {
    db: &'a Db<C>,
    table: &'a str,
    dialect: Dialect,
    allocator: PlaceholderAllocator,
    params: ParamMap,
}

pub(crate) async fn compile<C: Connection>(
    db: &Db<C>,
    table: &str,
    state: &Statement,
) -> OrmResult<CompiledStatement> {
    if let Some(message) = &state.bad_join {
        return Err(OrmError::BadJoinSpec(message.clone()));
    }
    let kind = state.kind.ok_or(OrmError::UndefinedQueryKind)?;
    validate_ident("table", table)?;

    let mut compiler = Compiler {
        db,
        table,
        dialect: db.dialect(),
        allocator: PlaceholderAllocator::new(),
        params: ParamMap::new(),
    };

    let mut joins = Vec::new();
    let mut tables = vec![table.to_string()];
    let sql = match kind {
        QueryKind::Select | QueryKind::Count | QueryKind::Aggregate => {
            compiler.select(kind, state, &mut joins, &mut tables).await?
        }
        QueryKind::Insert => compiler.insert(state).await?,
        QueryKind::Update => compiler.update(state).await?,
        QueryKind::Delete => compiler.delete(state)?,
    };

    Ok(CompiledStatement {
        kind,
        fetch: state.fetch,
        sql,
        params: compiler.params,
        root: table.to_string(),
        joins,
        tables,
    })
}

impl<C: Connection> Compiler<'_, C> {
    fn q(&self, ident: &str) -> String {
        self.dialect.quote_ident(ident)
    }

    fn select_column(&self, table: &str, column: &str) -> String {
        format!(
            "{} AS {}",
            render_column(self.dialect, table, column),
            self.q(&format!("{table}_{column}"))
        )
    }

    /// `{table}.{column} AS {table}_{column}` for `columns`, or every column
    /// of `schema`, plus its primary key when `ensure_pk` is set.
    fn column_list(
        &self,
        schema: &TableSchema,
        columns: Option<&[String]>,
        ensure_pk: bool,
    ) -> OrmResult<Vec<String>> {
        let mut scopes = Vec::new();
        match columns {
            None => {
                for column in &schema.columns {
                    scopes.push(resolve_scope(&column.name, &schema.table)?);
                }
            }
            Some(columns) => {
                for column in columns {
                    scopes.push(resolve_scope(column, &schema.table)?);
                }
                if ensure_pk {
                    for pk in schema.primary_key() {
                        if !scopes.iter().any(|s| s.table == schema.table && s.column == *pk) {
                            scopes.push(resolve_scope(pk, &schema.table)?);
                        }
                    }
                }
            }
        }
        Ok(scopes
            .iter()
            .map(|s| self.select_column(&s.table, &s.column))
            .collect())
    }

    async fn select(
        &mut self,
        kind: QueryKind,
        state: &Statement,
        edges: &mut Vec<JoinEdge>,
        tables: &mut Vec<String>,
    ) -> OrmResult<String> {
        let root = self.db.table_schema(self.table).await?;

        let mut items = Vec::new();
        match kind {
            QueryKind::Count => items.push(format!("COUNT(*) AS {}", self.q("select_count"))),
            QueryKind::Aggregate => {
                for (func, column) in &state.aggregates {
                    let scope = resolve_scope(column, self.table)?;
                    items.push(format!(
                        "{}({}) AS {}",
                        func.as_sql(),
                        scope.render(self.dialect),
                        self.q(&format!("{}_{}", scope.table, scope.column))
                    ));
                }
                if items.is_empty() {
                    return Err(OrmError::validation("aggregate requires at least one column"));
                }
            }
            _ => items.extend(self.column_list(&root, state.columns.as_deref(), state.ensure_pk)?),
        }

        let mut join_clauses = Vec::with_capacity(state.joins.len());
        for join in &state.joins {
            let (clause, columns) = self.join(join, kind, state.ensure_pk).await?;
            join_clauses.push(clause);
            items.extend(columns);
            edges.push(JoinEdge {
                left: join.left.clone(),
                right: join.right.clone(),
            });
            if !tables.contains(&join.right) {
                tables.push(join.right.clone());
            }
        }

        for expr in &state.exprs {
            let sql = merge_expr(expr, &mut self.params, &self.allocator);
            match expr.get_alias() {
                Some(alias) => {
                    validate_ident("alias", alias)?;
                    items.push(format!("{sql} AS {}", self.q(alias)));
                }
                None => items.push(sql),
            }
        }

        let mut sql = format!("SELECT {} FROM {}", items.join(", "), self.q(self.table));
        for clause in join_clauses {
            sql.push(' ');
            sql.push_str(&clause);
        }
        self.push_where(&mut sql, state)?;
        self.push_order(&mut sql, state)?;
        if let Some((offset, count)) = state.limit {
            sql.push(' ');
            sql.push_str(&self.dialect.limit_clause(offset, count));
        }
        Ok(sql)
    }

    /// JOIN clause and, for plain selects, the joined table's select items.
    async fn join(
        &mut self,
        join: &JoinIntent,
        kind: QueryKind,
        ensure_pk: bool,
    ) -> OrmResult<(String, Vec<String>)> {
        validate_ident("table", &join.left).map_err(|e| OrmError::BadJoinSpec(e.to_string()))?;
        validate_ident("table", &join.right).map_err(|e| OrmError::BadJoinSpec(e.to_string()))?;

        let right = self.db.table_schema(&join.right).await?;
        let condition = match &join.condition {
            Some(condition) => {
                let (fragment, params) = build_condition(
                    condition,
                    LogicalOp::And,
                    &join.right,
                    self.dialect,
                    &self.allocator,
                )?;
                self.params.extend(params);
                fragment
            }
            None => {
                let left = self.db.table_schema(&join.left).await?;
                derive_join_condition(self.dialect, &left, &right)?
            }
        };

        let clause = format!(
            "{} {} ON ({condition})",
            join.kind.as_sql(),
            self.q(&join.right)
        );
        let columns = if kind == QueryKind::Select {
            self.column_list(&right, join.columns.as_deref(), ensure_pk)?
        } else {
            Vec::new()
        };
        Ok((clause, columns))
    }

    fn push_where(&mut self, sql: &mut String, state: &Statement) -> OrmResult<()> {
        for (i, w) in state.wheres.iter().enumerate() {
            let (fragment, params) =
                build_condition(&w.condition, w.inner, self.table, self.dialect, &self.allocator)?;
            self.params.extend(params);
            if i == 0 {
                sql.push_str(&format!(" WHERE ({fragment})"));
            } else {
                sql.push_str(&format!(" {} ({fragment})", w.outer.as_sql()));
            }
        }
        Ok(())
    }

    fn push_order(&self, sql: &mut String, state: &Statement) -> OrmResult<()> {
        let mut entries = Vec::with_capacity(state.order.len());
        for order in &state.order {
            match order {
                OrderIntent::Columns(columns, direction) => {
                    let rendered = columns
                        .iter()
                        .map(|c| resolve_scope(c, self.table).map(|s| s.render(self.dialect)))
                        .collect::<OrmResult<Vec<_>>>()?;
                    entries.push(format!("{} {}", rendered.join(", "), direction.as_sql()));
                }
                OrderIntent::Random => entries.push(self.dialect.random_function().to_string()),
            }
        }
        if !entries.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&entries.join(", "));
        }
        Ok(())
    }

    /// ORDER BY/LIMIT of UPDATE and DELETE, where the dialect supports them.
    fn push_write_order_limit(&self, sql: &mut String, state: &Statement) -> OrmResult<()> {
        if state.order.is_empty() && state.limit.is_none() {
            return Ok(());
        }
        if !self.dialect.supports_write_order_limit() {
            tracing::warn!(
                target: "quarry.sql",
                table = self.table,
                dialect = %self.dialect,
                "ORDER BY/LIMIT dropped from write statement"
            );
            return Ok(());
        }
        self.push_order(sql, state)?;
        if let Some((offset, count)) = state.limit {
            sql.push(' ');
            sql.push_str(&self.dialect.limit_clause(offset, count));
        }
        Ok(())
    }

    /// Coerced, unqualified write targets and their SQL right-hand sides.
    /// Values share one allocator id; columns the database assigns are left out.
    fn assignments(
        &mut self,
        schema: &TableSchema,
        state: &Statement,
        kind: WriteKind,
    ) -> OrmResult<Vec<(String, String)>> {
        let policy = self.db.null_policy();
        let id = self.allocator.next_id();
        let mut out = Vec::with_capacity(state.writes.len());

        for (column_ref, operand) in &state.writes {
            let scope = resolve_scope(column_ref, self.table)?;
            if scope.table != self.table {
                return Err(OrmError::validation(format!(
                    "cannot write column '{column_ref}' through table '{}'",
                    self.table
                )));
            }
            let info = schema.column(&scope.column).ok_or_else(|| {
                OrmError::schema(self.table, format!("unknown column '{}'", scope.column))
            })?;
            let rhs = match operand {
                Operand::Expr(expr) => merge_expr(expr, &mut self.params, &self.allocator),
                Operand::Value(value) => {
                    match coerce_value(value.clone(), self.table, info, kind, self.dialect, policy)? {
                        None => continue,
                        Some(Value::Null) => "NULL".to_string(),
                        Some(value) => {
                            let name = unique_name(&format!("{id}_{}", scope.column), &self.params);
                            self.params.insert(name.clone(), value);
                            format!(":{name}")
                        }
                    }
                }
            };
            out.push((scope.column, rhs));
        }
        Ok(out)
    }

    async fn insert(&mut self, state: &Statement) -> OrmResult<String> {
        let schema = self.db.table_schema(self.table).await?;
        let assignments = self.assignments(&schema, state, WriteKind::Insert)?;
        let table = self.q(self.table);
        if assignments.is_empty() {
            return Ok(match self.dialect {
                Dialect::Postgres => format!("INSERT INTO {table} DEFAULT VALUES"),
                Dialect::MySql => format!("INSERT INTO {table} () VALUES ()"),
            });
        }
        let columns: Vec<String> = assignments.iter().map(|(c, _)| self.q(c)).collect();
        let values: Vec<&str> = assignments.iter().map(|(_, v)| v.as_str()).collect();
        Ok(format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            values.join(", ")
        ))
    }

    async fn update(&mut self, state: &Statement) -> OrmResult<String> {
        let schema = self.db.table_schema(self.table).await?;
        let assignments = self.assignments(&schema, state, WriteKind::Update)?;
        if assignments.is_empty() {
            return Err(OrmError::validation("update requires at least one column"));
        }
        let set: Vec<String> = assignments
            .iter()
            .map(|(column, rhs)| format!("{} = {rhs}", self.q(column)))
            .collect();
        let mut sql = format!("UPDATE {} SET {}", self.q(self.table), set.join(", "));
        self.push_where(&mut sql, state)?;
        self.push_write_order_limit(&mut sql, state)?;
        Ok(sql)
    }

    fn delete(&mut self, state: &Statement) -> OrmResult<String> {
        let mut sql = format!("DELETE FROM {}", self.q(self.table));
        if state.wheres.is_empty() {
            tracing::warn!(target: "quarry.sql", table = self.table, "DELETE without WHERE");
        }
        self.push_where(&mut sql, state)?;
        self.push_write_order_limit(&mut sql, state)?;
        Ok(sql)
    }
}

/// Join condition used when none is given.
///
/// Many-to-one first: `B.pk = A.{B}_{pk}` when `A` carries a foreign key
/// column for every primary-key column of `B`. Otherwise one-to-many:
/// `B.{A}_{pk} = A.pk`.
fn derive_join_condition(
    dialect: Dialect,
    left: &TableSchema,
    right: &TableSchema,
) -> OrmResult<String> {
    let linked = |from: &TableSchema, to: &TableSchema| {
        !to.primary_key().is_empty()
            && to
                .primary_key()
                .iter()
                .all(|pk| from.has_column(&format!("{}_{}", to.table, pk)))
    };

    let pairs: Vec<String> = if linked(left, right) {
        right
            .primary_key()
            .iter()
            .map(|pk| {
                format!(
                    "{} = {}",
                    render_column(dialect, &right.table, pk),
                    render_column(dialect, &left.table, &format!("{}_{}", right.table, pk))
                )
            })
            .collect()
    } else if linked(right, left) {
        left.primary_key()
            .iter()
            .map(|pk| {
                format!(
                    "{} = {}",
                    render_column(dialect, &right.table, &format!("{}_{}", left.table, pk)),
                    render_column(dialect, &left.table, pk)
                )
            })
            .collect()
    } else {
        return Err(OrmError::BadJoinSpec(format!(
            "cannot derive a join condition between '{}' and '{}': no '{}_<pk>' or '{}_<pk>' columns",
            left.table, right.table, right.table, left.table
        )));
    };
    Ok(pairs.join(" AND "))
}
