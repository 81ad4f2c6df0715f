//! Boolean conditions for WHERE and JOIN clauses.

use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::expr::{Operand, SqlExpr};
use crate::params::{ParamMap, PlaceholderAllocator};
use crate::scope::{resolve_scope, rewrite_scoped_columns};
use crate::value::Value;

/// Operator joining the pairs of a map condition, or joining a WHERE
/// fragment to the fragments before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogicalOp {
    #[default]
    And,
    Or,
}

impl LogicalOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            LogicalOp::And => "AND",
            LogicalOp::Or => "OR",
        }
    }
}

/// A condition: column/value pairs or a trusted raw fragment.
///
/// ```ignore
/// use quarry::{cond, Condition};
///
/// let by_status = cond! { "status" => "active", "deleted_at" => None::<i64> };
/// let raw = Condition::raw("users.age > :age").bind("age", 18);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = value` pairs; `Null` renders as `IS NULL`.
    Map(Vec<(String, Operand)>),
    /// Raw SQL with named parameters. Never built from untrusted input.
    Raw { sql: String, params: ParamMap },
}

impl Condition {
    pub fn map<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Operand>,
    {
        Condition::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Single `column = value` condition.
    pub fn eq(column: impl Into<String>, value: impl Into<Operand>) -> Self {
        Condition::Map(vec![(column.into(), value.into())])
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Condition::Raw {
            sql: sql.into(),
            params: ParamMap::new(),
        }
    }

    pub fn raw_with(sql: impl Into<String>, params: ParamMap) -> Self {
        Condition::Raw {
            sql: sql.into(),
            params,
        }
    }

    /// Bind a parameter of a raw condition. Map conditions carry their
    /// values inline, so this is ignored for them.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Condition::Raw { params, .. } = &mut self {
            params.insert(name, value);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Condition::Map(pairs) => pairs.is_empty(),
            Condition::Raw { sql, .. } => sql.trim().is_empty(),
        }
    }
}

impl From<&str> for Condition {
    fn from(sql: &str) -> Self {
        Condition::raw(sql)
    }
}

impl From<String> for Condition {
    fn from(sql: String) -> Self {
        Condition::raw(sql)
    }
}

impl<K: Into<String>, V: Into<Operand>> From<Vec<(K, V)>> for Condition {
    fn from(pairs: Vec<(K, V)>) -> Self {
        Condition::map(pairs)
    }
}

impl<K: Into<String>, V: Into<Operand>, const N: usize> From<[(K, V); N]> for Condition {
    fn from(pairs: [(K, V); N]) -> Self {
        Condition::map(pairs)
    }
}

/// Build a map [`Condition`] from heterogeneous `column => value` pairs.
#[macro_export]
macro_rules! cond {
    ($($column:expr => $value:expr),* $(,)?) => {
        $crate::Condition::Map(vec![
            $((::std::string::String::from($column), $crate::Operand::from($value))),*
        ])
    };
}

/// First free name among `base`, `base_2`, `base_3`, ...
pub(crate) fn unique_name(base: &str, taken: &ParamMap) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}_{n}"))
        .find(|name| !taken.contains(name))
        .unwrap_or_else(|| base.to_string())
}

/// Merge a [`SqlExpr`] into `params`, returning its namespaced SQL.
pub(crate) fn merge_expr(
    expr: &SqlExpr,
    params: &mut ParamMap,
    allocator: &PlaceholderAllocator,
) -> String {
    let (sql, expr_params) = allocator.namespace(&expr.sql, expr.params.clone());
    params.extend(expr_params);
    sql
}

/// Render `condition` as a parameterized boolean fragment.
///
/// Map pairs are joined with `join_op`; bare columns are scoped to
/// `default_table`. The whole fragment is namespaced with one allocator id.
pub fn build_condition(
    condition: &Condition,
    join_op: LogicalOp,
    default_table: &str,
    dialect: Dialect,
    allocator: &PlaceholderAllocator,
) -> OrmResult<(String, ParamMap)> {
    if condition.is_empty() {
        return Err(OrmError::validation("empty condition"));
    }

    match condition {
        Condition::Raw { sql, params } => {
            let sql = rewrite_scoped_columns(dialect, sql);
            Ok(allocator.namespace(&sql, params.clone()))
        }
        Condition::Map(pairs) => {
            let mut params = ParamMap::new();
            let mut parts = Vec::with_capacity(pairs.len());
            for (column_ref, operand) in pairs {
                let scope = resolve_scope(column_ref, default_table)?;
                let column = scope.render(dialect);
                match operand {
                    Operand::Value(Value::Null) => parts.push(format!("{column} IS NULL")),
                    Operand::Expr(expr) => {
                        let sql = merge_expr(expr, &mut params, allocator);
                        parts.push(format!("{column} = {sql}"));
                    }
                    Operand::Value(value) => {
                        let name = unique_name(&scope.alias(), &params);
                        parts.push(format!("{column} = :{name}"));
                        params.insert(name, value.clone());
                    }
                }
            }
            let joined = parts.join(&format!(" {} ", join_op.as_sql()));
            Ok(allocator.namespace(&joined, params))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::placeholder_names;

    #[test]
    fn null_values_render_is_null_without_params() {
        let alloc = PlaceholderAllocator::new();
        let (sql, params) = build_condition(
            &cond! { "deleted_at" => Value::Null },
            LogicalOp::And,
            "users",
            Dialect::MySql,
            &alloc,
        )
        .unwrap();
        assert_eq!(sql, "`users`.`deleted_at` IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn same_column_in_two_tables_does_not_collide() {
        let alloc = PlaceholderAllocator::new();
        let (sql, params) = build_condition(
            &cond! { "id" => 1, "Other.id" => 2 },
            LogicalOp::Or,
            "users",
            Dialect::MySql,
            &alloc,
        )
        .unwrap();
        assert_eq!(
            sql,
            "`users`.`id` = :1_users_id OR `Other`.`id` = :1_Other_id"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn repeated_column_gets_suffixed_name() {
        let alloc = PlaceholderAllocator::new();
        let (sql, params) = build_condition(
            &cond! { "id" => 1, "users.id" => 2 },
            LogicalOp::Or,
            "users",
            Dialect::Postgres,
            &alloc,
        )
        .unwrap();
        assert_eq!(
            sql,
            "\"users\".\"id\" = :1_users_id OR \"users\".\"id\" = :1_users_id_2"
        );
        assert_eq!(params.get("1_users_id_2"), Some(&Value::Int(2)));
    }

    #[test]
    fn expressions_are_inlined_with_their_params() {
        let alloc = PlaceholderAllocator::new();
        let expr = SqlExpr::new("NOW() - :age").bind("age", 3);
        let (sql, params) = build_condition(
            &cond! { "seen" => expr },
            LogicalOp::And,
            "users",
            Dialect::MySql,
            &alloc,
        )
        .unwrap();
        assert_eq!(sql, "`users`.`seen` = NOW() - :2_1_age");
        assert_eq!(params.get("2_1_age"), Some(&Value::Int(3)));
    }

    #[test]
    fn raw_conditions_are_scoped_and_namespaced() {
        let alloc = PlaceholderAllocator::new();
        let (sql, params) = build_condition(
            &Condition::raw("users.age > :age OR :age IS NULL").bind("age", 18),
            LogicalOp::And,
            "users",
            Dialect::MySql,
            &alloc,
        )
        .unwrap();
        assert_eq!(sql, "`users`.`age` > :1_age OR :1_age IS NULL");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn independently_built_fragments_have_disjoint_placeholders() {
        let alloc = PlaceholderAllocator::new();
        let c = cond! { "id" => 1, "name" => "x" };
        let (a, _) = build_condition(&c, LogicalOp::And, "t", Dialect::MySql, &alloc).unwrap();
        let (b, _) = build_condition(&c, LogicalOp::And, "t", Dialect::MySql, &alloc).unwrap();
        let a = placeholder_names(&a);
        let b = placeholder_names(&b);
        assert!(a.iter().all(|n| !b.contains(n)));
    }

    #[test]
    fn empty_condition_is_rejected() {
        let alloc = PlaceholderAllocator::new();
        let err = build_condition(
            &Condition::Map(Vec::new()),
            LogicalOp::And,
            "t",
            Dialect::MySql,
            &alloc,
        )
        .unwrap_err();
        assert!(matches!(err, OrmError::Validation(_)));
    }
}
