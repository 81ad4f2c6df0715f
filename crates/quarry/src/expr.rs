//! Pre-formed SQL fragments.

use crate::params::ParamMap;
use crate::value::Value;

/// An opaque SQL fragment used verbatim where a value would otherwise be bound.
///
/// ```ignore
/// use quarry::SqlExpr;
///
/// // `updated_at = NOW()` instead of a bound parameter
/// let now = SqlExpr::new("NOW()");
/// // `score = score + :step` with its own parameter
/// let bump = SqlExpr::new("score + :step").bind("step", 5);
/// ```
///
/// Placeholders inside the fragment are namespaced when it is merged into a
/// statement, so the same expression can be reused across fragments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlExpr {
    pub(crate) sql: String,
    pub(crate) params: ParamMap,
    pub(crate) alias: Option<String>,
}

impl SqlExpr {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: ParamMap::new(),
            alias: None,
        }
    }

    /// Bind a named parameter referenced as `:name` in the fragment.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn with_params(mut self, params: ParamMap) -> Self {
        self.params.extend(params);
        self
    }

    /// Alias used when the expression appears in a select list.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &ParamMap {
        &self.params
    }

    pub fn get_alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
}

/// Right-hand side of a condition or assignment: a bound value or a raw fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Expr(SqlExpr),
}

impl Operand {
    pub fn is_null(&self) -> bool {
        matches!(self, Operand::Value(Value::Null))
    }
}

impl From<SqlExpr> for Operand {
    fn from(expr: SqlExpr) -> Self {
        Operand::Expr(expr)
    }
}

impl<T: Into<Value>> From<T> for Operand {
    fn from(value: T) -> Self {
        Operand::Value(value.into())
    }
}
