//! SQL dialect differences.

use crate::error::{OrmError, OrmResult};
use crate::params::{ParamMap, rewrite_placeholders};
use crate::value::Value;
use std::fmt;

/// Target database flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    MySql,
    Postgres,
}

impl Dialect {
    fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Postgres => '"',
        }
    }

    /// Quote a single identifier, doubling any embedded quote character.
    pub fn quote_ident(self, name: &str) -> String {
        let q = self.quote_char();
        let mut out = String::with_capacity(name.len() + 2);
        out.push(q);
        for ch in name.chars() {
            if ch == q {
                out.push(q);
            }
            out.push(ch);
        }
        out.push(q);
        out
    }

    /// `LIMIT` clause. Without a count, `offset` is used as the row count.
    pub fn limit_clause(self, offset: u64, count: Option<u64>) -> String {
        match (self, count) {
            (_, None) => format!("LIMIT {offset}"),
            (Dialect::MySql, Some(count)) => format!("LIMIT {offset}, {count}"),
            (Dialect::Postgres, Some(count)) => format!("LIMIT {count} OFFSET {offset}"),
        }
    }

    pub fn random_function(self) -> &'static str {
        match self {
            Dialect::MySql => "RAND()",
            Dialect::Postgres => "RANDOM()",
        }
    }

    /// Whether `UPDATE`/`DELETE` accept `ORDER BY` and `LIMIT`.
    pub fn supports_write_order_limit(self) -> bool {
        matches!(self, Dialect::MySql)
    }

    /// Literal stored for NULL writes to a NOT NULL date column.
    pub fn zero_date(self) -> &'static str {
        match self {
            Dialect::MySql => "0000-00-00",
            Dialect::Postgres => "1970-01-01",
        }
    }

    pub fn zero_datetime(self) -> &'static str {
        match self {
            Dialect::MySql => "0000-00-00 00:00:00",
            Dialect::Postgres => "1970-01-01 00:00:00",
        }
    }

    /// Convert named placeholders into the positional style of the driver
    /// (`?` for MySQL, `$n` for PostgreSQL) and order the values to match.
    ///
    /// A name used more than once binds the same `$n` on PostgreSQL and
    /// repeats the value on MySQL.
    pub fn to_positional(self, sql: &str, params: &ParamMap) -> OrmResult<(String, Vec<Value>)> {
        let mut values: Vec<Value> = Vec::with_capacity(params.len());
        let mut order: Vec<String> = Vec::new();
        let mut missing: Option<String> = None;

        let positional = rewrite_placeholders(sql, |name| {
            let Some(value) = params.get(name) else {
                missing.get_or_insert_with(|| name.to_string());
                return None;
            };
            match self {
                Dialect::MySql => {
                    values.push(value.clone());
                    Some("?".to_string())
                }
                Dialect::Postgres => {
                    let idx = match order.iter().position(|n| n == name) {
                        Some(idx) => idx,
                        None => {
                            order.push(name.to_string());
                            values.push(value.clone());
                            order.len() - 1
                        }
                    };
                    Some(format!("${}", idx + 1))
                }
            }
        });

        match missing {
            Some(name) => Err(OrmError::validation(format!(
                "no value bound for placeholder :{name}"
            ))),
            None => Ok((positional, values)),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_per_dialect() {
        assert_eq!(Dialect::MySql.quote_ident("users"), "`users`");
        assert_eq!(Dialect::Postgres.quote_ident("users"), "\"users\"");
        assert_eq!(Dialect::Postgres.quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn limit_without_count_uses_offset_as_count() {
        assert_eq!(Dialect::MySql.limit_clause(5, None), "LIMIT 5");
        assert_eq!(Dialect::MySql.limit_clause(10, Some(5)), "LIMIT 10, 5");
        assert_eq!(Dialect::Postgres.limit_clause(10, Some(5)), "LIMIT 5 OFFSET 10");
    }

    #[test]
    fn positional_conversion_reuses_indexes_on_postgres() {
        let params = ParamMap::new().with("a", 1).with("b", "x");
        let (sql, values) = Dialect::Postgres
            .to_positional("x = :a OR y = :b OR z = :a", &params)
            .unwrap();
        assert_eq!(sql, "x = $1 OR y = $2 OR z = $1");
        assert_eq!(values, vec![Value::Int(1), Value::Text("x".into())]);

        let (sql, values) = Dialect::MySql
            .to_positional("x = :a OR y = :b OR z = :a", &params)
            .unwrap();
        assert_eq!(sql, "x = ? OR y = ? OR z = ?");
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn unbound_placeholder_is_an_error() {
        let err = Dialect::MySql
            .to_positional("x = :missing", &ParamMap::new())
            .unwrap_err();
        assert!(matches!(err, OrmError::Validation(_)));
    }
}
