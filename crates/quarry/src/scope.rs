//! Column scope resolution and identifier rendering.
//!
//! A column reference is either bare (`name`) or table-qualified
//! (`users.name`). Bare references take the table of the builder that owns
//! them. Identifiers are validated against `[A-Za-z_][A-Za-z0-9_$]*` before
//! they are quoted into SQL; values never are.

use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};

/// An unambiguous (table, column) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub table: String,
    pub column: String,
}

impl Scope {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// `{table}_{column}`: the select alias and base placeholder name.
    pub fn alias(&self) -> String {
        format!("{}_{}", self.table, self.column)
    }

    pub fn render(&self, dialect: Dialect) -> String {
        render_column(dialect, &self.table, &self.column)
    }
}

pub(crate) fn is_valid_ident(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c == '$' || c.is_ascii_alphanumeric())
}

pub(crate) fn validate_ident(kind: &str, name: &str) -> OrmResult<()> {
    if is_valid_ident(name) {
        Ok(())
    } else {
        Err(OrmError::validation(format!("invalid {kind} identifier '{name}'")))
    }
}

/// Split `table.column` or apply `default_table` to a bare column.
pub fn resolve_scope(column_ref: &str, default_table: &str) -> OrmResult<Scope> {
    let column_ref = column_ref.trim();
    let scope = match column_ref.split('.').collect::<Vec<_>>().as_slice() {
        [column] => Scope::new(default_table, *column),
        [table, column] => Scope::new(*table, *column),
        _ => {
            return Err(OrmError::validation(format!(
                "column reference '{column_ref}' has more than two parts"
            )));
        }
    };
    validate_ident("table", &scope.table)?;
    validate_ident("column", &scope.column)?;
    Ok(scope)
}

/// Quoted `table.column`.
pub fn render_column(dialect: Dialect, table: &str, column: &str) -> String {
    format!("{}.{}", dialect.quote_ident(table), dialect.quote_ident(column))
}

fn is_word_start(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphabetic()
}

fn is_word_char(b: u8) -> bool {
    b == b'_' || b == b'$' || b.is_ascii_alphanumeric()
}

/// Quote every `table.column` token of a trusted raw fragment.
///
/// String literals, quoted identifiers, `:placeholders` and numeric literals
/// such as `1.5` are copied through untouched, as are `a.b.c` chains.
pub fn rewrite_scoped_columns(dialect: Dialect, sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut i = 0;

    let word_end = |mut j: usize| {
        while j < bytes.len() && is_word_char(bytes[j]) {
            j += 1;
        }
        j
    };

    while i < bytes.len() {
        let b = bytes[i];
        let start = i;
        match b {
            b'\'' | b'"' | b'`' => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b {
                        if bytes.get(i + 1) == Some(&b) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
                out.push_str(&sql[start..i]);
            }
            b':' => {
                i += 1;
                while i < bytes.len() && (bytes[i] == b':' || is_word_char(bytes[i])) {
                    i += 1;
                }
                out.push_str(&sql[start..i]);
            }
            b'0'..=b'9' => {
                while i < bytes.len() && (bytes[i] == b'.' || is_word_char(bytes[i])) {
                    i += 1;
                }
                out.push_str(&sql[start..i]);
            }
            _ if is_word_start(b) => {
                let first_end = word_end(i);
                let has_second = bytes.get(first_end) == Some(&b'.')
                    && bytes.get(first_end + 1).copied().is_some_and(is_word_start);
                if !has_second {
                    i = first_end;
                    out.push_str(&sql[start..i]);
                    continue;
                }
                let second_end = word_end(first_end + 1);
                if bytes.get(second_end) == Some(&b'.') {
                    // a.b.c: leave the whole chain alone
                    i = second_end;
                    while i < bytes.len() && (bytes[i] == b'.' || is_word_char(bytes[i])) {
                        i += 1;
                    }
                    out.push_str(&sql[start..i]);
                    continue;
                }
                out.push_str(&render_column(
                    dialect,
                    &sql[start..first_end],
                    &sql[first_end + 1..second_end],
                ));
                i = second_end;
            }
            _ => {
                let ch_len = sql[i..].chars().next().map_or(1, char::len_utf8);
                i += ch_len;
                out.push_str(&sql[start..i]);
            }
        }
    }
    out
}
