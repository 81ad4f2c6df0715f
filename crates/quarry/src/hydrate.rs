//! Flat result rows to nested records.
//!
//! Selected columns are aliased `{table}_{column}`. A row is split back into
//! per-table buckets by alias prefix and every join whose left side is the
//! current table is nested under a field named after the joined table.

use crate::connection::ResultRow;
use crate::error::{OrmError, OrmResult};
use crate::value::{FromValue, Value};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

/// Field of an [`AnonymousRecord`]: a column value or a joined record.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Value(Value),
    Nested(AnonymousRecord),
}

/// Untyped record produced by `select*` queries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnonymousRecord {
    fields: Vec<(String, Field)>,
}

impl AnonymousRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// Column value, `None` if absent or if `name` is a nested record.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.get(name) {
            Some(Field::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn nested(&self, name: &str) -> Option<&AnonymousRecord> {
        match self.get(name) {
            Some(Field::Nested(r)) => Some(r),
            _ => None,
        }
    }

    /// Typed column value. A missing column decodes as NULL.
    pub fn get_as<T: FromValue>(&self, name: &str) -> OrmResult<T> {
        let value = self.value(name).unwrap_or(&Value::Null);
        T::from_value(value).map_err(|message| OrmError::decode(name, message))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.set(name.into(), Field::Value(value.into()));
    }

    pub fn set_nested(&mut self, name: impl Into<String>, record: AnonymousRecord) {
        self.set(name.into(), Field::Nested(record));
    }

    fn set(&mut self, name: String, field: Field) {
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = field,
            None => self.fields.push((name, field)),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// Plain column values, skipping nested records.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().filter_map(|(n, f)| match f {
            Field::Value(v) => Some((n.as_str(), v)),
            Field::Nested(_) => None,
        })
    }

    /// Convert into JSON, nesting joined records as objects.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Value(v) => v.serialize(serializer),
            Field::Nested(r) => r.serialize(serializer),
        }
    }
}

impl Serialize for AnonymousRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, field) in &self.fields {
            map.serialize_entry(name, field)?;
        }
        map.end()
    }
}

/// A join edge as seen by the hydrator: `right` is nested inside `left`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEdge {
    pub left: String,
    pub right: String,
}

/// Longest table whose `{table}_` prefix starts `key`.
fn owning_table<'t>(key: &str, tables: &'t [String]) -> Option<&'t str> {
    tables
        .iter()
        .filter(|t| {
            key.len() > t.len() + 1 && key.starts_with(t.as_str()) && key.as_bytes()[t.len()] == b'_'
        })
        .max_by_key(|t| t.len())
        .map(String::as_str)
}

/// Split `row` into per-table records and nest joins under `root`.
///
/// Keys without a table prefix (aggregates, aliased expressions) stay on the
/// root record unchanged. A joined side whose columns are all NULL hydrates as
/// an empty record, never a missing field.
///
/// An outer-join match whose selected columns all happen to be NULL looks the
/// same as a miss and also hydrates empty. Select the joined table's primary
/// key to tell the two apart.
pub fn hydrate(row: ResultRow, root: &str, joins: &[JoinEdge], tables: &[String]) -> AnonymousRecord {
    let mut buckets: HashMap<&str, AnonymousRecord> = HashMap::new();
    let mut root_extra = AnonymousRecord::new();

    for (key, value) in row {
        match owning_table(&key, tables) {
            Some(table) => buckets
                .entry(table)
                .or_default()
                .set_value(&key[table.len() + 1..], value),
            None => root_extra.set_value(key, value),
        }
    }

    let mut visited = vec![root.to_string()];
    let mut record = nest(root, &mut buckets, joins, &mut visited);
    for (name, value) in root_extra.values() {
        record.set_value(name, value.clone());
    }
    record
}

fn nest(
    table: &str,
    buckets: &mut HashMap<&str, AnonymousRecord>,
    joins: &[JoinEdge],
    visited: &mut Vec<String>,
) -> AnonymousRecord {
    let mut record = buckets.remove(table).unwrap_or_default();
    for join in joins.iter().filter(|j| j.left == table) {
        if visited.contains(&join.right) {
            continue;
        }
        visited.push(join.right.clone());
        let child = nest(&join.right, buckets, joins, visited);
        let missing = child.values().all(|(_, v)| v.is_null());
        record.set_nested(
            join.right.clone(),
            if missing { AnonymousRecord::new() } else { child },
        );
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(left: &str, right: &str) -> JoinEdge {
        JoinEdge {
            left: left.into(),
            right: right.into(),
        }
    }

    #[test]
    fn splits_by_longest_table_prefix() {
        let row = ResultRow::from_pairs([
            ("user_id", Value::Int(1)),
            ("user_role_id", Value::Int(7)),
            ("user_role_name", Value::from("admin")),
        ]);
        let tables = vec!["user".to_string(), "user_role".to_string()];
        let record = hydrate(row, "user", &[edge("user", "user_role")], &tables);
        assert_eq!(record.value("id"), Some(&Value::Int(1)));
        let role = record.nested("user_role").unwrap();
        assert_eq!(role.value("id"), Some(&Value::Int(7)));
        assert_eq!(role.value("name"), Some(&Value::from("admin")));
    }

    #[test]
    fn outer_join_miss_is_an_empty_record() {
        let row = ResultRow::from_pairs([
            ("Users_id", Value::Int(5)),
            ("Orders_id", Value::Null),
            ("Orders_total", Value::Null),
        ]);
        let tables = vec!["Users".to_string(), "Orders".to_string()];
        let record = hydrate(row, "Users", &[edge("Users", "Orders")], &tables);
        let orders = record.nested("Orders").expect("nested key present");
        assert!(orders.is_empty());
    }

    #[test]
    fn selected_primary_key_separates_a_null_match_from_a_miss() {
        let tables = vec!["Users".to_string(), "Orders".to_string()];
        let joins = [edge("Users", "Orders")];

        let without_key = ResultRow::from_pairs([("Users_id", Value::Int(5)), ("Orders_total", Value::Null)]);
        let record = hydrate(without_key, "Users", &joins, &tables);
        assert!(record.nested("Orders").unwrap().is_empty());

        let with_key = ResultRow::from_pairs([
            ("Users_id", Value::Int(5)),
            ("Orders_id", Value::Int(9)),
            ("Orders_total", Value::Null),
        ]);
        let record = hydrate(with_key, "Users", &joins, &tables);
        let orders = record.nested("Orders").unwrap();
        assert_eq!(orders.value("id"), Some(&Value::Int(9)));
        assert_eq!(orders.value("total"), Some(&Value::Null));
    }

    #[test]
    fn nests_chained_joins_recursively() {
        let row = ResultRow::from_pairs([
            ("a_id", Value::Int(1)),
            ("b_id", Value::Int(2)),
            ("c_id", Value::Int(3)),
        ]);
        let tables = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let record = hydrate(row, "a", &[edge("a", "b"), edge("b", "c")], &tables);
        let c = record.nested("b").and_then(|b| b.nested("c")).unwrap();
        assert_eq!(c.value("id"), Some(&Value::Int(3)));
    }

    #[test]
    fn unprefixed_keys_stay_on_root() {
        let row = ResultRow::from_pairs([("select_count", Value::Int(4))]);
        let record = hydrate(row, "users", &[], &["users".to_string()]);
        assert_eq!(record.get_as::<i64>("select_count").unwrap(), 4);
    }

    #[test]
    fn serializes_as_nested_json() {
        let row = ResultRow::from_pairs([("u_id", Value::Int(1)), ("o_id", Value::Null)]);
        let tables = vec!["u".to_string(), "o".to_string()];
        let record = hydrate(row, "u", &[edge("u", "o")], &tables);
        assert_eq!(record.to_json(), serde_json::json!({"id": 1, "o": {}}));
    }
}
