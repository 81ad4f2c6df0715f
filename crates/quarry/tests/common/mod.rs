#![allow(dead_code)]

use quarry::{
    ColumnInfo, Connection, Db, Dialect, OrmResult, ResultRow, TableSchema, Value,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// In-memory connection: replays queued result sets and logs every statement.
pub struct Scripted {
    dialect: Dialect,
    replies: Mutex<VecDeque<Vec<ResultRow>>>,
    affected: Mutex<VecDeque<u64>>,
    log: Mutex<Vec<(String, Vec<Value>)>>,
}

impl Scripted {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            replies: Mutex::new(VecDeque::new()),
            affected: Mutex::new(VecDeque::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Queue the rows returned by the next `query`.
    pub fn reply(&self, rows: Vec<ResultRow>) {
        self.replies.lock().unwrap().push_back(rows);
    }

    /// Queue the row count returned by the next `execute` (default 1).
    pub fn affect(&self, rows: u64) {
        self.affected.lock().unwrap().push_back(rows);
    }

    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.log.lock().unwrap().clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements().into_iter().map(|(sql, _)| sql).collect()
    }

    pub fn last(&self) -> (String, Vec<Value>) {
        self.statements().pop().expect("a statement ran")
    }
}

impl Connection for Scripted {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<ResultRow>> {
        self.log.lock().unwrap().push((sql.to_string(), params.to_vec()));
        Ok(self.replies.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        self.log.lock().unwrap().push((sql.to_string(), params.to_vec()));
        Ok(self.affected.lock().unwrap().pop_front().unwrap_or(1))
    }
}

/// `Users(id PK auto, name NOT NULL, status NULL, created_at NOT NULL DEFAULT now)`.
pub fn users() -> TableSchema {
    TableSchema::new(
        "Users",
        vec![
            ColumnInfo::new("id", "int(11)").primary_key().auto_increment(),
            ColumnInfo::new("name", "varchar(50)").not_null(),
            ColumnInfo::new("status", "varchar(20)"),
            ColumnInfo::new("created_at", "timestamp")
                .not_null()
                .default_value("CURRENT_TIMESTAMP"),
        ],
    )
}

/// `Orders(id PK auto, Users_id NOT NULL, total NULL)`.
pub fn orders() -> TableSchema {
    TableSchema::new(
        "Orders",
        vec![
            ColumnInfo::new("id", "int(11)").primary_key().auto_increment(),
            ColumnInfo::new("Users_id", "int(11)").not_null(),
            ColumnInfo::new("total", "decimal(10,2)"),
        ],
    )
}

/// `Tasks(id PK auto, title NOT NULL, status NULL DEFAULT 'pending', kind NOT NULL DEFAULT 'x')`.
pub fn tasks() -> TableSchema {
    TableSchema::new(
        "Tasks",
        vec![
            ColumnInfo::new("id", "int(11)").primary_key().auto_increment(),
            ColumnInfo::new("title", "varchar(50)").not_null(),
            ColumnInfo::new("status", "varchar(20)").default_value("pending"),
            ColumnInfo::new("kind", "varchar(20)")
                .not_null()
                .default_value("x"),
        ],
    )
}

pub fn db(dialect: Dialect) -> Db<Scripted> {
    let db = Db::new(Scripted::new(dialect));
    for schema in [users(), orders(), tasks()] {
        db.schema_catalog().insert(Arc::new(schema));
    }
    db
}

/// One result row as returned for `SELECT` on the `Users` table.
pub fn user_row(id: i64, name: &str, status: Option<&str>) -> ResultRow {
    ResultRow::from_pairs([
        ("Users_id", Value::Int(id)),
        ("Users_name", Value::from(name)),
        ("Users_status", status.map_or(Value::Null, Value::from)),
        (
            "Users_created_at",
            Value::Text("2024-05-01 10:00:00".to_string()),
        ),
    ])
}

pub fn order_row(id: i64, user_id: i64, total: f64) -> ResultRow {
    ResultRow::from_pairs([
        ("Orders_id", Value::Int(id)),
        ("Orders_Users_id", Value::Int(user_id)),
        ("Orders_total", Value::Float(total)),
    ])
}
