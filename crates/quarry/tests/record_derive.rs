//! Derived records against a scripted connection.

mod common;

use chrono::NaiveDateTime;
use common::{db, order_row, user_row};
use quarry::prelude::*;
use quarry::{Dialect, ResultRow, registry};

#[derive(Debug, Default, Record)]
#[orm(table = "Users", validate = "User::check")]
struct User {
    #[orm(id)]
    id: Option<i64>,
    name: String,
    status: Option<String>,
    created_at: Option<NaiveDateTime>,
    #[orm(join)]
    orders: Option<Order>,
    state: RecordState,
}

impl User {
    fn check(&self) -> Result<(), String> {
        if self.name.is_empty() {
            Err("name is required".to_string())
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Default, Record)]
#[orm(table = "Orders")]
struct Order {
    #[orm(id)]
    id: Option<i64>,
    #[orm(column = "Users_id")]
    user_id: Option<i64>,
    total: Option<f64>,
    #[orm(state)]
    state: RecordState,
}

fn persisted_user(id: i64, name: &str) -> User {
    let mut user = User {
        id: Some(id),
        name: name.to_string(),
        ..Default::default()
    };
    user.state_mut().mark_persisted();
    user
}

#[test]
fn derive_exposes_table_mapping() {
    assert_eq!(User::TABLE, "Users");
    assert_eq!(User::CONNECTION, "default");
    assert_eq!(User::columns(), ["id", "name", "status", "created_at"]);
    assert_eq!(User::primary_key(), ["id"]);
    assert_eq!(Order::columns(), ["id", "Users_id", "total"]);

    let reg = registry::lookup::<Order>().expect("derived records are registered");
    assert_eq!(reg.table, "Orders");
    assert_eq!(reg.type_name, "Order");
    assert!(registry::tables_for_connection("default").contains(&"Users"));
}

#[test]
fn field_mapping_round_trips_through_values() {
    let mut order = Order::default();
    assert!(order.set_value("Users_id", &Value::Int(4)).unwrap());
    assert!(order.set_value("total", &Value::Text("12.50".into())).unwrap());
    assert!(!order.set_value("user_id", &Value::Int(1)).unwrap());
    assert_eq!(order.user_id, Some(4));
    assert_eq!(order.total, Some(12.5));
    assert_eq!(order.get_value("Users_id"), Some(Value::Int(4)));
    assert_eq!(order.get_value("nope"), None);

    let err = order.set_value("Users_id", &Value::Text("four".into())).unwrap_err();
    assert!(matches!(err, OrmError::Decode { ref column, .. } if column == "Users_id"));
}

#[tokio::test]
async fn save_inserts_then_reloads_the_last_row() {
    let db = db(Dialect::Postgres);
    db.conn().reply(vec![user_row(7, "Ana", None)]);

    let mut user = User {
        name: "Ana".into(),
        ..Default::default()
    };
    assert!(user.is_new());
    assert!(user.save(&db).await.unwrap());

    assert!(!user.is_new());
    assert_eq!(user.id, Some(7));
    assert!(user.created_at.is_some());

    let sql = db.conn().sql();
    assert_eq!(sql.len(), 2);
    assert!(sql[0].starts_with("INSERT INTO \"Users\""));
    assert!(!sql[0].contains("\"created_at\""));
    assert!(sql[1].ends_with("ORDER BY \"Users\".\"id\" DESC LIMIT 1"));
}

#[tokio::test]
async fn save_reports_a_row_that_was_not_inserted() {
    let db = db(Dialect::Postgres);
    db.conn().affect(0);

    let mut user = User {
        name: "Ana".into(),
        ..Default::default()
    };
    assert!(!user.save(&db).await.unwrap());
    assert!(user.is_new());
    assert_eq!(user.state().error(), Some("The new record was not inserted."));
}

#[tokio::test]
async fn save_updates_persisted_records_by_primary_key() {
    let db = db(Dialect::MySql);
    db.conn().reply(vec![user_row(3, "Bea", Some("active"))]);

    let mut user = persisted_user(3, "Bea");
    user.status = Some("active".into());
    assert!(user.save(&db).await.unwrap());

    let statements = db.conn().statements();
    assert!(statements[0].0.starts_with("UPDATE `Users` SET "));
    assert!(statements[0].0.ends_with("WHERE (`Users`.`id` = ?)"));
    assert_eq!(statements[0].1.last(), Some(&Value::Int(3)));
    assert_eq!(user.status.as_deref(), Some("active"));
    assert!(user.created_at.is_some());
}

#[tokio::test]
async fn failed_validation_skips_the_database() {
    let db = db(Dialect::MySql);
    let mut user = User::default();

    assert!(!user.save(&db).await.unwrap());
    assert_eq!(user.state().error(), Some("name is required"));
    assert!(db.conn().statements().is_empty());

    user.name = "Cy".into();
    db.conn().reply(vec![user_row(1, "Cy", None)]);
    assert!(user.save(&db).await.unwrap());
    assert_eq!(user.state().error(), None);
}

#[tokio::test]
async fn delete_marks_the_record_new_again() {
    let db = db(Dialect::MySql);

    let mut fresh = User::default();
    assert_eq!(fresh.delete(&db).await.unwrap(), 0);
    assert!(db.conn().statements().is_empty());

    let mut user = persisted_user(4, "Dee");
    assert_eq!(user.delete(&db).await.unwrap(), 1);
    assert!(user.is_new());
    assert_eq!(
        db.conn().last(),
        (
            "DELETE FROM `Users` WHERE (`Users`.`id` = ?)".to_string(),
            vec![Value::Int(4)]
        )
    );
}

#[tokio::test]
async fn reload_refreshes_or_forgets_the_row() {
    let db = db(Dialect::MySql);
    let mut user = persisted_user(5, "stale");

    db.conn().reply(vec![user_row(5, "fresh", None)]);
    assert!(user.reload(&db).await.unwrap());
    assert_eq!(user.name, "fresh");

    db.conn().reply(Vec::new());
    assert!(!user.reload(&db).await.unwrap());
    assert!(user.is_new());
}

#[tokio::test]
async fn parent_lookup_follows_the_foreign_key_field() {
    let db = db(Dialect::MySql);
    let order = Order {
        id: Some(1),
        user_id: Some(9),
        ..Default::default()
    };

    db.conn().reply(vec![user_row(9, "Eve", None)]);
    let parent: User = order.get_parent(&db).await.unwrap().expect("parent row");
    assert_eq!(parent.id, Some(9));
    assert!(!parent.is_new());
    assert_eq!(db.conn().last().1, vec![Value::Int(9)]);

    let user = persisted_user(9, "Eve");
    let err = user.get_parent::<Order, _>(&db).await.unwrap_err();
    assert!(matches!(err, OrmError::MissingProperty { ref column, .. } if column == "Orders_id"));
}

#[tokio::test]
async fn set_parent_requires_a_saved_parent() {
    let mut order = Order::default();

    let err = order.set_parent(&User::default()).unwrap_err();
    assert!(matches!(err, OrmError::NewParent(ref table) if table == "Users"));

    order.set_parent(&persisted_user(12, "Fay")).unwrap();
    assert_eq!(order.user_id, Some(12));

    let mut user = persisted_user(1, "Gus");
    let mut saved_order = Order::default();
    saved_order.state_mut().mark_persisted();
    assert!(matches!(
        user.set_parent(&saved_order),
        Err(OrmError::MissingProperty { .. })
    ));
}

#[tokio::test]
async fn children_are_found_by_the_parent_key() {
    let db = db(Dialect::MySql);
    let user = persisted_user(2, "Hal");

    db.conn().reply(vec![order_row(10, 2, 5.0), order_row(11, 2, 7.5)]);
    let orders: Vec<Order> = user.children(&db).await.unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[1].total, Some(7.5));
    assert!(db.conn().last().0.ends_with("WHERE (`Orders`.`Users_id` = ?)"));

    db.conn().reply(vec![ResultRow::from_pairs([("select_count", 2i64)])]);
    assert_eq!(user.count_children::<Order, _>(&db).await.unwrap(), 2);

    let fresh = User::default();
    assert!(fresh.children::<Order, _>(&db).await.unwrap().is_empty());
}

#[tokio::test]
async fn joined_rows_fill_the_join_field() {
    let db = db(Dialect::MySql);
    let mut hit = user_row(2, "Ida", None);
    for (column, value) in order_row(10, 2, 5.0) {
        hit.push(column, value);
    }
    let mut miss = user_row(3, "Jo", None);
    for column in ["Orders_id", "Orders_Users_id", "Orders_total"] {
        miss.push(column, Value::Null);
    }
    db.conn().reply(vec![hit, miss]);

    let users: Vec<User> = db
        .query("Users")
        .find()
        .left_join("Orders")
        .fetch_all()
        .await
        .unwrap();

    let order = users[0].orders.as_ref().expect("joined order");
    assert_eq!(order.id, Some(10));
    assert!(!order.is_new());
    assert!(users[1].orders.is_none());
}

#[tokio::test]
async fn preload_registered_uses_the_seeded_catalog() {
    let db = db(Dialect::MySql);
    let loaded = db.preload_registered().await.unwrap();
    assert!(loaded >= 2);
    assert!(db.conn().statements().is_empty());
}
