//! Registration of record types.
//!
//! `#[derive(Record)]` submits one [`RecordRegistration`] per type through the
//! `inventory` crate. Lookups go by [`TypeId`], never by type name.

use std::any::TypeId;

/// Static description of a derived record type.
pub struct RecordRegistration {
    /// `TypeId::of::<T>` for the registered type.
    pub type_id: fn() -> TypeId,
    pub type_name: &'static str,
    pub table: &'static str,
    pub connection: &'static str,
    pub columns: &'static [&'static str],
    pub primary_key: &'static [&'static str],
}

inventory::collect!(RecordRegistration);

impl std::fmt::Debug for RecordRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordRegistration")
            .field("type_name", &self.type_name)
            .field("table", &self.table)
            .field("connection", &self.connection)
            .finish()
    }
}

/// All registered record types.
pub fn registrations() -> impl Iterator<Item = &'static RecordRegistration> {
    inventory::iter::<RecordRegistration>.into_iter()
}

/// Registration of `T`, if `T` was derived with `#[derive(Record)]`.
pub fn lookup<T: 'static>() -> Option<&'static RecordRegistration> {
    let wanted = TypeId::of::<T>();
    registrations().find(|reg| (reg.type_id)() == wanted)
}

/// Tables of every record type bound to `connection`, without duplicates.
pub fn tables_for_connection(connection: &str) -> Vec<&'static str> {
    let mut tables: Vec<&'static str> = registrations()
        .filter(|reg| reg.connection == connection)
        .map(|reg| reg.table)
        .collect();
    tables.sort_unstable();
    tables.dedup();
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Registered;
    struct NotRegistered;

    inventory::submit! {
        RecordRegistration {
            type_id: TypeId::of::<Registered>,
            type_name: "Registered",
            table: "registry_test_table",
            connection: "registry_test",
            columns: &["id"],
            primary_key: &["id"],
        }
    }

    #[test]
    fn lookup_by_type_id() {
        let reg = lookup::<Registered>().expect("registered");
        assert_eq!(reg.table, "registry_test_table");
        assert!(lookup::<NotRegistered>().is_none());
    }

    #[test]
    fn tables_are_grouped_by_connection() {
        assert_eq!(tables_for_connection("registry_test"), vec!["registry_test_table"]);
        assert!(tables_for_connection("no_such_connection").is_empty());
    }
}
