//! Derive macros for quarry
//!
//! Provides `#[derive(Record)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod record;

/// Derive `TableMapped` and `Record` for a struct.
///
/// # Example
///
/// ```ignore
/// use quarry::prelude::*;
///
/// #[derive(Debug, Default, Record)]
/// #[orm(table = "users", connection = "main", validate = "User::check")]
/// struct User {
///     #[orm(id)]
///     id: Option<i64>,
///     #[orm(column = "user_name")]
///     name: String,
///     #[orm(join)]
///     orders: Option<Order>,
///     #[orm(state)]
///     state: RecordState,
/// }
///
/// impl User {
///     fn check(&self) -> Result<(), String> {
///         if self.name.is_empty() { Err("name is required".into()) } else { Ok(()) }
///     }
/// }
/// ```
///
/// # Attributes
///
/// - `#[orm(table = "name")]` - Table name (required)
/// - `#[orm(connection = "id")]` - Connection id (default `"default"`)
/// - `#[orm(validate = "path")]` - `fn(&Self) -> Result<(), String>` run by `save()`
/// - `#[orm(id)]` - Primary-key column (at least one is required)
/// - `#[orm(column = "name")]` - Map field to a different column name
/// - `#[orm(join)]` - `Option<T>` holding a joined record, filled from the nested
///   record named after `T`'s table
/// - `#[orm(state)]` - The `RecordState` field
#[proc_macro_derive(Record, attributes(orm))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    record::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
