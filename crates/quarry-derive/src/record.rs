//! Record derive macro implementation
//!
//! ## Module Structure
//!
//! - `attrs`: Struct and field attribute parsing

mod attrs;

use attrs::{FieldAttr, FieldRole, option_inner, record_attrs};

use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Fields, Result};

/// A field stored in a table column.
struct ColumnField {
    ident: syn::Ident,
    column: String,
}

/// An `Option<T>` field filled from a joined record.
struct JoinField {
    ident: syn::Ident,
    target: syn::Type,
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Record cannot be derived for generic structs",
        ));
    }

    let attrs = record_attrs(&input)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Record can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Record can only be derived for structs",
            ));
        }
    };

    let mut columns: Vec<ColumnField> = Vec::with_capacity(fields.len());
    let mut joins: Vec<JoinField> = Vec::new();
    let mut primary_key: Vec<String> = Vec::new();
    let mut state: Option<syn::Ident> = None;

    for field in fields {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let attr = FieldAttr::of(field)?;

        match attr.role(field)? {
            FieldRole::State => {
                if state.is_some() {
                    return Err(syn::Error::new_spanned(
                        field,
                        "only one RecordState field is allowed",
                    ));
                }
                state = Some(ident);
            }
            FieldRole::Join => {
                if attr.is_id || attr.column.is_some() {
                    return Err(syn::Error::new_spanned(
                        field,
                        "a `join` field cannot also be `id` or have a `column`",
                    ));
                }
                let Some(target) = option_inner(&field.ty) else {
                    return Err(syn::Error::new_spanned(
                        &field.ty,
                        "a `join` field must be `Option<T>` where T: Record",
                    ));
                };
                joins.push(JoinField {
                    ident,
                    target: target.clone(),
                });
            }
            FieldRole::Column => {
                let column = attr
                    .column
                    .clone()
                    .unwrap_or_else(|| ident.unraw().to_string());
                if columns.iter().any(|c| c.column == column) {
                    return Err(syn::Error::new_spanned(
                        field,
                        format!("column `{column}` is mapped twice"),
                    ));
                }
                if attr.is_id {
                    primary_key.push(column.clone());
                }
                columns.push(ColumnField { ident, column });
            }
        }
    }

    let Some(state) = state else {
        return Err(syn::Error::new_spanned(
            name,
            "Record requires a `RecordState` field (mark it with #[orm(state)])",
        ));
    };
    if primary_key.is_empty() {
        return Err(syn::Error::new_spanned(
            name,
            "Record requires at least one #[orm(id)] field",
        ));
    }

    let table = &attrs.table;
    let connection = &attrs.connection;
    let type_name = name.to_string();
    let column_names: Vec<&str> = columns.iter().map(|c| c.column.as_str()).collect();

    let to_values = columns.iter().map(|c| {
        let ident = &c.ident;
        let column = &c.column;
        quote! { (#column, quarry::ToValue::to_value(&self.#ident)) }
    });

    let get_arms = columns.iter().map(|c| {
        let ident = &c.ident;
        let column = &c.column;
        quote! { #column => Some(quarry::ToValue::to_value(&self.#ident)), }
    });

    let set_arms = columns.iter().map(|c| {
        let ident = &c.ident;
        let column = &c.column;
        quote! {
            #column => {
                self.#ident = quarry::FromValue::from_value(value)
                    .map_err(|message| quarry::OrmError::decode(#column, message))?;
                Ok(true)
            }
        }
    });

    let inflate_columns = columns.iter().map(|c| {
        let ident = &c.ident;
        let column = &c.column;
        quote! {
            if let Some(value) = record.value(#column) {
                self.#ident = quarry::FromValue::from_value(value)
                    .map_err(|message| quarry::OrmError::decode(#column, message))?;
            }
        }
    });

    let inflate_joins = joins.iter().map(|j| {
        let ident = &j.ident;
        let target = &j.target;
        quote! {
            if record.nested(<#target as quarry::TableMapped>::TABLE).is_some() {
                self.#ident = quarry::hydrate_nested::<#target>(record)?;
            }
        }
    });

    let validate = attrs.validate.as_ref().map(|path| {
        quote! {
            fn validate(&self) -> ::std::result::Result<(), String> {
                #path(self)
            }
        }
    });

    Ok(quote! {
        impl quarry::TableMapped for #name {
            const TABLE: &'static str = #table;
            const CONNECTION: &'static str = #connection;

            fn columns() -> &'static [&'static str] {
                &[#(#column_names),*]
            }

            fn primary_key() -> &'static [&'static str] {
                &[#(#primary_key),*]
            }
        }

        impl quarry::Record for #name {
            fn state(&self) -> &quarry::RecordState {
                &self.#state
            }

            fn state_mut(&mut self) -> &mut quarry::RecordState {
                &mut self.#state
            }

            fn to_values(&self) -> Vec<(&'static str, quarry::Value)> {
                vec![#(#to_values),*]
            }

            fn get_value(&self, column: &str) -> Option<quarry::Value> {
                match column {
                    #(#get_arms)*
                    _ => None,
                }
            }

            fn set_value(&mut self, column: &str, value: &quarry::Value) -> quarry::OrmResult<bool> {
                match column {
                    #(#set_arms)*
                    _ => Ok(false),
                }
            }

            fn inflate(&mut self, record: &quarry::AnonymousRecord) -> quarry::OrmResult<()> {
                #(#inflate_columns)*
                #(#inflate_joins)*
                Ok(())
            }

            #validate
        }

        quarry::inventory::submit! {
            quarry::RecordRegistration {
                type_id: ::std::any::TypeId::of::<#name>,
                type_name: #type_name,
                table: #table,
                connection: #connection,
                columns: &[#(#column_names),*],
                primary_key: &[#(#primary_key),*],
            }
        }
    })
}
