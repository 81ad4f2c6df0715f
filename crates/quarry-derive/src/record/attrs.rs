//! Attribute parsing for the Record derive macro.
//!
//! Handles struct-level and field-level `#[orm(...)]` attributes.

use syn::{DeriveInput, Result};

/// Struct-level `#[orm(...)]` settings.
pub(super) struct RecordAttrs {
    pub table: String,
    pub connection: String,
    pub validate: Option<syn::Path>,
}

/// Role of one struct field.
#[derive(PartialEq, Eq)]
pub(super) enum FieldRole {
    Column,
    Join,
    State,
}

/// Field-level `#[orm(...)]` settings.
pub(super) struct FieldAttr {
    pub is_id: bool,
    pub is_join: bool,
    pub is_state: bool,
    pub column: Option<String>,
}

impl syn::parse::Parse for FieldAttr {
    fn parse(input: syn::parse::ParseStream) -> Result<Self> {
        let mut attr = FieldAttr {
            is_id: false,
            is_join: false,
            is_state: false,
            column: None,
        };

        while !input.is_empty() {
            let ident: syn::Ident = input.parse()?;
            if ident == "id" {
                attr.is_id = true;
            } else if ident == "join" {
                attr.is_join = true;
            } else if ident == "state" {
                attr.is_state = true;
            } else if ident == "column" {
                let _: syn::Token![=] = input.parse()?;
                let value: syn::LitStr = input.parse()?;
                attr.column = Some(value.value());
            } else {
                return Err(syn::Error::new(
                    ident.span(),
                    format!("unknown field attribute `{ident}`; expected id, join, state or column"),
                ));
            }

            if input.peek(syn::Token![,]) {
                let _: syn::Token![,] = input.parse()?;
            } else {
                break;
            }
        }

        Ok(attr)
    }
}

impl FieldAttr {
    /// Merge every `#[orm(...)]` attribute on `field`.
    pub(super) fn of(field: &syn::Field) -> Result<Self> {
        let mut merged = FieldAttr {
            is_id: false,
            is_join: false,
            is_state: false,
            column: None,
        };
        for attr in &field.attrs {
            if !attr.path().is_ident("orm") {
                continue;
            }
            let parsed: FieldAttr = attr.parse_args()?;
            merged.is_id |= parsed.is_id;
            merged.is_join |= parsed.is_join;
            merged.is_state |= parsed.is_state;
            if parsed.column.is_some() {
                merged.column = parsed.column;
            }
        }
        Ok(merged)
    }

    pub(super) fn role(&self, field: &syn::Field) -> Result<FieldRole> {
        match (self.is_join, self.is_state || is_record_state(&field.ty)) {
            (true, true) => Err(syn::Error::new_spanned(
                field,
                "a field cannot be both `join` and `state`",
            )),
            (true, false) => Ok(FieldRole::Join),
            (false, true) => Ok(FieldRole::State),
            (false, false) => Ok(FieldRole::Column),
        }
    }
}

fn lit_str(value: &syn::Expr) -> Option<&syn::LitStr> {
    match value {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(lit),
            ..
        }) => Some(lit),
        _ => None,
    }
}

/// Parse `#[orm(table = "...", connection = "...", validate = "...")]`.
pub(super) fn record_attrs(input: &DeriveInput) -> Result<RecordAttrs> {
    let mut table = None;
    let mut connection = None;
    let mut validate = None;

    for attr in &input.attrs {
        if !attr.path().is_ident("orm") {
            continue;
        }
        let pairs = attr.parse_args_with(
            syn::punctuated::Punctuated::<syn::MetaNameValue, syn::Token![,]>::parse_terminated,
        )?;
        for pair in pairs {
            let Some(lit) = lit_str(&pair.value) else {
                return Err(syn::Error::new_spanned(&pair.value, "expected a string literal"));
            };
            if pair.path.is_ident("table") {
                table = Some(lit.value());
            } else if pair.path.is_ident("connection") {
                connection = Some(lit.value());
            } else if pair.path.is_ident("validate") {
                validate = Some(lit.parse::<syn::Path>()?);
            } else {
                return Err(syn::Error::new_spanned(
                    &pair.path,
                    "unknown record attribute; expected table, connection or validate",
                ));
            }
        }
    }

    let table = table.ok_or_else(|| {
        syn::Error::new_spanned(
            &input.ident,
            "Record requires #[orm(table = \"table_name\")] attribute",
        )
    })?;

    Ok(RecordAttrs {
        table,
        connection: connection.unwrap_or_else(|| "default".to_string()),
        validate,
    })
}

/// `true` for `RecordState` and paths ending in it.
fn is_record_state(ty: &syn::Type) -> bool {
    match ty {
        syn::Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "RecordState"),
        _ => false,
    }
}

/// `T` of an `Option<T>` field type.
pub(super) fn option_inner(ty: &syn::Type) -> Option<&syn::Type> {
    let syn::Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        syn::GenericArgument::Type(inner) if args.args.len() == 1 => Some(inner),
        _ => None,
    }
}
