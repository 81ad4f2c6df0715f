//! Dynamic values used as statement parameters and result cells.
//!
//! Records declare typed fields; everything crossing the builder boundary is a
//! [`Value`]. [`FromValue`] converts a cell back into a field type and is
//! deliberately forgiving (drivers often hand back numbers or dates as text).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::ser::{Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::Uuid(_) => "uuid",
            Value::Json(_) => "json",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Date(v) => write!(f, "'{}'", v.format(DATE_FORMAT)),
            Value::DateTime(v) => write!(f, "'{}'", v.format(DATETIME_FORMAT)),
            Value::Time(v) => write!(f, "'{}'", v.format(TIME_FORMAT)),
            Value::Timestamp(v) => write!(f, "'{}'", v.to_rfc3339()),
            Value::Uuid(v) => write!(f, "'{v}'"),
            Value::Json(v) => write!(f, "'{v}'"),
        }
    }
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub(crate) const TIME_FORMAT: &str = "%H:%M:%S";

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Text(v) => serializer.serialize_str(v),
            Value::Bytes(v) => serializer.serialize_bytes(v),
            Value::Date(v) => serializer.collect_str(&v.format(DATE_FORMAT)),
            Value::DateTime(v) => serializer.collect_str(&v.format(DATETIME_FORMAT)),
            Value::Time(v) => serializer.collect_str(&v.format(TIME_FORMAT)),
            Value::Timestamp(v) => serializer.serialize_str(&v.to_rfc3339()),
            Value::Uuid(v) => serializer.collect_str(v),
            Value::Json(v) => v.serialize(serializer),
        }
    }
}

macro_rules! impl_from_value_variant {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_value_variant! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    &str => Text,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    NaiveTime => Time,
    DateTime<Utc> => Timestamp,
    Uuid => Uuid,
    serde_json::Value => Json,
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

/// Decimals travel as their canonical text so no precision is lost.
impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Convert a field into a [`Value`] without consuming it.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

impl<T: Clone + Into<Value>> ToValue for T {
    fn to_value(&self) -> Value {
        self.clone().into()
    }
}

/// Convert a result cell into a typed field.
///
/// Errors are plain messages; callers attach the column name.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, String>;
}

fn mismatch<T>(value: &Value, target: &str) -> Result<T, String> {
    Err(format!("cannot convert {} value to {target}", value.kind()))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Int(v) => Ok(*v),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            Value::Text(s) => s
                .trim()
                .parse()
                .map_err(|e| format!("invalid integer '{s}': {e}")),
            other => mismatch(other, "i64"),
        }
    }
}

macro_rules! impl_from_value_narrow_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self, String> {
                    let wide = i64::from_value(value)?;
                    <$ty>::try_from(wide).map_err(|_| {
                        format!("integer {wide} out of range for {}", stringify!($ty))
                    })
                }
            }
        )*
    };
}

impl_from_value_narrow_int!(i8, i16, i32, u8, u16, u32, u64);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            Value::Text(s) => s
                .trim()
                .parse()
                .map_err(|e| format!("invalid number '{s}': {e}")),
            other => mismatch(other, "f64"),
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Int(v) => Ok(Decimal::from(*v)),
            Value::Float(v) => {
                Decimal::try_from(*v).map_err(|_| format!("float {v} has no decimal form"))
            }
            Value::Text(s) => {
                let s = s.trim();
                s.parse::<Decimal>()
                    .or_else(|_| Decimal::from_scientific(s))
                    .map_err(|e| format!("invalid decimal '{s}': {e}"))
            }
            other => mismatch(other, "Decimal"),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, String> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(v) => Ok(*v),
            Value::Int(v) => Ok(*v != 0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "t" | "true" | "y" | "yes" => Ok(true),
                "0" | "f" | "false" | "n" | "no" | "" => Ok(false),
                _ => Err(format!("invalid boolean '{s}'")),
            },
            other => mismatch(other, "bool"),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            Value::Null | Value::Bytes(_) => mismatch(value, "String"),
            Value::Json(v) => Ok(v.to_string()),
            Value::Date(v) => Ok(v.format(DATE_FORMAT).to_string()),
            Value::DateTime(v) => Ok(v.format(DATETIME_FORMAT).to_string()),
            Value::Time(v) => Ok(v.format(TIME_FORMAT).to_string()),
            Value::Timestamp(v) => Ok(v.to_rfc3339()),
            Value::Bool(v) => Ok(v.to_string()),
            Value::Int(v) => Ok(v.to_string()),
            Value::Float(v) => Ok(v.to_string()),
            Value::Uuid(v) => Ok(v.to_string()),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bytes(v) => Ok(v.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            other => mismatch(other, "Vec<u8>"),
        }
    }
}

pub(crate) fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.naive_utc()))
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Date(v) => Ok(*v),
            Value::DateTime(v) => Ok(v.date()),
            Value::Timestamp(v) => Ok(v.date_naive()),
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .map_err(|e| format!("invalid date '{s}': {e}")),
            other => mismatch(other, "NaiveDate"),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::DateTime(v) => Ok(*v),
            Value::Timestamp(v) => Ok(v.naive_utc()),
            Value::Date(v) => Ok(v.and_time(NaiveTime::MIN)),
            Value::Text(s) => parse_datetime(s).ok_or_else(|| format!("invalid datetime '{s}'")),
            other => mismatch(other, "NaiveDateTime"),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Time(v) => Ok(*v),
            Value::DateTime(v) => Ok(v.time()),
            Value::Text(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
                .map_err(|e| format!("invalid time '{s}': {e}")),
            other => mismatch(other, "NaiveTime"),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Timestamp(v) => Ok(*v),
            Value::DateTime(v) => Ok(v.and_utc()),
            Value::Text(s) => parse_datetime(s)
                .map(|d| d.and_utc())
                .ok_or_else(|| format!("invalid timestamp '{s}'")),
            other => mismatch(other, "DateTime<Utc>"),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Uuid(v) => Ok(*v),
            Value::Text(s) => Uuid::parse_str(s.trim()).map_err(|e| format!("invalid uuid '{s}': {e}")),
            other => mismatch(other, "Uuid"),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::Text(s) => serde_json::from_str(s).map_err(|e| format!("invalid json: {e}")),
            Value::Null => Ok(serde_json::Value::Null),
            other => serde_json::to_value(other).map_err(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::ToPrimitive;

    #[test]
    fn option_conversions_map_none_to_null() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
        assert_eq!(Option::<i64>::from_value(&Value::Null), Ok(None));
    }

    #[test]
    fn lenient_decoding_from_text_cells() {
        assert_eq!(i64::from_value(&Value::Text(" 42 ".into())), Ok(42));
        assert_eq!(bool::from_value(&Value::Int(1)), Ok(true));
        assert_eq!(
            NaiveDate::from_value(&Value::Text("2021-03-04".into())),
            Ok(NaiveDate::from_ymd_opt(2021, 3, 4).unwrap())
        );
        let dt = NaiveDateTime::from_value(&Value::Text("2021-03-04 05:06:07".into())).unwrap();
        assert_eq!(dt.format(DATETIME_FORMAT).to_string(), "2021-03-04 05:06:07");
    }

    #[test]
    fn narrow_integers_are_range_checked() {
        assert_eq!(i16::from_value(&Value::Int(12)), Ok(12));
        assert!(i16::from_value(&Value::Int(70_000)).is_err());
        assert!(i32::from_value(&Value::Text("abc".into())).is_err());
    }

    #[test]
    fn decimals_keep_their_digits() {
        let price: Decimal = "19.990".parse().unwrap();
        assert_eq!(Value::from(price), Value::Text("19.990".into()));
        assert_eq!(Decimal::from_value(&Value::Text(" 19.990 ".into())), Ok(price));
        assert_eq!(Decimal::from_value(&Value::Int(3)), Ok(Decimal::from(3)));
        assert!(Decimal::from_value(&Value::Float(f64::NAN)).is_err());
        assert_eq!(Decimal::from_value(&Value::Text("12.5".into())).unwrap().to_f64(), Some(12.5));
    }

    #[test]
    fn values_serialize_to_json() {
        let json = serde_json::to_value(vec![
            Value::Null,
            Value::Int(3),
            Value::Text("a".into()),
            Value::Date(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()),
        ])
        .unwrap();
        assert_eq!(json, serde_json::json!([null, 3, "a", "2020-01-02"]));
    }

    #[test]
    fn display_escapes_text() {
        assert_eq!(Value::Text("O'Hara".into()).to_string(), "'O''Hara'");
        assert_eq!(Value::Null.to_string(), "NULL");
    }
}
