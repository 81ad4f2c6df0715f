//! tokio-postgres adapter: parameter encoding and row decoding for [`Value`].

use super::{Connection, ResultRow};
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::value::{DATE_FORMAT, DATETIME_FORMAT, FromValue, TIME_FORMAT, Value};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::error::Error;
use tokio_postgres::NoTls;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

fn is_text(ty: &Type) -> bool {
    *ty == Type::TEXT
        || *ty == Type::VARCHAR
        || *ty == Type::BPCHAR
        || *ty == Type::NAME
        || *ty == Type::UNKNOWN
        || ty.name() == "citext"
        || matches!(ty.kind(), Kind::Enum(_))
}

fn is_int(ty: &Type) -> bool {
    *ty == Type::INT2 || *ty == Type::INT4 || *ty == Type::INT8
}

fn is_float(ty: &Type) -> bool {
    *ty == Type::FLOAT4 || *ty == Type::FLOAT8
}

fn unsupported(value: &Value, ty: &Type) -> Result<IsNull, BoxError> {
    Err(format!("cannot encode {} value as postgres type {}", value.kind(), ty).into())
}

fn write_text(text: &str, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    out.extend_from_slice(text.as_bytes());
    Ok(IsNull::No)
}

fn encode_int(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::INT2 {
        i16::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::INT8 {
        v.to_sql(ty, out)
    } else if *ty == Type::OID {
        u32::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::FLOAT4 {
        (v as f32).to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        (v as f64).to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        Decimal::from(v).to_sql(ty, out)
    } else if *ty == Type::BOOL {
        (v != 0).to_sql(ty, out)
    } else if is_text(ty) {
        write_text(&v.to_string(), out)
    } else {
        unsupported(&Value::Int(v), ty)
    }
}

fn encode_float(v: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::FLOAT4 {
        (v as f32).to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        v.to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        Decimal::try_from(v)
            .map_err(|_| format!("cannot encode float {v} as numeric"))?
            .to_sql(ty, out)
    } else if is_int(ty) && v.fract() == 0.0 {
        encode_int(v as i64, ty, out)
    } else if is_text(ty) {
        write_text(&v.to_string(), out)
    } else {
        unsupported(&Value::Float(v), ty)
    }
}

fn parse_decimal(s: &str) -> Result<Decimal, BoxError> {
    let s = s.trim();
    s.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|e| format!("invalid numeric '{s}': {e}").into())
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let parsed = |target: fn(&Value) -> Result<Value, String>| -> Result<Value, BoxError> {
        target(&Value::Text(s.to_string())).map_err(Into::into)
    };

    if is_text(ty) {
        write_text(s, out)
    } else if is_int(ty) || *ty == Type::OID {
        encode_int(s.trim().parse::<i64>()?, ty, out)
    } else if is_float(ty) {
        encode_float(s.trim().parse::<f64>()?, ty, out)
    } else if *ty == Type::NUMERIC {
        parse_decimal(s)?.to_sql(ty, out)
    } else if *ty == Type::BOOL {
        parsed(|v| bool::from_value(v).map(Value::Bool))?.to_sql(ty, out)
    } else if *ty == Type::DATE {
        parsed(|v| NaiveDate::from_value(v).map(Value::Date))?.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMP || *ty == Type::TIMESTAMPTZ {
        parsed(|v| NaiveDateTime::from_value(v).map(Value::DateTime))?.to_sql(ty, out)
    } else if *ty == Type::TIME {
        parsed(|v| NaiveTime::from_value(v).map(Value::Time))?.to_sql(ty, out)
    } else if *ty == Type::UUID {
        Uuid::parse_str(s.trim())?.to_sql(ty, out)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
    } else if *ty == Type::BYTEA {
        s.as_bytes().to_sql(ty, out)
    } else {
        unsupported(&Value::Text(s.to_string()), ty)
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if let Kind::Domain(inner) = ty.kind() {
            return self.to_sql(inner, out);
        }

        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => {
                if *ty == Type::BOOL {
                    v.to_sql(ty, out)
                } else if is_text(ty) {
                    write_text(if *v { "true" } else { "false" }, out)
                } else {
                    encode_int(i64::from(*v), ty, out)
                }
            }
            Value::Int(v) => encode_int(*v, ty, out),
            Value::Float(v) => encode_float(*v, ty, out),
            Value::Text(v) => encode_text(v, ty, out),
            Value::Bytes(v) => {
                if *ty == Type::BYTEA {
                    v.as_slice().to_sql(ty, out)
                } else if is_text(ty) {
                    write_text(std::str::from_utf8(v)?, out)
                } else {
                    unsupported(self, ty)
                }
            }
            Value::Date(v) => {
                if *ty == Type::DATE {
                    v.to_sql(ty, out)
                } else if *ty == Type::TIMESTAMP {
                    v.and_time(NaiveTime::MIN).to_sql(ty, out)
                } else if *ty == Type::TIMESTAMPTZ {
                    v.and_time(NaiveTime::MIN).and_utc().to_sql(ty, out)
                } else if is_text(ty) {
                    write_text(&v.format(DATE_FORMAT).to_string(), out)
                } else {
                    unsupported(self, ty)
                }
            }
            Value::DateTime(v) => {
                if *ty == Type::TIMESTAMP {
                    v.to_sql(ty, out)
                } else if *ty == Type::TIMESTAMPTZ {
                    v.and_utc().to_sql(ty, out)
                } else if *ty == Type::DATE {
                    v.date().to_sql(ty, out)
                } else if *ty == Type::TIME {
                    v.time().to_sql(ty, out)
                } else if is_text(ty) {
                    write_text(&v.format(DATETIME_FORMAT).to_string(), out)
                } else {
                    unsupported(self, ty)
                }
            }
            Value::Time(v) => {
                if *ty == Type::TIME {
                    v.to_sql(ty, out)
                } else if is_text(ty) {
                    write_text(&v.format(TIME_FORMAT).to_string(), out)
                } else {
                    unsupported(self, ty)
                }
            }
            Value::Timestamp(v) => {
                if *ty == Type::TIMESTAMPTZ {
                    v.to_sql(ty, out)
                } else if *ty == Type::TIMESTAMP {
                    v.naive_utc().to_sql(ty, out)
                } else if *ty == Type::DATE {
                    v.date_naive().to_sql(ty, out)
                } else if is_text(ty) {
                    write_text(&v.to_rfc3339(), out)
                } else {
                    unsupported(self, ty)
                }
            }
            Value::Uuid(v) => {
                if *ty == Type::UUID {
                    v.to_sql(ty, out)
                } else if is_text(ty) {
                    write_text(&v.to_string(), out)
                } else {
                    unsupported(self, ty)
                }
            }
            Value::Json(v) => {
                if *ty == Type::JSON || *ty == Type::JSONB {
                    v.to_sql(ty, out)
                } else if is_text(ty) {
                    write_text(&v.to_string(), out)
                } else {
                    unsupported(self, ty)
                }
            }
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_POS_INF: u16 = 0xD000;
const NUMERIC_NEG_INF: u16 = 0xF000;

/// A `NUMERIC` cell. `NaN` and the infinities have no [`Decimal`] form and
/// come back as floats.
enum NumericCell {
    Finite(Decimal),
    Special(f64),
}

impl<'a> FromSql<'a> for NumericCell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let sign = raw.get(4..6).map(|b| u16::from_be_bytes([b[0], b[1]]));
        match sign {
            Some(NUMERIC_NAN) => Ok(NumericCell::Special(f64::NAN)),
            Some(NUMERIC_POS_INF) => Ok(NumericCell::Special(f64::INFINITY)),
            Some(NUMERIC_NEG_INF) => Ok(NumericCell::Special(f64::NEG_INFINITY)),
            _ => Decimal::from_sql(ty, raw).map(NumericCell::Finite),
        }
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Any cell in its raw binary form; used for types without a dedicated mapping.
struct RawCell(Vec<u8>);

impl<'a> FromSql<'a> for RawCell {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(RawCell(raw.to_vec()))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn decode_cell(row: &Row, idx: usize) -> OrmResult<Value> {
    let column = &row.columns()[idx];
    let ty = column.type_();
    let name = column.name();

    fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, name: &str) -> OrmResult<Option<T>> {
        row.try_get::<_, Option<T>>(idx)
            .map_err(|e| OrmError::decode(name, e.to_string()))
    }

    let ty = match ty.kind() {
        Kind::Domain(inner) => inner,
        _ => ty,
    };

    let value = if *ty == Type::BOOL {
        get::<bool>(row, idx, name)?.map(Value::Bool)
    } else if *ty == Type::INT2 {
        get::<i16>(row, idx, name)?.map(Value::from)
    } else if *ty == Type::INT4 {
        get::<i32>(row, idx, name)?.map(Value::from)
    } else if *ty == Type::INT8 {
        get::<i64>(row, idx, name)?.map(Value::Int)
    } else if *ty == Type::OID {
        get::<u32>(row, idx, name)?.map(Value::from)
    } else if *ty == Type::CHAR {
        get::<i8>(row, idx, name)?.map(Value::from)
    } else if *ty == Type::FLOAT4 {
        get::<f32>(row, idx, name)?.map(Value::from)
    } else if *ty == Type::FLOAT8 {
        get::<f64>(row, idx, name)?.map(Value::Float)
    } else if *ty == Type::NUMERIC {
        get::<NumericCell>(row, idx, name)?.map(|n| match n {
            NumericCell::Finite(d) => Value::Text(d.to_string()),
            NumericCell::Special(f) => Value::Float(f),
        })
    } else if *ty == Type::DATE {
        get::<NaiveDate>(row, idx, name)?.map(Value::Date)
    } else if *ty == Type::TIMESTAMP {
        get::<NaiveDateTime>(row, idx, name)?.map(Value::DateTime)
    } else if *ty == Type::TIMESTAMPTZ {
        get::<DateTime<Utc>>(row, idx, name)?.map(Value::Timestamp)
    } else if *ty == Type::TIME {
        get::<NaiveTime>(row, idx, name)?.map(Value::Time)
    } else if *ty == Type::UUID {
        get::<Uuid>(row, idx, name)?.map(Value::Uuid)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        get::<serde_json::Value>(row, idx, name)?.map(Value::Json)
    } else if *ty == Type::BYTEA {
        get::<Vec<u8>>(row, idx, name)?.map(Value::Bytes)
    } else {
        get::<RawCell>(row, idx, name)?.map(|raw| match String::from_utf8(raw.0) {
            Ok(text) => Value::Text(text),
            Err(e) => Value::Bytes(e.into_bytes()),
        })
    };

    Ok(value.unwrap_or(Value::Null))
}

fn decode_row(row: &Row) -> OrmResult<ResultRow> {
    let mut out = ResultRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        out.push(column.name(), decode_cell(row, idx)?);
    }
    Ok(out)
}

async fn query_rows<G>(client: &G, sql: &str, params: &[Value]) -> OrmResult<Vec<ResultRow>>
where
    G: tokio_postgres::GenericClient + Sync,
{
    let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
    let rows = client
        .query(sql, &refs)
        .await
        .map_err(|e| OrmError::execution(sql, e))?;
    rows.iter().map(decode_row).collect()
}

async fn execute_statement<G>(client: &G, sql: &str, params: &[Value]) -> OrmResult<u64>
where
    G: tokio_postgres::GenericClient + Sync,
{
    let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
    client
        .execute(sql, &refs)
        .await
        .map_err(|e| OrmError::execution(sql, e))
}

impl Connection for tokio_postgres::Client {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<ResultRow>> {
        query_rows(self, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        execute_statement(self, sql, params).await
    }
}

impl Connection for tokio_postgres::Transaction<'_> {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<ResultRow>> {
        query_rows(self, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        execute_statement(self, sql, params).await
    }
}

// ===== deadpool-postgres support =====

#[cfg(feature = "pool")]
impl Connection for deadpool_postgres::Client {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<ResultRow>> {
        // Delegate to the deref target (ClientWrapper -> tokio_postgres::Client).
        let client: &tokio_postgres::Client = self;
        query_rows(client, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let client: &tokio_postgres::Client = self;
        execute_statement(client, sql, params).await
    }
}

/// Connect without TLS and drive the connection on a background task.
pub async fn connect(database_url: &str) -> OrmResult<tokio_postgres::Client> {
    let config: tokio_postgres::Config = database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| OrmError::Connection(e.to_string()))?;
    connect_with(config).await
}

/// Like [`connect`], from already parsed driver settings.
pub async fn connect_with(config: tokio_postgres::Config) -> OrmResult<tokio_postgres::Client> {
    let (client, connection) = config
        .connect(NoTls)
        .await
        .map_err(|e| OrmError::Connection(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(target: "quarry.sql", error = %e, "postgres connection error");
        }
    });
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value, ty: &Type) -> Result<Vec<u8>, BoxError> {
        let mut buf = BytesMut::new();
        value.to_sql(ty, &mut buf)?;
        Ok(buf.to_vec())
    }

    #[test]
    fn integers_follow_target_width() {
        assert_eq!(encode(&Value::Int(1), &Type::INT2).unwrap(), vec![0, 1]);
        assert_eq!(encode(&Value::Int(1), &Type::INT4).unwrap(), vec![0, 0, 0, 1]);
        assert!(encode(&Value::Int(70_000), &Type::INT2).is_err());
    }

    #[test]
    fn text_is_parsed_for_typed_columns() {
        assert_eq!(encode(&Value::from("7"), &Type::INT4).unwrap(), vec![0, 0, 0, 7]);
        assert_eq!(encode(&Value::from("abc"), &Type::TEXT).unwrap(), b"abc".to_vec());
        assert_eq!(
            encode(&Value::from("1970-01-01"), &Type::DATE).unwrap(),
            encode(
                &Value::Date(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
                &Type::DATE
            )
            .unwrap()
        );
        assert!(encode(&Value::from("nope"), &Type::DATE).is_err());
    }

    fn numeric_bytes(sign: u16) -> Vec<u8> {
        let mut raw = vec![0, 0, 0, 0];
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&[0, 0]);
        raw
    }

    #[test]
    fn numeric_binds_through_decimal() {
        let expected = encode_decimal("-12.50");
        assert_eq!(encode(&Value::from(" -12.50 "), &Type::NUMERIC).unwrap(), expected);
        assert_eq!(encode(&Value::Float(-12.5), &Type::NUMERIC).unwrap(), encode_decimal("-12.5"));
        assert_eq!(encode(&Value::Int(42), &Type::NUMERIC).unwrap(), encode_decimal("42"));
        assert!(encode(&Value::from("twelve"), &Type::NUMERIC).is_err());
    }

    fn encode_decimal(text: &str) -> Vec<u8> {
        let mut buf = BytesMut::new();
        text.parse::<Decimal>().unwrap().to_sql(&Type::NUMERIC, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn non_finite_floats_are_rejected_for_numeric() {
        assert!(encode(&Value::Float(f64::INFINITY), &Type::NUMERIC).is_err());
        assert!(encode(&Value::Float(f64::NAN), &Type::NUMERIC).is_err());
    }

    #[test]
    fn numeric_cells_decode_special_values_as_floats() {
        let cell = |raw: &[u8]| NumericCell::from_sql(&Type::NUMERIC, raw).unwrap();

        assert!(matches!(cell(&numeric_bytes(NUMERIC_POS_INF)), NumericCell::Special(f) if f == f64::INFINITY));
        assert!(matches!(cell(&numeric_bytes(NUMERIC_NEG_INF)), NumericCell::Special(f) if f == f64::NEG_INFINITY));
        assert!(matches!(cell(&numeric_bytes(NUMERIC_NAN)), NumericCell::Special(f) if f.is_nan()));

        let finite = encode_decimal("3.25");
        assert!(matches!(cell(&finite), NumericCell::Finite(d) if d.to_string() == "3.25"));
    }

    #[test]
    fn null_encodes_as_sql_null() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            Value::Null.to_sql(&Type::INT4, &mut buf).unwrap(),
            IsNull::Yes
        ));
    }
}
