use crate::sql::base::error::TargetExecutionError;
use base64::{Engine, engine::general_purpose::STANDARD};
use bigdecimal::{BigDecimal, num_bigint::BigInt};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use model::{
    core::{native::NativeValue, normalize::normalize},
    records::row::NormalizedRow,
};
use std::{error::Error, sync::Arc};
use tokio_postgres::{
    Row,
    types::{FromSql, Kind, Type},
};
use tracing::warn;

type DecodeResult<T> = Result<T, Box<dyn Error + Sync + Send>>;

/// Binary wire value of any column type, kept undecoded until the column
/// type has been inspected.
struct RawValue<'a> {
    bytes: Option<&'a [u8]>,
}

impl<'a> FromSql<'a> for RawValue<'a> {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> DecodeResult<Self> {
        Ok(RawValue { bytes: Some(raw) })
    }

    fn from_sql_null(_ty: &Type) -> DecodeResult<Self> {
        Ok(RawValue { bytes: None })
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Decodes every column of `row` and normalizes it.
pub fn decode_row(row: &Row, columns: &[Arc<str>]) -> Result<NormalizedRow, TargetExecutionError> {
    let mut out = NormalizedRow::with_capacity(columns.len());
    for (idx, (column, name)) in row.columns().iter().zip(columns).enumerate() {
        let decode_err = |reason: String| TargetExecutionError::Decode {
            column: name.to_string(),
            reason,
        };

        let raw: RawValue = row.try_get(idx).map_err(|e| decode_err(e.to_string()))?;
        let native = match raw.bytes {
            None => NativeValue::Null,
            Some(bytes) => decode_value(column.type_(), bytes).map_err(|e| decode_err(e.to_string()))?,
        };
        out.push(Arc::clone(name), normalize(native));
    }
    Ok(out)
}

/// Decodes one non-null binary value of type `ty`.
pub fn decode_value(ty: &Type, raw: &[u8]) -> DecodeResult<NativeValue> {
    let value = match *ty {
        Type::BOOL => NativeValue::Boolean(bool::from_sql(ty, raw)?),
        Type::INT2 => NativeValue::Int(i16::from_sql(ty, raw)? as i64),
        Type::INT4 => NativeValue::Int(i32::from_sql(ty, raw)? as i64),
        Type::INT8 => NativeValue::Int(i64::from_sql(ty, raw)?),
        Type::OID => NativeValue::Int(u32::from_sql(ty, raw)? as i64),
        Type::FLOAT4 => NativeValue::Float(f32::from_sql(ty, raw)? as f64),
        Type::FLOAT8 => NativeValue::Float(f64::from_sql(ty, raw)?),
        Type::NUMERIC => decode_numeric(raw)?,
        Type::TIMESTAMP => NativeValue::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
        Type::TIMESTAMPTZ => NativeValue::TimestampTz(DateTime::<Utc>::from_sql(ty, raw)?),
        Type::DATE => NativeValue::Date(NaiveDate::from_sql(ty, raw)?),
        Type::TIME => NativeValue::Time(NaiveTime::from_sql(ty, raw)?),
        Type::TIMETZ => decode_timetz(raw)?,
        Type::INTERVAL => NativeValue::Other(decode_interval(raw)?),
        Type::BYTEA => NativeValue::Binary(raw.to_vec()),
        Type::TEXT => NativeValue::Clob(String::from_sql(ty, raw)?),
        Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            NativeValue::Other(std::str::from_utf8(raw)?.to_string())
        }
        Type::CHAR => NativeValue::Other(((i8::from_sql(ty, raw)? as u8) as char).to_string()),
        Type::JSON | Type::JSONB => {
            NativeValue::Other(serde_json::Value::from_sql(ty, raw)?.to_string())
        }
        Type::UUID => NativeValue::Other(uuid::Uuid::from_sql(ty, raw)?.to_string()),
        _ => match ty.kind() {
            Kind::Array(element) => decode_array(element, raw)?,
            Kind::Domain(base) => decode_value(base, raw)?,
            Kind::Enum(_) => NativeValue::Other(std::str::from_utf8(raw)?.to_string()),
            _ => decode_unknown(ty, raw),
        },
    };
    Ok(value)
}

/// Falls back to the raw payload: printable UTF-8 as text, anything else as
/// binary.
fn decode_unknown(ty: &Type, raw: &[u8]) -> NativeValue {
    match std::str::from_utf8(raw) {
        Ok(text) if !text.chars().any(|c| c.is_control() && !c.is_whitespace()) => {
            NativeValue::Other(text.to_string())
        }
        _ => {
            warn!(pg_type = %ty.name(), "No decoder for column type, emitting base64");
            NativeValue::Binary(raw.to_vec())
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        if self.buf.len() < n {
            return Err("unexpected end of value".into());
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn i16(&mut self) -> DecodeResult<i16> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn u16(&mut self) -> DecodeResult<u16> {
        Ok(self.i16()? as u16)
    }

    fn i32(&mut self) -> DecodeResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u32(&mut self) -> DecodeResult<u32> {
        Ok(self.i32()? as u32)
    }

    fn i64(&mut self) -> DecodeResult<i64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(i64::from_be_bytes(arr))
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Postgres NUMERIC: base-10000 digit groups with a weight and display scale.
fn decode_numeric(raw: &[u8]) -> DecodeResult<NativeValue> {
    let mut r = Reader::new(raw);
    let ndigits = r.i16()?;
    let weight = r.i16()? as i64;
    let sign = r.u16()?;
    let dscale = r.u16()? as i64;

    match sign {
        NUMERIC_NAN => return Ok(NativeValue::Other("NaN".into())),
        NUMERIC_PINF => return Ok(NativeValue::Other("Infinity".into())),
        NUMERIC_NINF => return Ok(NativeValue::Other("-Infinity".into())),
        _ => {}
    }

    let mut digits = BigInt::from(0);
    for _ in 0..ndigits {
        let group = r.i16()?;
        if !(0..10_000).contains(&group) {
            return Err(format!("invalid numeric digit group {group}").into());
        }
        digits = digits * 10_000 + BigInt::from(group);
    }
    if sign == NUMERIC_NEG {
        digits = -digits;
    }

    let scale = if ndigits == 0 {
        0
    } else {
        -4 * (weight - ndigits as i64 + 1)
    };
    let value = BigDecimal::new(digits, scale).with_scale(dscale);
    Ok(NativeValue::Decimal(value))
}

/// TIMETZ: microseconds since midnight followed by the zone as seconds
/// west of UTC.
fn decode_timetz(raw: &[u8]) -> DecodeResult<NativeValue> {
    let mut r = Reader::new(raw);
    let micros = r.i64()?;
    let zone_west = r.i32()?;

    let secs = (micros / 1_000_000) as u32;
    let nanos = ((micros % 1_000_000) * 1_000) as u32;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .ok_or_else(|| format!("time out of range: {micros}us"))?;

    Ok(NativeValue::TimeTz {
        time,
        offset_seconds: -zone_west,
    })
}

/// INTERVAL rendered the way `IntervalStyle = postgres` prints it.
fn decode_interval(raw: &[u8]) -> DecodeResult<String> {
    let mut r = Reader::new(raw);
    let micros = r.i64()?;
    let days = r.i32()?;
    let months = r.i32()?;

    let mut parts = Vec::new();
    let (years, months) = (months / 12, months % 12);
    let unit = |n: i32, one: &str, many: &str| format!("{n} {}", if n.abs() == 1 { one } else { many });
    if years != 0 {
        parts.push(unit(years, "year", "years"));
    }
    if months != 0 {
        parts.push(unit(months, "mon", "mons"));
    }
    if days != 0 {
        parts.push(unit(days, "day", "days"));
    }
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let abs = micros.unsigned_abs();
        let secs = abs / 1_000_000;
        let frac = abs % 1_000_000;
        let mut clock = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        );
        if frac != 0 {
            let digits = format!("{frac:06}");
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }
    Ok(parts.join(" "))
}

/// Binary array: header, per-dimension bounds, then length-prefixed
/// elements in row-major order.
fn decode_array(element: &Type, raw: &[u8]) -> DecodeResult<NativeValue> {
    let mut r = Reader::new(raw);
    let ndim = r.i32()?;
    let _has_nulls = r.i32()?;
    let _element_oid = r.u32()?;

    if ndim == 0 {
        return Ok(NativeValue::Array(Vec::new()));
    }
    if ndim < 0 {
        return Err(format!("invalid array dimension count {ndim}").into());
    }

    let mut dims = Vec::with_capacity(ndim as usize);
    for _ in 0..ndim {
        let len = r.i32()?;
        let _lower_bound = r.i32()?;
        if len < 0 {
            return Err(format!("invalid array length {len}").into());
        }
        dims.push(len as usize);
    }

    let total: usize = dims.iter().product();
    let mut flat = Vec::with_capacity(total);
    for _ in 0..total {
        let len = r.i32()?;
        if len < 0 {
            flat.push(NativeValue::Null);
        } else {
            let bytes = r.take(len as usize)?;
            flat.push(decode_value(element, bytes)?);
        }
    }

    let mut items = flat.into_iter();
    Ok(nest(&dims, &mut items))
}

fn nest(dims: &[usize], items: &mut impl Iterator<Item = NativeValue>) -> NativeValue {
    match dims.split_first() {
        Some((&len, [])) => NativeValue::Array(items.by_ref().take(len).collect()),
        Some((&len, rest)) => NativeValue::Array((0..len).map(|_| nest(rest, items)).collect()),
        None => NativeValue::Array(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::value::ScalarValue;
    use std::str::FromStr;

    fn numeric(ndigits: i16, weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&ndigits.to_be_bytes());
        buf.extend_from_slice(&weight.to_be_bytes());
        buf.extend_from_slice(&sign.to_be_bytes());
        buf.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            buf.extend_from_slice(&d.to_be_bytes());
        }
        buf
    }

    fn decimal(raw: &[u8]) -> BigDecimal {
        match decode_numeric(raw).unwrap() {
            NativeValue::Decimal(d) => d,
            other => panic!("expected decimal, got {other:?}"),
        }
    }

    #[test]
    fn numeric_keeps_scale_and_sign() {
        let raw = numeric(3, 1, 0, 3, &[1, 2345, 6780]);
        assert_eq!(decimal(&raw).to_string(), "12345.678");

        let raw = numeric(1, -1, NUMERIC_NEG, 2, &[100]);
        assert_eq!(decimal(&raw), BigDecimal::from_str("-0.01").unwrap());

        let raw = numeric(0, 0, 0, 2, &[]);
        assert_eq!(decimal(&raw).to_string(), "0.00");

        let raw = numeric(1, 2, 0, 0, &[7]);
        assert_eq!(decimal(&raw).to_string(), "700000000");
    }

    #[test]
    fn numeric_special_values() {
        let raw = numeric(0, 0, NUMERIC_NAN, 0, &[]);
        assert_eq!(decode_numeric(&raw).unwrap(), NativeValue::Other("NaN".into()));
    }

    #[test]
    fn timetz_drops_zone_on_normalize() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&((13 * 3600 + 30 * 60) as i64 * 1_000_000).to_be_bytes());
        raw.extend_from_slice(&(-7200i32).to_be_bytes());

        let value = decode_timetz(&raw).unwrap();
        assert!(matches!(
            value,
            NativeValue::TimeTz {
                offset_seconds: 7200,
                ..
            }
        ));
        assert_eq!(normalize(value), ScalarValue::String("13:30:00".into()));
    }

    #[test]
    fn interval_rendering() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(3_723_500_000i64).to_be_bytes());
        raw.extend_from_slice(&3i32.to_be_bytes());
        raw.extend_from_slice(&14i32.to_be_bytes());
        assert_eq!(
            decode_interval(&raw).unwrap(),
            "1 year 2 mons 3 days 01:02:03.5"
        );
    }

    fn int4_array(dims: &[i32], items: &[Option<i32>]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(dims.len() as i32).to_be_bytes());
        buf.extend_from_slice(&0i32.to_be_bytes());
        buf.extend_from_slice(&Type::INT4.oid().to_be_bytes());
        for d in dims {
            buf.extend_from_slice(&d.to_be_bytes());
            buf.extend_from_slice(&1i32.to_be_bytes());
        }
        for item in items {
            match item {
                Some(v) => {
                    buf.extend_from_slice(&4i32.to_be_bytes());
                    buf.extend_from_slice(&v.to_be_bytes());
                }
                None => buf.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        buf
    }

    #[test]
    fn arrays_decode_with_nulls_and_nesting() {
        let raw = int4_array(&[3], &[Some(1), None, Some(3)]);
        let value = decode_value(&Type::INT4_ARRAY, &raw).unwrap();
        assert_eq!(normalize(value), ScalarValue::String("[1, null, 3]".into()));

        let raw = int4_array(&[2, 2], &[Some(1), Some(2), Some(3), Some(4)]);
        let value = decode_value(&Type::INT4_ARRAY, &raw).unwrap();
        assert_eq!(
            normalize(value),
            ScalarValue::String("[[1, 2], [3, 4]]".into())
        );

        let raw = int4_array(&[], &[]);
        let value = decode_value(&Type::INT4_ARRAY, &raw).unwrap();
        assert_eq!(normalize(value), ScalarValue::String("[]".into()));
    }

    #[test]
    fn bytea_is_base64_after_normalize() {
        let value = decode_value(&Type::BYTEA, &[0xde, 0xad, 0xbe, 0xef]).unwrap();
        assert_eq!(normalize(value), ScalarValue::String("3q2+7w==".into()));
    }

    #[test]
    fn truncated_value_is_an_error() {
        assert!(decode_value(&Type::NUMERIC, &[0, 1]).is_err());
        assert!(decode_value(&Type::INT4_ARRAY, &[0, 0, 0, 1]).is_err());
    }

    #[test]
    fn unknown_types_fall_back_to_text_or_binary() {
        assert_eq!(
            decode_unknown(&Type::INET, b"10.0.0.1"),
            NativeValue::Other("10.0.0.1".into())
        );
        let value = decode_unknown(&Type::INET, &[2, 32, 0, 4, 10, 0, 0, 1]);
        assert_eq!(
            normalize(value),
            ScalarValue::String(STANDARD.encode([2u8, 32, 0, 4, 10, 0, 0, 1]))
        );
    }
}
