use crate::core::{native::NativeValue, value::ScalarValue};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{Local, NaiveDateTime, NaiveTime};

const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Converts a decoded column value into its portable form.
///
/// | source | result |
/// |---|---|
/// | timestamp / timestamptz | ISO-8601 local date-time string |
/// | date | ISO-8601 date string |
/// | time / timetz | ISO-8601 time string, zone dropped |
/// | decimal | exact decimal |
/// | boolean | boolean |
/// | binary, blob | standard base64 |
/// | clob | full text |
/// | array | `[a, b, c]` |
/// | anything else | default string representation |
pub fn normalize(value: NativeValue) -> ScalarValue {
    match value {
        NativeValue::Null => ScalarValue::Null,
        NativeValue::Timestamp(ts) => ScalarValue::String(format_date_time(&ts)),
        NativeValue::TimestampTz(ts) => {
            ScalarValue::String(format_date_time(&ts.with_timezone(&Local).naive_local()))
        }
        NativeValue::Date(date) => ScalarValue::String(date.format(DATE_FORMAT).to_string()),
        NativeValue::Time(time) | NativeValue::TimeTz { time, .. } => {
            ScalarValue::String(format_time(&time))
        }
        NativeValue::Decimal(v) => ScalarValue::Decimal(v),
        NativeValue::Boolean(v) => ScalarValue::Boolean(v),
        NativeValue::Int(v) => ScalarValue::Int(v),
        NativeValue::Float(v) => ScalarValue::Float(v),
        NativeValue::Binary(bytes) | NativeValue::Blob(bytes) => {
            ScalarValue::String(STANDARD.encode(bytes))
        }
        NativeValue::Clob(text) | NativeValue::Other(text) => ScalarValue::String(text),
        NativeValue::Array(items) => ScalarValue::String(array_repr(items)),
    }
}

fn format_date_time(ts: &NaiveDateTime) -> String {
    ts.format(DATE_TIME_FORMAT).to_string()
}

fn format_time(time: &NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

fn array_repr(items: Vec<NativeValue>) -> String {
    let parts: Vec<String> = items
        .into_iter()
        .map(|item| match item {
            NativeValue::Array(nested) => array_repr(nested),
            other => normalize(other).to_string(),
        })
        .collect();
    format!("[{}]", parts.join(", "))
}
