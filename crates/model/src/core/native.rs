use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// A column value as decoded from the driver, before normalization.
///
/// Variants follow the source type families the normalizer distinguishes;
/// anything without a dedicated rule is carried as its default text form.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    TimeTz {
        time: NaiveTime,
        /// Seconds east of UTC.
        offset_seconds: i32,
    },
    Decimal(BigDecimal),
    Boolean(bool),
    Int(i64),
    Float(f64),
    Binary(Vec<u8>),
    /// Character large object, read in full.
    Clob(String),
    /// Binary large object, read in full.
    Blob(Vec<u8>),
    Array(Vec<NativeValue>),
    Other(String),
}
