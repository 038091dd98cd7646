//! Typed values and column types
//!
//! Every cell in a row is a [`Value`]; the type of a column is fixed at
//! CREATE TABLE time as a [`DataType`]. Primary keys sort in the natural
//! order of their type: int64 numerically, varchar and binary by byte
//! order, date and timestamp by instant. A table's PK type never changes,
//! so the derived cross-variant ordering never decides a real comparison.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A row: column name → value. Missing columns read as null.
pub type Row = BTreeMap<String, Value>;

/// Days from 0001-01-01 (chrono's day 1) to 1970-01-01.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Column type, fixed at CREATE TABLE time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int64,
    Varchar,
    Boolean,
    Date,
    Timestamp,
    Binary,
}

impl DataType {
    /// Parse a DDL type keyword (case-insensitive)
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "int64" => Some(DataType::Int64),
            "varchar" => Some(DataType::Varchar),
            "boolean" | "bool" => Some(DataType::Boolean),
            "date" => Some(DataType::Date),
            "timestamp" => Some(DataType::Timestamp),
            "binary" => Some(DataType::Binary),
            _ => None,
        }
    }

    /// Canonical DDL spelling, used by DESCRIBE and SHOW CREATE TABLE
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int64 => "int64",
            DataType::Varchar => "varchar",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Timestamp => "timestamp",
            DataType::Binary => "binary",
        }
    }
}

/// A typed value
///
/// Variant order matches the codec tag order (NULL=0 … BINARY=6), so the
/// derived `Ord` agrees with the on-disk tag for same-type comparisons.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    Null,
    Int(i64),
    Varchar(String),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Binary(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// JSON encoding for the wire: binary as base64, date/timestamp as ISO
    /// strings with millisecond precision
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Varchar(s) => serde_json::Value::from(s.as_str()),
            Value::Bool(b) => serde_json::Value::from(*b),
            Value::Date(d) => serde_json::Value::from(format_date(d)),
            Value::Timestamp(t) => serde_json::Value::from(format_timestamp(t)),
            Value::Binary(b) => serde_json::Value::from(BASE64.encode(b)),
        }
    }
}

// =============================================================================
// Date / timestamp conversions
// =============================================================================

/// `YYYY-MM-DD`
pub fn format_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// `YYYY-MM-DDTHH:MM:SS.sssZ` — always exactly three fractional digits
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Days since 1970-01-01, the on-disk DATE payload
pub fn date_to_days(d: &NaiveDate) -> i32 {
    d.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

pub fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE)
}

/// Milliseconds since the epoch, the on-disk TIMESTAMP payload
pub fn timestamp_to_millis(t: &DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub fn timestamp_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
