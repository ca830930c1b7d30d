//! Timestamp coercion
//!
//! Stored dates arrive as RFC 3339 strings, bare dates, epoch milliseconds,
//! store-native `{"$date": ...}` wrappers, or garbage. Everything that parses
//! becomes a canonical RFC 3339 string; everything else becomes the epoch.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

/// Key of the store-native extended date wrapper
pub const DATE_WRAPPER: &str = "$date";
const NUMBER_LONG: &str = "$numberLong";

/// Placeholder instant for dates that cannot be recovered
#[inline]
#[must_use]
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Canonical JSON representation of an instant
#[inline]
#[must_use]
pub fn timestamp_value(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Parse any supported timestamp representation
#[must_use]
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_str(s),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(from_millis),
        Value::Object(map) => match map.get(DATE_WRAPPER)? {
            Value::Object(inner) => match inner.get(NUMBER_LONG)? {
                Value::String(s) => s.trim().parse::<i64>().ok().and_then(from_millis),
                other => parse_timestamp(other),
            },
            other => parse_timestamp(other),
        },
        _ => None,
    }
}

/// Coerce a value to a canonical timestamp, defaulting to the epoch
#[must_use]
pub fn coerce_timestamp(value: &Value) -> Value {
    let parsed = parse_timestamp(value);
    if parsed.is_none() {
        tracing::debug!(?value, "unparsable timestamp replaced with epoch");
    }
    timestamp_value(parsed.unwrap_or_else(epoch))
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn parse_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
