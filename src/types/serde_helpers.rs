//! Lenient deserializers for fields the server sends in more than one shape.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(i64),
    Float(f64),
    Str(String),
}

/// Accepts epoch milliseconds (number or numeric string), an RFC 3339 string,
/// or the Open API's `yyyy-MM-dd HH:mm:ss` form, which is Korea Standard Time.
pub fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<NumberOrString>::deserialize(deserializer)?;
    let parsed = match raw {
        None => return Ok(None),
        Some(NumberOrString::Int(ms)) => Utc.timestamp_millis_opt(ms).single(),
        Some(NumberOrString::Float(ms)) => Utc.timestamp_millis_opt(ms as i64).single(),
        Some(NumberOrString::Str(s)) => match s.parse::<i64>() {
            Ok(ms) => Utc.timestamp_millis_opt(ms).single(),
            Err(_) => DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|| parse_kst(&s)),
        },
    };
    parsed
        .map(Some)
        .ok_or_else(|| de::Error::custom("invalid timestamp"))
}

fn parse_kst(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()?;
    let kst = FixedOffset::east_opt(9 * 3600)?;
    kst.from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Accepts a decimal given as a JSON number or a numeric string.
pub fn optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Int(n)) => Ok(Some(Decimal::from(n))),
        Some(NumberOrString::Float(f)) => Decimal::try_from(f)
            .map(Some)
            .map_err(de::Error::custom),
        Some(NumberOrString::Str(s)) => Decimal::from_str(s.trim())
            .map(Some)
            .map_err(de::Error::custom),
    }
}

/// Accepts an unsigned integer given as a JSON number or a numeric string.
pub fn optional_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Int(n)) => u64::try_from(n).map(Some).map_err(de::Error::custom),
        Some(NumberOrString::Float(f)) if f >= 0.0 => Ok(Some(f as u64)),
        Some(NumberOrString::Float(f)) => Err(de::Error::custom(format!("negative value {}", f))),
        Some(NumberOrString::Str(s)) => s.trim().parse().map(Some).map_err(de::Error::custom),
    }
}

// Lenient variants for optional frame fields: a value that cannot be read
// decodes as `None` so the caller's default applies.

fn lenient<'de, D, T>(
    deserializer: D,
    read: fn(Value) -> Result<Option<T>, serde_json::Error>,
) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| read(v).ok().flatten()))
}

pub fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient(deserializer, optional_timestamp)
}

pub fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient(deserializer, optional_decimal)
}

pub fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient(deserializer, optional_u64)
}

/// Accepts `true`/`false`, their string forms, or `0`/`1`.
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Some(Value::Number(n)) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    })
}

/// Non-empty strings only.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    })
}

pub fn lenient_array<'de, D>(deserializer: D) -> Result<Option<Vec<Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => Some(items),
        _ => None,
    })
}
