//! BSON-flavoured views over JSON document values
//!
//! Documents are `serde_json::Value`. Dates use relaxed Extended JSON,
//! `{"$date": "2024-01-01T00:00:00.000Z"}`, so they survive a JSON round
//! trip and are told apart from ordinary objects.

use std::sync::OnceLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{json, Number, Value};

/// Extended JSON key for dates
pub const DATE_KEY: &str = "$date";

/// Pattern the `email` string check compiles to
pub const EMAIL_PATTERN: &str = r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$";

/// Pattern the `uuid` string check compiles to
pub const UUID_PATTERN: &str =
    r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$";

const URL_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9+.-]*://[^\s/?#]+[^\s]*$";

pub(crate) fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern is valid"))
}

pub(crate) fn uuid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(UUID_PATTERN).expect("uuid pattern is valid"))
}

pub(crate) fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(URL_PATTERN).expect("url pattern is valid"))
}

/// Encodes a date as an Extended JSON value
pub fn date_value(at: DateTime<Utc>) -> Value {
    json!({ DATE_KEY: at.to_rfc3339_opts(SecondsFormat::Millis, true) })
}

/// Decodes an Extended JSON date
pub fn as_date(value: &Value) -> Option<DateTime<Utc>> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    let text = obj.get(DATE_KEY)?.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Returns the BSON type name of a value
pub fn bson_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) => match n.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => "int",
            Some(_) => "long",
            None => "double",
        },
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => {
            if as_date(value).is_some() {
                "date"
            } else {
                "object"
            }
        }
    }
}

/// Checks a value against a `bsonType` name, including the `number` alias
pub fn type_matches(type_name: &str, value: &Value) -> bool {
    let actual = bson_type(value);
    match type_name {
        "number" => matches!(actual, "int" | "long" | "double"),
        other => other == actual,
    }
}

/// True when `value` is a whole multiple of `divisor`
pub fn is_multiple_of(value: f64, divisor: f64) -> bool {
    if divisor == 0.0 {
        return false;
    }
    let quotient = value / divisor;
    (quotient - quotient.round()).abs() < 1e-9
}

/// Integral floats are emitted as JSON integers so validators read naturally
pub fn number_value(value: f64) -> Option<Value> {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Some(Value::Number(Number::from(value as i64)))
    } else {
        Number::from_f64(value).map(Value::Number)
    }
}

/// Creates a field path from prefix and field name.
pub fn make_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}
