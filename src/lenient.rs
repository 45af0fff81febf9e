//! Forgiving scalar deserializers for JSON written by a model or a loosely
//! specified upstream API. A value of the wrong shape becomes `None` instead
//! of failing the whole document.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

pub(crate) fn value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Option::<Value>::deserialize(deserializer)
}

pub(crate) fn ignored<T>(kind: &str, value: &Value) -> Option<T> {
    warn!(%value, "ignoring value that is not a {kind}");
    None
}

/// Non-empty trimmed text. Numbers are stringified.
pub(crate) fn string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match value(deserializer)? {
        None => None,
        Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => ignored("string", &other),
    })
}

/// A finite number, also accepted as text such as `"$1,299.99"`.
pub(crate) fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match value(deserializer)? {
        None => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let cleaned = s.trim().trim_start_matches('$').replace(',', "");
            match cleaned.parse::<f64>() {
                Ok(v) if v.is_finite() => Some(v),
                _ => ignored("number", &Value::String(s)),
            }
        }
        Some(other) => ignored("number", &other),
    })
}

pub(crate) fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(match value(deserializer)? {
        None => None,
        Some(Value::Number(n)) => match n.as_u64().and_then(|v| u32::try_from(v).ok()) {
            Some(v) => Some(v),
            None => ignored("count", &Value::Number(n)),
        },
        Some(Value::String(s)) => match s.trim().parse::<u32>() {
            Ok(v) => Some(v),
            Err(_) => ignored("count", &Value::String(s)),
        },
        Some(other) => ignored("count", &other),
    })
}

pub(crate) fn boolean<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<bool>, D::Error> {
    Ok(match value(deserializer)? {
        None => None,
        Some(Value::Bool(b)) => Some(b),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => ignored("boolean", &Value::String(s)),
        },
        Some(other) => ignored("boolean", &other),
    })
}
