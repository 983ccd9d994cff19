use serde::Serialize;
use serde_json::{Map, Value};

/// Keys whose values are masked before anything is persisted, compared
/// case-insensitively at every nesting depth.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "token",
    "access_token",
    "refresh_token",
    "credit_card",
    "cvv",
    "api_key",
    "secret",
];

const MASK: &str = "*****";

/// Returned by [`safe_stringify`] when serialization fails; logging must
/// never break the request being logged.
pub const STRINGIFY_ERROR_MARKER: &str = r#"{"error": "Failed to stringify data"}"#;

/// Recursively masks sensitive fields in a JSON value. Operates on a copy:
/// the caller may still need the original for the HTTP response.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        Value::Object(map) => {
            let mut sanitized = Map::with_capacity(map.len());
            for (key, item) in map {
                if is_sensitive_key(key) {
                    sanitized.insert(key.clone(), Value::String(MASK.to_string()));
                } else {
                    sanitized.insert(key.clone(), sanitize(item));
                }
            }
            Value::Object(sanitized)
        }
        scalar => scalar.clone(),
    }
}

/// Serializes to JSON text without ever failing; a value that cannot be
/// serialized becomes a fixed error marker instead.
pub fn safe_stringify<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| STRINGIFY_ERROR_MARKER.to_string())
}

/// Sanitizes then stringifies, the combination every persisted free-form
/// payload goes through.
pub fn sanitize_to_string(value: &Value) -> String {
    safe_stringify(&sanitize(value))
}

fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    SENSITIVE_KEYS.contains(&lowered.as_str())
}
