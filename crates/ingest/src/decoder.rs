//! Payload decoder
//!
//! Topic messages are expected to carry a UTF-8 JSON object. Bytes are decoded
//! lossily (invalid sequences become U+FFFD) before parsing, so a payload with a
//! stray invalid byte inside a string still decodes.

use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Decoded message fields
pub type DecodedPayload = Map<String, Value>;

/// Decode a raw topic message payload into its fields
pub fn decode(payload: &[u8]) -> Result<DecodedPayload, DecodeError> {
    let text = String::from_utf8_lossy(payload);
    // A leading byte order mark is dropped, as a text decoder does
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    match serde_json::from_str::<Value>(text)? {
        Value::Object(fields) => Ok(fields),
        other => Err(DecodeError::NotAnObject(json_kind(&other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
