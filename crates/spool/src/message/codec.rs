//! JSON codec for queue files.
//!
//! Payloads are pretty-printed (2-space indent, trailing newline) so queue
//! directories stay readable by hand. Decoding only guarantees a JSON object;
//! field-level checks are opt-in via [`decode_request`].

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::protocol::{MessageId, RequestRecord, ResponseRecord};

/// Payload that cannot be interpreted as a queue message.
#[derive(Debug, Error)]
pub enum MalformedMessage {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("field '{field}' {problem}")]
    Field {
        field: &'static str,
        problem: &'static str,
    },
}

pub fn encode<T: Serialize>(record: &T) -> serde_json::Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(record)?;
    bytes.push(b'\n');
    tracing::trace!(size_bytes = bytes.len(), "Encoded message");
    Ok(bytes)
}

/// Decode a payload into a field map.
pub fn decode(bytes: &[u8]) -> Result<Map<String, Value>, MalformedMessage> {
    match serde_json::from_slice::<Value>(bytes).map_err(MalformedMessage::InvalidJson)? {
        Value::Object(fields) => Ok(fields),
        other => Err(MalformedMessage::NotAnObject(json_type_name(&other))),
    }
}

pub fn decode_response(bytes: &[u8]) -> Result<ResponseRecord, MalformedMessage> {
    decode(bytes).map(ResponseRecord::from)
}

/// Decode a request, requiring all four fields as strings.
pub fn decode_request(bytes: &[u8]) -> Result<RequestRecord, MalformedMessage> {
    let mut fields = decode(bytes)?;

    let request_id = take_string(&mut fields, "request_id")?;
    let request_id = MessageId::parse(&request_id).map_err(|_| MalformedMessage::Field {
        field: "request_id",
        problem: "is not a valid identifier",
    })?;

    Ok(RequestRecord {
        request_type: take_string(&mut fields, "request_type")?,
        request_id,
        timestamp: take_string(&mut fields, "timestamp")?,
        device_id: take_string(&mut fields, "device_id")?,
    })
}

fn take_string(
    fields: &mut Map<String, Value>,
    field: &'static str,
) -> Result<String, MalformedMessage> {
    match fields.remove(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(MalformedMessage::Field {
            field,
            problem: "must be a string",
        }),
        None => Err(MalformedMessage::Field {
            field,
            problem: "is missing",
        }),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
