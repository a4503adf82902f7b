//! Record types exchanged through the queues.
//!
//! - **Request**: fixed four-field record written by a device
//! - **Response**: arbitrary JSON object written by an external responder

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::paths::validate_component;

/// Textual form of request timestamps (UTC, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Prefix for identifiers minted by the request emitter.
pub const REQUEST_ID_PREFIX: &str = "req-";

/// Identifier tying a request file to its response file.
///
/// Used verbatim as the file stem in both queues, so it is always a single
/// path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
    /// Mint a fresh request identifier (`req-<uuid v4>`).
    pub fn request() -> Self {
        Self(format!("{REQUEST_ID_PREFIX}{}", uuid::Uuid::new_v4()))
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        validate_component("message id", s)?;
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_request(&self) -> bool {
        self.0.starts_with(REQUEST_ID_PREFIX)
    }

    /// File name used for this message in either queue.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MessageId {
    type Error = crate::SpoolError;

    fn try_from(s: String) -> crate::Result<Self> {
        validate_component("message id", &s)?;
        Ok(Self(s))
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

impl AsRef<str> for MessageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Request written by a device. Field order is the on-disk order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub request_type: String,
    pub request_id: MessageId,
    pub timestamp: String,
    pub device_id: String,
}

impl RequestRecord {
    pub fn new(
        device_id: impl Into<String>,
        request_type: impl Into<String>,
        request_id: MessageId,
    ) -> Self {
        Self::at(device_id, request_type, request_id, Utc::now())
    }

    pub fn at(
        device_id: impl Into<String>,
        request_type: impl Into<String>,
        request_id: MessageId,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            request_type: request_type.into(),
            request_id,
            timestamp: created.format(TIMESTAMP_FORMAT).to_string(),
            device_id: device_id.into(),
        }
    }
}

/// Response written by the external responder.
///
/// No shape is imposed beyond being a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseRecord(Map<String, Value>);

impl ResponseRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// `request_id` field, if the responder followed the correlation convention.
    pub fn request_id(&self) -> Option<&str> {
        self.0.get("request_id").and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for ResponseRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}
