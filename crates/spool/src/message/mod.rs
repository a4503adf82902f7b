//! Queue message formats.
//!
//! - **protocol**: identifiers and record types
//! - **codec**: JSON encoding/decoding of file payloads

pub mod codec;
pub mod protocol;

pub use codec::MalformedMessage;
pub use protocol::{MessageId, RequestRecord, ResponseRecord};
