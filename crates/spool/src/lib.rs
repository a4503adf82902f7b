//! spool: request/response exchange over a shared directory tree.
//!
//! Layout: `<root>/{Requests,Responses}/<device_id>/<request_id>.json`

mod error;

pub mod emitter;
pub mod message;
pub mod observer;
pub mod paths;
pub mod store;
pub mod wait;

pub use emitter::{EmitterConfig, PendingRequest, RequestEmitter, SendOutcome};
pub use error::{Result, SpoolError};
pub use message::{MalformedMessage, MessageId, RequestRecord, ResponseRecord};
pub use observer::{CancellationToken, ObserverConfig, QueueObserver, QueueSnapshot};
pub use paths::{PathResolver, QueueKind};
pub use store::Spool;
pub use wait::WaitStrategy;
