use std::path::PathBuf;

use thiserror::Error;

use crate::message::codec::MalformedMessage;

#[derive(Debug, Error)]
pub enum SpoolError {
    /// Directory creation, write, rename, read or listing failed.
    #[error("storage failure at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file exists where a message was expected but does not decode.
    #[error("malformed message at {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: MalformedMessage,
    },

    #[error("invalid {kind} '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("filesystem watch failed: {0}")]
    Watch(#[from] notify::Error),
}

impl SpoolError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

pub type Result<T> = std::result::Result<T, SpoolError>;
