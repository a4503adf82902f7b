//! Queue directory layout.
//!
//! Path format: `{root}/{Requests|Responses}/{device_id}/{message_id}.json`
//!
//! Resolution is pure. [`PathResolver::prepare`] additionally creates the
//! device directory so the returned path can be written immediately.

use std::path::{Path, PathBuf};

use crate::error::{Result, SpoolError};
use crate::message::MessageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Requests,
    Responses,
}

impl QueueKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Requests => "Requests",
            Self::Responses => "Responses",
        }
    }

    /// The queue an answer to this one lands in (and vice versa).
    pub fn mirror(&self) -> Self {
        match self {
            Self::Requests => Self::Responses,
            Self::Responses => Self::Requests,
        }
    }
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn queue_root(&self, kind: QueueKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn device_dir(&self, kind: QueueKind, device_id: &str) -> Result<PathBuf> {
        validate_component("device id", device_id)?;
        Ok(self.queue_root(kind).join(device_id))
    }

    pub fn message_path(
        &self,
        kind: QueueKind,
        device_id: &str,
        id: &MessageId,
    ) -> Result<PathBuf> {
        Ok(self.device_dir(kind, device_id)?.join(id.file_name()))
    }

    /// Resolve a message path for writing, creating its directory first.
    pub async fn prepare(
        &self,
        kind: QueueKind,
        device_id: &str,
        id: &MessageId,
    ) -> Result<PathBuf> {
        let dir = self.device_dir(kind, device_id)?;
        ensure_dir(&dir).await?;
        Ok(dir.join(id.file_name()))
    }

    pub async fn ensure_queue_root(&self, kind: QueueKind) -> Result<PathBuf> {
        let dir = self.queue_root(kind);
        ensure_dir(&dir).await?;
        Ok(dir)
    }
}

/// Recursive, idempotent directory creation.
pub(crate) async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SpoolError::storage(dir, e))?;
    tracing::trace!(dir = %dir.display(), "Ensured directory");
    Ok(())
}

/// Identifiers become file and directory names, so each must be exactly one
/// normal path component.
pub fn validate_component(kind: &'static str, value: &str) -> Result<()> {
    let reason = if value.is_empty() {
        "must not be empty"
    } else if value == "." || value == ".." {
        "must not be a relative path segment"
    } else if value.contains(['/', '\\', '\0']) {
        "must be a single path component"
    } else {
        return Ok(());
    };

    Err(SpoolError::InvalidIdentifier {
        kind,
        value: value.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> MessageId {
        MessageId::parse(s).unwrap()
    }

    #[test]
    fn message_path_follows_layout() {
        let resolver = PathResolver::new("/srv/cloud");
        let path = resolver
            .message_path(QueueKind::Requests, "truck-001", &id("req-1"))
            .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/srv/cloud/Requests/truck-001/req-1.json")
        );

        let path = resolver
            .message_path(QueueKind::Responses, "truck-001", &id("req-1"))
            .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/srv/cloud/Responses/truck-001/req-1.json")
        );
    }

    #[test]
    fn queue_kinds_mirror_each_other() {
        assert_eq!(QueueKind::Requests.mirror(), QueueKind::Responses);
        assert_eq!(QueueKind::Responses.mirror(), QueueKind::Requests);
    }

    #[tokio::test]
    async fn prepare_creates_device_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(tmp.path());

        let path = resolver
            .prepare(QueueKind::Responses, "truck-001", &id("req-1"))
            .await
            .unwrap();

        assert!(tmp.path().join("Responses/truck-001").is_dir());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn prepare_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(tmp.path());

        let first = resolver
            .prepare(QueueKind::Requests, "truck-001", &id("req-1"))
            .await
            .unwrap();
        let second = resolver
            .prepare(QueueKind::Requests, "truck-001", &id("req-1"))
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn invalid_device_is_rejected_before_touching_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(tmp.path());

        let err = resolver
            .prepare(QueueKind::Requests, "../other", &id("req-1"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SpoolError::InvalidIdentifier {
                kind: "device id",
                ..
            }
        ));
        assert!(!tmp.path().join("Requests").exists());
    }

    #[tokio::test]
    async fn prepare_surfaces_storage_failures() {
        let tmp = tempfile::tempdir().unwrap();
        // A regular file where the queue root directory should be.
        std::fs::write(tmp.path().join("Requests"), b"").unwrap();
        let resolver = PathResolver::new(tmp.path());

        let err = resolver
            .prepare(QueueKind::Requests, "truck-001", &id("req-1"))
            .await
            .unwrap_err();

        assert!(err.is_storage());
    }

    #[test]
    fn validate_component_rules() {
        assert!(validate_component("device id", "truck-001").is_ok());
        assert!(validate_component("device id", "").is_err());
        assert!(validate_component("device id", ".").is_err());
        assert!(validate_component("device id", "a\\b").is_err());
        assert!(validate_component("device id", "a\0b").is_err());
    }
}
