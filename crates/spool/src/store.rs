//! File-level operations on the request and response queues.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::{Result, SpoolError};
use crate::message::codec::{self, MalformedMessage};
use crate::message::{MessageId, RequestRecord, ResponseRecord};
use crate::paths::{PathResolver, QueueKind, ensure_dir};

/// Both queues under one storage root.
#[derive(Debug, Clone)]
pub struct Spool {
    resolver: PathResolver,
}

impl Spool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            resolver: PathResolver::new(root),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Write a request into its device's requests queue.
    pub async fn write_request(&self, request: &RequestRecord) -> Result<PathBuf> {
        let path = self
            .resolver
            .prepare(QueueKind::Requests, &request.device_id, &request.request_id)
            .await?;
        write_atomic(&path, &codec::encode(request)?).await?;
        tracing::debug!(path = %path.display(), request_id = %request.request_id, "Wrote request");
        Ok(path)
    }

    pub async fn read_request(&self, device_id: &str, id: &MessageId) -> Result<RequestRecord> {
        let path = self
            .resolver
            .message_path(QueueKind::Requests, device_id, id)?;
        read_message(&path, codec::decode_request).await
    }

    /// Publish a response at the path mirroring its request.
    ///
    /// This is the responder side of the exchange; the emitter never calls it.
    pub async fn write_response(
        &self,
        device_id: &str,
        id: &MessageId,
        response: &ResponseRecord,
    ) -> Result<PathBuf> {
        let path = self
            .resolver
            .prepare(QueueKind::Responses, device_id, id)
            .await?;
        write_atomic(&path, &codec::encode(response)?).await?;
        tracing::debug!(path = %path.display(), request_id = %id, "Wrote response");
        Ok(path)
    }

    pub async fn read_response(&self, device_id: &str, id: &MessageId) -> Result<ResponseRecord> {
        let path = self
            .resolver
            .message_path(QueueKind::Responses, device_id, id)?;
        read_message(&path, codec::decode_response).await
    }

    pub async fn has_response(&self, device_id: &str, id: &MessageId) -> Result<bool> {
        let path = self
            .resolver
            .message_path(QueueKind::Responses, device_id, id)?;
        exists(&path).await
    }

    /// Identifiers of all request files for a device, sorted by name.
    ///
    /// Temp files and names that are not valid identifiers are skipped.
    pub async fn list_requests(&self, device_id: &str) -> Result<Vec<MessageId>> {
        let dir = self.resolver.device_dir(QueueKind::Requests, device_id)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SpoolError::storage(dir, e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SpoolError::storage(&dir, e))?
        {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            match MessageId::parse(stem) {
                Ok(id) => ids.push(id),
                Err(_) => tracing::debug!(name = stem, "Skipping unexpected queue entry"),
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Requests for a device that have no response yet.
    pub async fn pending_requests(&self, device_id: &str) -> Result<Vec<MessageId>> {
        let mut pending = Vec::new();
        for id in self.list_requests(device_id).await? {
            if !self.has_response(device_id, &id).await? {
                pending.push(id);
            }
        }
        Ok(pending)
    }
}

/// Write `bytes` to a sibling temp file, flush it to disk, then rename it
/// over `path` so readers never observe a partial file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }

    let tmp = temp_path(path);
    if let Err(e) = write_synced(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(SpoolError::storage(tmp, e));
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(SpoolError::storage(path, e));
    }

    if let Some(parent) = path.parent() {
        sync_dir(parent).await?;
    }
    Ok(())
}

/// Flush a directory so a rename inside it survives a crash.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<()> {
    let handle = tokio::fs::File::open(dir)
        .await
        .map_err(|e| SpoolError::storage(dir, e))?;
    handle
        .sync_all()
        .await
        .map_err(|e| SpoolError::storage(dir, e))
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("message"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read and decode a queue file, attributing decode failures to `path`.
pub async fn read_message<T>(
    path: &Path,
    decode: impl FnOnce(&[u8]) -> std::result::Result<T, MalformedMessage>,
) -> Result<T> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SpoolError::storage(path, e))?;
    decode(&bytes).map_err(|source| SpoolError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

pub async fn exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| SpoolError::storage(path, e))
}
