//! Device side of the exchange.
//!
//! Flow:
//! 1. Mint a request id, build the request record
//! 2. Create both device queue directories
//! 3. Write the request atomically (flushed before rename)
//! 4. Wait for the mirrored response path, bounded by the response timeout
//! 5. Decode and return the response, or report a timeout

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{Result, SpoolError};
use crate::message::codec;
use crate::message::{MessageId, RequestRecord, ResponseRecord};
use crate::paths::QueueKind;
use crate::store::{Spool, read_message};
use crate::wait::{Arrival, MIN_INTERVAL, WaitStrategy, wait_for_file};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct EmitterConfig {
    pub root: PathBuf,
    pub poll_interval: Duration,
    pub response_timeout: Duration,
    pub wait_strategy: WaitStrategy,
}

impl EmitterConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            wait_strategy: WaitStrategy::Poll,
        }
    }

    /// Raised to [`MIN_INTERVAL`] if shorter.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_INTERVAL);
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_wait_strategy(mut self, strategy: WaitStrategy) -> Self {
        self.wait_strategy = strategy;
        self
    }
}

/// Terminal result of a send. A timeout is an outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Received {
        request: RequestRecord,
        request_path: PathBuf,
        response: ResponseRecord,
    },
    Timeout {
        request: RequestRecord,
        request_path: PathBuf,
        waited: Duration,
    },
}

impl SendOutcome {
    pub fn request(&self) -> &RequestRecord {
        match self {
            Self::Received { request, .. } | Self::Timeout { request, .. } => request,
        }
    }

    pub fn request_path(&self) -> &Path {
        match self {
            Self::Received { request_path, .. } | Self::Timeout { request_path, .. } => {
                request_path
            }
        }
    }

    pub fn response(&self) -> Option<&ResponseRecord> {
        match self {
            Self::Received { response, .. } => Some(response),
            Self::Timeout { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub struct RequestEmitter {
    config: EmitterConfig,
    spool: Spool,
}

impl RequestEmitter {
    pub fn new(config: EmitterConfig) -> Self {
        let spool = Spool::new(config.root.clone());
        Self { config, spool }
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    /// Write a request and wait for its response.
    pub async fn send(&self, device_id: &str, request_type: &str) -> Result<SendOutcome> {
        self.emit(device_id, request_type).await?.wait().await
    }

    /// Write a request without waiting. Call [`PendingRequest::wait`] to
    /// collect the response.
    pub async fn emit(&self, device_id: &str, request_type: &str) -> Result<PendingRequest> {
        if request_type.is_empty() {
            return Err(SpoolError::InvalidIdentifier {
                kind: "request type",
                value: String::new(),
                reason: "must not be empty",
            });
        }

        let request = RequestRecord::new(device_id, request_type, MessageId::request());
        let resolver = self.spool.resolver();

        // Validates the device id and creates the responses directory up front.
        let response_path = resolver
            .prepare(QueueKind::Responses, device_id, &request.request_id)
            .await?;
        let request_path = self.spool.write_request(&request).await?;

        tracing::info!(
            device_id,
            request_type,
            request_id = %request.request_id,
            "Request written"
        );

        Ok(PendingRequest {
            request,
            request_path,
            response_path,
            poll_interval: self.config.poll_interval,
            response_timeout: self.config.response_timeout,
            wait_strategy: self.config.wait_strategy,
        })
    }
}

/// A request on disk whose response has not been collected yet.
#[derive(Debug)]
pub struct PendingRequest {
    request: RequestRecord,
    request_path: PathBuf,
    response_path: PathBuf,
    poll_interval: Duration,
    response_timeout: Duration,
    wait_strategy: WaitStrategy,
}

impl PendingRequest {
    pub fn request(&self) -> &RequestRecord {
        &self.request
    }

    pub fn request_path(&self) -> &Path {
        &self.request_path
    }

    pub fn response_path(&self) -> &Path {
        &self.response_path
    }

    /// Wait for the response file.
    ///
    /// A response file that exists but does not decode fails immediately with
    /// [`SpoolError::Malformed`] instead of waiting out the timeout.
    pub async fn wait(self) -> Result<SendOutcome> {
        let started = Instant::now();
        let request_id = self.request.request_id.clone();

        let arrival = wait_for_file(
            &self.response_path,
            self.wait_strategy,
            self.poll_interval,
            self.response_timeout,
        )
        .await?;

        match arrival {
            Arrival::Present { checks } => {
                let response = read_message(&self.response_path, codec::decode_response).await?;

                if let Some(echoed) = response.request_id()
                    && echoed != request_id.as_str()
                {
                    tracing::warn!(
                        %request_id,
                        echoed,
                        "Response carries a different request_id"
                    );
                }

                tracing::info!(
                    %request_id,
                    checks,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Response received"
                );

                Ok(SendOutcome::Received {
                    request: self.request,
                    request_path: self.request_path,
                    response,
                })
            }
            Arrival::Absent { checks } => {
                let waited = started.elapsed();
                tracing::warn!(
                    %request_id,
                    checks,
                    waited_ms = waited.as_millis() as u64,
                    "No response within timeout"
                );
                Ok(SendOutcome::Timeout {
                    request: self.request,
                    request_path: self.request_path,
                    waited,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::codec::decode_request;
    use serde_json::json;

    const DEVICE: &str = "truck-001";

    fn fast_config(root: &Path) -> EmitterConfig {
        EmitterConfig::new(root)
            .with_poll_interval(Duration::from_millis(20))
            .with_response_timeout(Duration::from_millis(300))
    }

    /// Answers the first request that shows up for `device` after `delay`.
    /// Resolves to the moment the response landed.
    fn spawn_responder(
        root: PathBuf,
        device: &'static str,
        delay: Duration,
        body: &'static [u8],
    ) -> tokio::task::JoinHandle<Instant> {
        tokio::spawn(async move {
            let spool = Spool::new(&root);
            let id = loop {
                if let Some(id) = spool.list_requests(device).await.unwrap().pop() {
                    break id;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            };
            tokio::time::sleep(delay).await;
            let path = spool
                .resolver()
                .prepare(QueueKind::Responses, device, &id)
                .await
                .unwrap();
            crate::store::write_atomic(&path, body).await.unwrap();
            Instant::now()
        })
    }

    #[test]
    fn zero_poll_interval_is_raised() {
        let config = EmitterConfig::new("Cloud").with_poll_interval(Duration::ZERO);
        assert_eq!(config.poll_interval, MIN_INTERVAL);
    }

    #[test]
    fn config_defaults_match_reference_behavior() {
        let config = EmitterConfig::new("Cloud");
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.response_timeout, Duration::from_secs(60));
        assert_eq!(config.wait_strategy, WaitStrategy::Poll);
    }

    #[tokio::test]
    async fn request_file_matches_inputs() {
        let tmp = tempfile::tempdir().unwrap();
        let emitter = RequestEmitter::new(fast_config(tmp.path()));

        let pending = emitter.emit(DEVICE, "ping").await.unwrap();

        let expected = tmp
            .path()
            .join("Requests")
            .join(DEVICE)
            .join(pending.request().request_id.file_name());
        assert_eq!(pending.request_path(), expected);

        let on_disk = decode_request(&std::fs::read(&expected).unwrap()).unwrap();
        assert_eq!(on_disk.device_id, DEVICE);
        assert_eq!(on_disk.request_type, "ping");
        assert!(on_disk.request_id.is_request());
        assert_eq!(&on_disk, pending.request());
        assert!(tmp.path().join("Responses").join(DEVICE).is_dir());
    }

    #[tokio::test]
    async fn each_send_gets_a_fresh_id() {
        let tmp = tempfile::tempdir().unwrap();
        let emitter = RequestEmitter::new(fast_config(tmp.path()));

        let a = emitter.emit(DEVICE, "ping").await.unwrap();
        let b = emitter.emit(DEVICE, "ping").await.unwrap();

        assert_ne!(a.request().request_id, b.request().request_id);
        let listed = Spool::new(tmp.path()).list_requests(DEVICE).await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn returns_response_once_it_appears() {
        let tmp = tempfile::tempdir().unwrap();
        let poll_interval = Duration::from_millis(100);
        let config = fast_config(tmp.path())
            .with_poll_interval(poll_interval)
            .with_response_timeout(Duration::from_secs(60));
        let emitter = RequestEmitter::new(config);
        let responder = spawn_responder(
            tmp.path().to_path_buf(),
            DEVICE,
            Duration::from_millis(150),
            br#"{"status": "ok"}"#,
        );

        let outcome = emitter.send(DEVICE, "ping").await.unwrap();
        let returned = Instant::now();
        let written = responder.await.unwrap();

        let lag = returned.saturating_duration_since(written);
        assert!(
            lag <= poll_interval + Duration::from_millis(250),
            "returned {lag:?} after the response was written"
        );
        let response = outcome.response().expect("response");
        assert_eq!(response.clone().into_value(), json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn watch_strategy_returns_same_response() {
        let tmp = tempfile::tempdir().unwrap();
        let config = fast_config(tmp.path())
            .with_poll_interval(Duration::from_secs(5))
            .with_response_timeout(Duration::from_secs(60))
            .with_wait_strategy(WaitStrategy::Watch);
        let emitter = RequestEmitter::new(config);
        spawn_responder(
            tmp.path().to_path_buf(),
            DEVICE,
            Duration::from_millis(100),
            br#"{"status": "ok"}"#,
        );

        let outcome = emitter.send(DEVICE, "ping").await.unwrap();

        assert_eq!(
            outcome.response().unwrap().get("status"),
            Some(&json!("ok"))
        );
    }

    #[tokio::test]
    async fn times_out_without_responder() {
        let tmp = tempfile::tempdir().unwrap();
        let emitter = RequestEmitter::new(fast_config(tmp.path()));

        let started = std::time::Instant::now();
        let outcome = emitter.send(DEVICE, "ping").await.unwrap();
        let elapsed = started.elapsed();

        assert!(outcome.is_timeout());
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");

        let response_path = tmp
            .path()
            .join("Responses")
            .join(DEVICE)
            .join(outcome.request().request_id.file_name());
        assert!(!response_path.exists());
        assert!(outcome.request_path().exists());
    }

    #[tokio::test]
    async fn malformed_response_fails_fast() {
        let tmp = tempfile::tempdir().unwrap();
        let config = fast_config(tmp.path()).with_response_timeout(Duration::from_secs(60));
        let emitter = RequestEmitter::new(config);
        spawn_responder(
            tmp.path().to_path_buf(),
            DEVICE,
            Duration::ZERO,
            b"[\"not\", \"an object\"]",
        );

        let started = std::time::Instant::now();
        let err = emitter.send(DEVICE, "ping").await.unwrap_err();

        assert!(err.is_malformed(), "{err}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn storage_failure_propagates() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root-is-a-file");
        std::fs::write(&root, b"").unwrap();
        let emitter = RequestEmitter::new(fast_config(&root));

        let err = emitter.send(DEVICE, "ping").await.unwrap_err();

        assert!(err.is_storage(), "{err}");
    }

    #[tokio::test]
    async fn rejects_bad_inputs_before_writing() {
        let tmp = tempfile::tempdir().unwrap();
        let emitter = RequestEmitter::new(fast_config(tmp.path()));

        assert!(matches!(
            emitter.emit("", "ping").await.unwrap_err(),
            SpoolError::InvalidIdentifier { .. }
        ));
        assert!(matches!(
            emitter.emit(DEVICE, "").await.unwrap_err(),
            SpoolError::InvalidIdentifier { .. }
        ));
        assert!(!tmp.path().join("Requests").exists());
    }
}
