use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use spool::message::codec;
use spool::{
    CancellationToken, EmitterConfig, MessageId, ObserverConfig, QueueKind, QueueObserver,
    RequestEmitter, ResponseRecord, SendOutcome, Spool, WaitStrategy,
};

use crate::signal::cancel_on_signal;
use crate::{DeviceArg, RespondArgs, SendArgs, WatchArgs};

pub async fn send(root: PathBuf, args: SendArgs) -> Result<()> {
    let strategy = if args.watch_events {
        WaitStrategy::Watch
    } else {
        WaitStrategy::Poll
    };
    let config = EmitterConfig::new(root)
        .with_poll_interval(Duration::from_millis(args.poll_interval_ms))
        .with_response_timeout(Duration::from_secs(args.timeout_secs))
        .with_wait_strategy(strategy);
    let emitter = RequestEmitter::new(config);

    let pending = emitter
        .emit(&args.device.device, &args.request_type)
        .await
        .context("failed to write request")?;
    println!("Wrote request: {}", pending.request_path().display());

    let outcome = pending
        .wait()
        .await
        .context("failed while waiting for response")?;
    match outcome {
        SendOutcome::Received { response, .. } => {
            println!("Received response:");
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        SendOutcome::Timeout { .. } => {
            println!("No response received within timeout.");
        }
    }
    Ok(())
}

pub async fn watch(root: PathBuf, args: WatchArgs) -> Result<()> {
    let config = ObserverConfig::for_storage_root(root)
        .with_interval(Duration::from_millis(args.interval_ms));

    println!("spool server - request watcher");
    println!("Watching: {}", config.requests_root.display());
    println!("Press Ctrl+C to stop...");
    println!();

    let observer = QueueObserver::new(config);
    let mut status = observer.subscribe();
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));
    let run = tokio::spawn(observer.run(cancel.clone()));

    // Ends when the observer drops its sender, i.e. when `run` returns.
    while status.changed().await.is_ok() {
        let entries = status.borrow_and_update().as_ref().map(|s| s.entries);
        if let Some(entries) = entries {
            print!("Requests detected: {entries:3}\r");
            std::io::stdout().flush()?;
        }
    }

    run.await
        .context("observer task failed")?
        .context("failed to observe requests")?;
    cancel.cancel();

    println!();
    println!("Server stopped");
    Ok(())
}

pub async fn respond(root: PathBuf, args: RespondArgs) -> Result<()> {
    let device = &args.device.device;
    let id = MessageId::parse(&args.request_id)?;
    let response = response_body(&id, args.body.as_deref())?;
    let spool = Spool::new(root);

    let request_path = spool
        .resolver()
        .message_path(QueueKind::Requests, device, &id)?;
    if !request_path.exists() {
        tracing::warn!(path = %request_path.display(), "Answering a request that is not on disk");
    }

    let path = spool
        .write_response(device, &id, &response)
        .await
        .context("failed to write response")?;
    println!("Wrote response: {}", path.display());
    Ok(())
}

pub async fn pending(root: PathBuf, args: DeviceArg) -> Result<()> {
    let spool = Spool::new(root);
    let pending = spool
        .pending_requests(&args.device)
        .await
        .context("failed to list requests")?;

    tracing::info!(device = %args.device, count = pending.len(), "Pending requests");
    for id in pending {
        println!("{id}");
    }
    Ok(())
}

fn response_body(id: &MessageId, body: Option<&str>) -> Result<ResponseRecord> {
    match body {
        None => {
            let fields = json!({"status": "ok", "request_id": id.as_str()});
            Ok(serde_json::from_value(fields)?)
        }
        Some(text) => {
            let fields = codec::decode(text.as_bytes()).context("invalid --body")?;
            Ok(ResponseRecord::from(fields))
        }
    }
}
