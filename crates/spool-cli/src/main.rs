mod commands;
mod logging;
mod signal;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "spool")]
#[command(about = "Request/response exchange over a shared directory tree")]
#[command(version)]
struct Cli {
    /// Storage root containing the Requests/ and Responses/ trees
    #[arg(long, global = true, env = "SPOOL_ROOT", default_value = "Cloud")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a request and wait for its response (device side)
    Send(SendArgs),
    /// Report the number of queued requests until interrupted (server side)
    Watch(WatchArgs),
    /// Write a response for an existing request
    Respond(RespondArgs),
    /// List a device's requests that have no response yet
    Pending(DeviceArg),
}

#[derive(Args, Debug)]
struct DeviceArg {
    /// Device identifier
    #[arg(long, env = "SPOOL_DEVICE_ID", default_value = "truck-001")]
    device: String,
}

#[derive(Args, Debug)]
struct SendArgs {
    #[command(flatten)]
    device: DeviceArg,

    /// Request type tag
    #[arg(long = "type", default_value = "ping")]
    request_type: String,

    /// Delay between checks for the response file
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_ms: u64,

    /// How long to wait for a response before giving up
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Also wake up on filesystem events instead of only polling
    #[arg(long)]
    watch_events: bool,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Delay between directory listings
    #[arg(long, default_value_t = 2000, value_parser = clap::value_parser!(u64).range(1..))]
    interval_ms: u64,
}

#[derive(Args, Debug)]
struct RespondArgs {
    #[command(flatten)]
    device: DeviceArg,

    /// Identifier of the request being answered
    #[arg(long)]
    request_id: String,

    /// Response JSON object [default: {"status": "ok", "request_id": <id>}]
    #[arg(long)]
    body: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    logging::init_tracing();

    let cli = Cli::parse();
    tracing::debug!(root = %cli.root.display(), "spool {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Send(args) => commands::send(cli.root, args).await,
        Command::Watch(args) => commands::watch(cli.root, args).await,
        Command::Respond(args) => commands::respond(cli.root, args).await,
        Command::Pending(args) => commands::pending(cli.root, args).await,
    }
}
