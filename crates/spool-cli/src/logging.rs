//! Tracing setup for the `spool` binary.
//!
//! `RUST_LOG` wins when set. Otherwise `SPOOL_LOG` picks one level for the
//! spool crates (default `warn`, so stdout/stderr stay readable during
//! interactive use). `LOG_FORMAT=json` switches to JSON lines. All logs go to
//! stderr.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(filter_directives(std::env::var("SPOOL_LOG").ok().as_deref()))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn filter_directives(spool_log: Option<&str>) -> String {
    let level = match spool_log {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("error") => "error",
        _ => "warn",
    };
    format!("spool={level},spool_cli={level}")
}
