//! meshlogd - replicated notification log daemon
//!
//! Runs a notification log replica with background maintenance. Without a
//! gossip transport configured it operates standalone: local appends,
//! queries, GC, and snapshot rotation only.

use clap::Parser;
use meshlogd::config::Config;
use meshlogd::log::{LogOptions, NotificationLog};
use std::process::ExitCode;
use tokio::sync::{broadcast, oneshot};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    let filter = EnvFilter::from_default_env().add_directive(
        if config.verbose { "meshlogd=debug" } else { "meshlogd=info" }
            .parse()
            .expect("static directive parses"),
    );
    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    info!(
        "meshlogd v{} - replicated notification log",
        env!("CARGO_PKG_VERSION")
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let (done_tx, done_rx) = oneshot::channel();

    let mut opts = LogOptions::new()
        .with_retention(config.retention())
        .with_maintenance(config.maintenance_interval(), shutdown_rx, done_tx);
    if let Some(path) = &config.snapshot_file {
        opts = opts.with_snapshot(path);
    }

    let log = match NotificationLog::open(opts) {
        Ok(log) => log,
        Err(e) => {
            error!("Failed to open notification log: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(entries = log.len(), "notification log ready");

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(());

    // Wait for the final maintenance snapshot before exiting.
    if config.maintenance_interval_secs > 0 {
        done_rx.await.ok();
    }

    ExitCode::SUCCESS
}
