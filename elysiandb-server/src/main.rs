//! # elysiandb-server binary
//!
//! Boot order mirrors the reference design: load the snapshot, start the
//! periodic snapshot flusher, start the expiration sweeper, then start
//! accepting connections. A final flush runs on graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use elysiandb_common::Config;
use elysiandb_engine::{snapshot, sweeper, Engine, SnapshotPaths};
use elysiandb_server::{stats::Stats, Context};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[tokio::main]
async fn main() {
    init_logging();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    match run(&config_path).await {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            tracing::error!(error = %err, "fatal startup error");
            eprintln!("elysiandb: {err}");
            std::process::exit(1);
        }
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("ELYSIANDB_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config_path: &str) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    config.validate()?;

    let engine = Arc::new(Engine::new());
    let snapshot_paths = Arc::new(SnapshotPaths::new(&config.store.folder));

    snapshot::load(&engine, &snapshot_paths)?;
    let reclaimed = sweeper::startup_sweep(&engine);
    if reclaimed > 0 {
        tracing::info!(reclaimed, "reclaimed keys expired while offline");
    }

    let stats = Arc::new(Stats::new(config.stats.enabled));
    let ctx = Arc::new(Context {
        engine: Arc::clone(&engine),
        stats: Arc::clone(&stats),
        snapshot: Arc::clone(&snapshot_paths),
    });

    let _sweeper_handle = sweeper::spawn(Arc::clone(&engine));
    let _flush_handle = spawn_periodic_flush(Arc::clone(&engine), Arc::clone(&snapshot_paths), &config);
    let _log_flush_handle = spawn_log_flush(&config);

    if !config.server.tcp.enabled {
        tracing::warn!("server.tcp.enabled is false; nothing to serve, idling");
        std::future::pending::<()>().await;
        return Ok(());
    }

    tokio::select! {
        result = elysiandb_server::server::run(&config.server.tcp.host, config.server.tcp.port, ctx) => {
            result.map_err(|err| anyhow::anyhow!("accept loop failed: {err}"))?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, flushing snapshot");
        }
    }

    if let Err(err) = snapshot::flush(&engine, &snapshot_paths) {
        tracing::error!(error = %err, "final snapshot flush failed");
    }

    Ok(())
}

/// Flushes the snapshot on the configured cadence. A nonpositive interval
/// disables the periodic flush entirely (SAVE and shutdown still flush).
fn spawn_periodic_flush(
    engine: Arc<Engine>,
    paths: Arc<SnapshotPaths>,
    config: &Config,
) -> Option<tokio::task::JoinHandle<()>> {
    if config.store.flush_interval_seconds <= 0 {
        return None;
    }
    let interval = Duration::from_secs(config.store.flush_interval_seconds as u64);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = snapshot::flush(&engine, &paths) {
                tracing::error!(error = %err, "periodic snapshot flush failed, will retry");
            }
        }
    }))
}

/// Placeholder for the log-flush cadence described in the configuration
/// surface. `tracing`'s default writer is unbuffered, so there is nothing
/// to flush in this build; the task exists for interface parity with the
/// configured cadence and so a future buffered writer has a home.
fn spawn_log_flush(config: &Config) -> Option<tokio::task::JoinHandle<()>> {
    if config.log.flush_interval_seconds <= 0 {
        return None;
    }
    let interval = Duration::from_secs(config.log.flush_interval_seconds as u64);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            tracing::trace!("log flush tick");
        }
    }))
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
