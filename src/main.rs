use std::path::Path;
use std::sync::Arc;

use lease_coordinator::start_server;
use lease_coordinator::ManagerBuilder;
use lease_coordinator::ManagerHandle;
use lease_coordinator::MemoryStore;
use lease_coordinator::Result;
use lease_coordinator::SystemClock;
use lease_coordinator::WorkerConfig;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

const LOG_FILE: &str = "lease-coordinator.log";

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = WorkerConfig::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability(settings.monitoring.log_dir.as_deref())?;
    info!("starting with {:?}", settings);

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    if settings.monitoring.prometheus_enabled {
        tokio::spawn(start_server(
            settings.monitoring.prometheus_port,
            graceful_rx.clone(),
        ));
    }

    let clock = SystemClock::new();
    let store = Arc::new(MemoryStore::new(clock, &settings.store));
    let handle = ManagerBuilder::new(settings.lease, store).clock(clock).spawn();

    info!("Lease manager started. Waiting for CTRL+C signal...");
    // Listen on Shutdown Signal
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        if let Err(e) = graceful_shutdown(graceful_tx, shutdown_handle).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    if let Err(e) = handle.wait().await {
        error!("lease manager stops: {:?}", e);
        return Err(e);
    }

    info!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(
    graceful_tx: watch::Sender<()>,
    handle: ManagerHandle,
) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
        _ = handle.wait() => {
            // Manager died on its own; just take the metrics server down.
        },
    }

    info!("Shutdown server..");
    handle.stop();
    // No receivers left only if the metrics server never started.
    let _ = graceful_tx.send(());

    info!("Shutdown completed");
    Ok(())
}

/// Logs to `log_dir/lease-coordinator.log` when a directory is configured,
/// stdout otherwise. Filtering follows `RUST_LOG`.
pub fn init_observability(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env()))
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(log_dir)?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(Some(guard))
}
