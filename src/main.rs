use std::path::Path;

use journal_engine::file_io::create_dir_if_not_exist;
use journal_engine::Error;
use journal_engine::JournalNodeConfig;
use journal_engine::NetworkError;
use journal_engine::NodeBuilder;
use journal_engine::Result;
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

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let settings = JournalNodeConfig::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability(settings.cluster.node_id, &settings.cluster.log_dir)?;
    info!("starting journal node with {:?}", settings);

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    // Build Node
    let metrics_enabled = settings.monitoring.prometheus_enabled;
    let mut builder = NodeBuilder::new(settings, graceful_rx.clone()).build()?;
    if metrics_enabled {
        builder = builder.start_metrics_server(graceful_rx.clone());
    }
    let node = builder.start_rpc_server().await?.start_heartbeat()?.ready()?;

    info!("Application started. Waiting for CTRL+C signal...");
    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    // Run Node
    if let Err(e) = node.run().await {
        error!("node stops: {:?}", e);
    }

    info!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(NetworkError::Io)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(NetworkError::Io)?;
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
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::from(NetworkError::SignalSendFailed(format!(
            "Failed to send shutdown signal: {}",
            e
        )))
    })?;

    info!("Shutdown signal sent");
    Ok(())
}

/// Logs go to `<log_dir>/<node_id>/journal.log` through a non-blocking
/// writer; the returned guard flushes them on drop.
pub fn init_observability(
    node_id: u64,
    log_dir: &Path,
) -> Result<WorkerGuard> {
    let node_log_dir = log_dir.join(node_id.to_string());
    create_dir_if_not_exist(&node_log_dir)?;
    let log_file = tracing_appender::rolling::never(&node_log_dir, "journal.log");

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
