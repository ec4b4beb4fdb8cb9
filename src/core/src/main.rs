//! Conveyor worker daemon - main entry point.
//!
//! Runs one worker execution loop against the job store until a shutdown
//! signal arrives. Started detached by the worker pool manager, or
//! directly in a terminal for debugging.

use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;

use conveyor_core::config::Config;
use conveyor_core::store::JobStore;
use conveyor_core::telemetry;
use conveyor_core::worker::{generate_worker_id, Worker, WorkerConfig};

/// Conveyor job queue worker.
#[derive(Parser)]
#[command(
    name = "conveyor-worker",
    version,
    about = "Conveyor job queue worker process"
)]
struct Args {
    /// Worker identity; generated when omitted
    #[arg(long, env = "CONVEYOR_WORKER_ID")]
    worker_id: Option<String>,

    /// Path to the job store database
    #[arg(long, env = "CONVEYOR_DB")]
    db: Option<PathBuf>,

    /// Poll interval between unsuccessful claims (milliseconds)
    #[arg(long)]
    poll_interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config::default()
    });

    telemetry::init_logging(&config.logging)?;

    let db_path = match args.db {
        Some(path) => path,
        None => config.store.resolved_path()?,
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        db = %db_path.display(),
        "Starting Conveyor worker"
    );

    let store = JobStore::connect_with(&db_path, &config.store).await?;

    let worker_id = args.worker_id.unwrap_or_else(generate_worker_id);
    let poll_interval_ms = args
        .poll_interval_ms
        .unwrap_or(config.worker.poll_interval_ms);

    let worker = Worker::new(
        store,
        WorkerConfig::new(worker_id).with_poll_interval_ms(poll_interval_ms),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await;

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, finishing current job");
}
