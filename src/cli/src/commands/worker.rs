//! Worker process management commands.

use anyhow::{bail, Result};
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;
use tokio::sync::watch;

use conveyor_core::config::Config;
use conveyor_core::store::JobStore;
use conveyor_core::telemetry::{self, LogFormat};
use conveyor_core::worker::{Worker, WorkerConfig, WorkerEntry, WorkerPoolManager};

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum WorkerCommands {
    /// Start worker processes
    Start {
        /// Number of workers to start
        #[arg(long, default_value_t = 1)]
        count: usize,

        /// Run a single worker in the foreground (shows real-time output)
        #[arg(short, long)]
        foreground: bool,
    },

    /// Stop all tracked workers
    ///
    /// Each worker finishes its current job before exiting.
    Stop,

    /// List tracked worker processes
    List,
}

#[derive(Debug, Serialize, Tabled)]
struct WorkerRow {
    #[tabled(rename = "Worker")]
    worker_id: String,
    #[tabled(rename = "PID")]
    pid: u32,
    #[tabled(rename = "Started")]
    started_at: String,
}

impl From<&WorkerEntry> for WorkerRow {
    fn from(entry: &WorkerEntry) -> Self {
        Self {
            worker_id: entry.worker_id.clone(),
            pid: entry.pid,
            started_at: output::format_timestamp(&entry.started_at),
        }
    }
}

pub async fn execute(
    cmd: WorkerCommands,
    store: &JobStore,
    pool: &WorkerPoolManager,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        WorkerCommands::Start { count, foreground } => {
            if foreground {
                if count != 1 {
                    bail!("Foreground mode only supports 1 worker");
                }
                return run_foreground(store, config).await;
            }

            if count < 1 {
                bail!("Count must be at least 1");
            }

            let started = pool.start(count)?;

            match format {
                OutputFormat::Table => {
                    for entry in &started {
                        output::print_detail(&entry.worker_id, &format!("PID {}", entry.pid));
                    }
                    output::print_success(&format!("Started {} worker(s)", started.len()));
                }
                _ => output::print_item(&started, format),
            }
        }

        WorkerCommands::Stop => {
            let stopped = pool.stop()?;

            match format {
                OutputFormat::Table => {
                    if stopped > 0 {
                        output::print_success(&format!("Stopped {} worker(s)", stopped));
                    } else {
                        output::print_info("No workers to stop");
                    }
                }
                _ => output::print_item(&serde_json::json!({ "stopped": stopped }), format),
            }
        }

        WorkerCommands::List => {
            let entries = pool.active()?;

            if entries.is_empty() {
                if let OutputFormat::Table = format {
                    output::print_info("No workers running");
                    return Ok(());
                }
            }

            let rows: Vec<WorkerRow> = entries.iter().map(WorkerRow::from).collect();
            output::print_list(&rows, format);
        }
    }

    Ok(())
}

/// Run a single worker in this process until Ctrl+C.
async fn run_foreground(store: &JobStore, config: &Config) -> Result<()> {
    let mut log_config = config.logging.clone();
    log_config.format = LogFormat::Pretty;
    telemetry::init_logging(&log_config)?;

    output::print_info("Starting worker in foreground mode (Press Ctrl+C to stop)...");

    let worker = Worker::new(
        store.clone(),
        WorkerConfig::default().with_poll_interval_ms(config.worker.poll_interval_ms),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await;

    output::print_info("Worker stopped");
    Ok(())
}
