//! Conveyor CLI - administrative surface for the background job queue.
//!
//! Every command maps directly onto a job-store or pool-manager operation:
//! enqueue/list/show/status, dequeue/clear, DLQ management, engine
//! configuration, and worker lifecycle.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use conveyor_core::config::Config;
use conveyor_core::store::JobStore;
use conveyor_core::worker::WorkerPoolManager;

use commands::{config as config_cmd, dlq, job, status, worker};
use output::OutputFormat;

/// Conveyor - background job queue
#[derive(Parser)]
#[command(
    name = "conveyor",
    version,
    about = "Conveyor - background job queue",
    long_about = "Manage background shell-command jobs with priorities, automatic \
                  retries, a dead letter queue, and detached worker processes.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Path to the job store database
    #[arg(long, global = true, env = "CONVEYOR_DB")]
    db: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a new job
    Enqueue(job::EnqueueArgs),

    /// List jobs
    List(job::ListArgs),

    /// Show detailed information about a job, including output
    Show {
        /// Job identifier
        job_id: String,
    },

    /// Show queue and worker status
    Status,

    /// Remove a job from the queue
    Dequeue {
        /// Job identifier
        job_id: String,
    },

    /// Delete all jobs
    Clear {
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Dead letter queue operations
    #[command(subcommand)]
    Dlq(dlq::DlqCommands),

    /// Engine configuration (stored in the job store)
    #[command(subcommand)]
    Config(config_cmd::ConfigCommands),

    /// Worker process management
    #[command(subcommand)]
    Worker(worker::WorkerCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = Config::load().unwrap_or_default();

    let db_path = match cli.db.clone() {
        Some(path) => path,
        None => config.store.resolved_path()?,
    };
    let data_dir = db_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let store = JobStore::connect_with(&db_path, &config.store).await?;
    let pool = WorkerPoolManager::new(data_dir, db_path);
    let format = cli.output;

    let result = match cli.command {
        Commands::Enqueue(args) => job::enqueue(args, &store, format).await,
        Commands::List(args) => job::list(args, &store, format).await,
        Commands::Show { job_id } => job::show(&job_id, &store, format).await,
        Commands::Status => status::execute(&store, &pool, format).await,
        Commands::Dequeue { job_id } => job::dequeue(&job_id, &store, format).await,
        Commands::Clear { yes } => job::clear(yes, &store, format).await,
        Commands::Dlq(cmd) => dlq::execute(cmd, &store, format).await,
        Commands::Config(cmd) => config_cmd::execute(cmd, &store, format).await,
        Commands::Worker(cmd) => worker::execute(cmd, &store, &pool, &config, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
