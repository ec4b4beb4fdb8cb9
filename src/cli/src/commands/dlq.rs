//! Dead letter queue commands.

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use conveyor_core::jobs::{Job, JobId};
use conveyor_core::store::JobStore;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum DlqCommands {
    /// List jobs in the dead letter queue
    List,

    /// Move a dead job back to the pending queue
    ///
    /// Resets the attempt counter and clears the recorded error; the job
    /// competes for workers again like a fresh enqueue.
    Retry {
        /// Job identifier
        job_id: String,
    },

    /// Delete every job in the dead letter queue
    Clear {
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct DlqRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Command")]
    command: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Error")]
    error: String,
    #[tabled(rename = "Failed At")]
    failed_at: String,
}

impl From<&Job> for DlqRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            command: output::truncate(&job.command, 30),
            attempts: job.attempts,
            error: output::truncate(job.error_message.as_deref().unwrap_or(""), 40),
            failed_at: output::format_timestamp(&job.updated_at),
        }
    }
}

pub async fn execute(cmd: DlqCommands, store: &JobStore, format: OutputFormat) -> Result<()> {
    match cmd {
        DlqCommands::List => {
            let jobs = store.dlq_list().await?;

            if jobs.is_empty() {
                if let OutputFormat::Table = format {
                    output::print_info("Dead letter queue is empty");
                    return Ok(());
                }
            }

            let rows: Vec<DlqRow> = jobs.iter().map(DlqRow::from).collect();
            output::print_list(&rows, format);
        }

        DlqCommands::Retry { job_id } => {
            store.dlq_retry(&JobId::from(job_id.as_str())).await?;

            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Job '{}' moved back to pending queue", job_id));
                }
                _ => output::print_item(&serde_json::json!({ "requeued": job_id }), format),
            }
        }

        DlqCommands::Clear { yes } => {
            if !yes {
                output::print_info(
                    "This will delete all dead jobs. Re-run with --yes to confirm.",
                );
                return Ok(());
            }

            let cleared = store.dlq_clear().await?;

            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Cleared {} dead job(s)", cleared));
                }
                _ => output::print_item(&serde_json::json!({ "cleared": cleared }), format),
            }
        }
    }

    Ok(())
}
