//! Queue status command.

use anyhow::Result;

use conveyor_core::store::JobStore;
use conveyor_core::worker::WorkerPoolManager;

use crate::output::{self, OutputFormat};

pub async fn execute(
    store: &JobStore,
    pool: &WorkerPoolManager,
    format: OutputFormat,
) -> Result<()> {
    let counts = store.counts().await?;
    let workers = pool.active()?;

    match format {
        OutputFormat::Table => {
            output::print_header("Conveyor Status");
            output::print_detail("Total jobs", &counts.total.to_string());
            println!();
            println!("Jobs by state:");
            output::print_detail("Pending", &counts.pending.to_string());
            output::print_detail("Processing", &counts.processing.to_string());
            output::print_detail("Completed", &counts.completed.to_string());
            output::print_detail("Failed", &counts.failed.to_string());
            output::print_detail("Dead (DLQ)", &counts.dead.to_string());
            println!();
            println!("Workers:");
            output::print_detail("Active processes", &workers.len().to_string());
            output::print_detail("Currently working", &format!("{} job(s)", counts.processing));
            println!();
        }
        _ => {
            output::print_item(
                &serde_json::json!({
                    "jobs": counts,
                    "active_workers": workers.len(),
                }),
                format,
            );
        }
    }

    Ok(())
}
