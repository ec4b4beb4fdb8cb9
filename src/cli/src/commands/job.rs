//! Job commands: enqueue, list, show, dequeue, clear.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use conveyor_core::jobs::{Job, JobId, JobSpec, JobState};
use conveyor_core::store::JobStore;

use crate::output::{self, OutputFormat};

// ── Arguments ───────────────────────────────────────────────────────────────

#[derive(Args)]
pub struct EnqueueArgs {
    /// Unique job identifier
    #[arg(long)]
    pub id: String,

    /// Shell command to execute
    #[arg(long)]
    pub command: String,

    /// Maximum retry attempts before the job moves to the DLQ
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Execution timeout in seconds
    #[arg(long)]
    pub timeout: Option<u32>,

    /// Base for exponential retry backoff
    #[arg(long)]
    pub backoff_base: Option<u32>,

    /// Job priority (higher is more urgent)
    #[arg(long)]
    pub priority: Option<i64>,
}

#[derive(Args)]
pub struct ListArgs {
    /// Filter by job state (pending, processing, completed, failed, dead)
    #[arg(long)]
    pub state: Option<JobState>,
}

// ── Table rows ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Tabled)]
struct JobListRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Command")]
    command: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Attempts")]
    attempts: String,
    #[tabled(rename = "Priority")]
    priority: i64,
    #[tabled(rename = "Wait")]
    waiting_time: i64,
    #[tabled(rename = "Effective")]
    effective_priority: i64,
    #[tabled(rename = "Created")]
    created_at: String,
}

impl From<&Job> for JobListRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            command: output::truncate(&job.command, 40),
            state: job.state.to_string(),
            attempts: format!("{}/{}", job.attempts, job.max_retries),
            priority: job.priority,
            waiting_time: job.waiting_time,
            effective_priority: job.effective_priority(),
            created_at: output::format_timestamp(&job.created_at),
        }
    }
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn enqueue(args: EnqueueArgs, store: &JobStore, format: OutputFormat) -> Result<()> {
    let mut spec = JobSpec::new(args.id.as_str(), args.command);
    if let Some(v) = args.max_retries {
        spec = spec.with_max_retries(v);
    }
    if let Some(v) = args.timeout {
        spec = spec.with_timeout_secs(v);
    }
    if let Some(v) = args.backoff_base {
        spec = spec.with_backoff_base(v);
    }
    if let Some(v) = args.priority {
        spec = spec.with_priority(v);
    }

    let job = store.enqueue(&spec).await?;

    match format {
        OutputFormat::Table => {
            output::print_success(&format!("Job '{}' enqueued", job.id));
            output::print_detail("Priority", &job.priority.to_string());
            output::print_detail("Max retries", &job.max_retries.to_string());
            output::print_detail("Timeout", &format!("{}s", job.timeout_secs));
        }
        _ => output::print_item(&job, format),
    }
    Ok(())
}

pub async fn list(args: ListArgs, store: &JobStore, format: OutputFormat) -> Result<()> {
    let jobs = store.list(args.state).await?;

    if jobs.is_empty() {
        if let OutputFormat::Table = format {
            match args.state {
                Some(state) => output::print_info(&format!("No jobs with state '{}'", state)),
                None => output::print_info("No jobs found"),
            }
            return Ok(());
        }
    }

    let rows: Vec<JobListRow> = jobs.iter().map(JobListRow::from).collect();
    output::print_list(&rows, format);
    Ok(())
}

pub async fn show(job_id: &str, store: &JobStore, format: OutputFormat) -> Result<()> {
    let id = JobId::from(job_id);
    let Some(job) = store.get(&id).await? else {
        bail!("Job '{}' not found", job_id);
    };

    match format {
        OutputFormat::Table => {
            output::print_header(&format!("Job: {}", job.id));
            output::print_detail("Command", &job.command);
            output::print_detail("State", &job.state.to_string());
            output::print_detail(
                "Attempts",
                &format!("{}/{}", job.attempts, job.max_retries),
            );
            output::print_detail("Priority", &job.priority.to_string());
            output::print_detail("Waiting time", &job.waiting_time.to_string());
            output::print_detail(
                "Effective",
                &format!("{} (priority + waiting_time)", job.effective_priority()),
            );
            output::print_detail("Timeout", &format!("{}s", job.timeout_secs));
            output::print_detail("Backoff base", &job.backoff_base.to_string());
            if let Some(t) = job.execution_time {
                output::print_detail("Exec time", &format!("{:.3}s", t));
            }
            if let Some(at) = &job.next_retry_at {
                output::print_detail("Next retry", &output::format_timestamp(at));
            }
            if let Some(by) = &job.locked_by {
                output::print_detail("Locked by", by);
            }
            output::print_detail("Created", &output::format_timestamp(&job.created_at));
            output::print_detail("Updated", &output::format_timestamp(&job.updated_at));

            if let Some(err) = &job.error_message {
                println!();
                println!("Error:\n{}", err);
            }
            if let Some(out) = &job.output {
                println!();
                println!("Output:\n{}", out);
            }
            println!();
        }
        _ => output::print_item(&job, format),
    }
    Ok(())
}

pub async fn dequeue(job_id: &str, store: &JobStore, format: OutputFormat) -> Result<()> {
    let id = JobId::from(job_id);
    if !store.remove(&id).await? {
        bail!("Job '{}' not found", job_id);
    }

    match format {
        OutputFormat::Table => {
            output::print_success(&format!("Job '{}' removed from queue", job_id));
        }
        _ => output::print_item(&serde_json::json!({ "removed": job_id }), format),
    }
    Ok(())
}

pub async fn clear(yes: bool, store: &JobStore, format: OutputFormat) -> Result<()> {
    if !yes {
        output::print_info("This will delete ALL jobs. Re-run with --yes to confirm.");
        return Ok(());
    }

    let cleared = store.clear_all().await?;

    match format {
        OutputFormat::Table => {
            output::print_success(&format!("Cleared {} job(s)", cleared));
        }
        _ => output::print_item(&serde_json::json!({ "cleared": cleared }), format),
    }
    Ok(())
}
