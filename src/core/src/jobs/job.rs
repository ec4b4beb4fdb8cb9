//! Job definitions.
//!
//! Core types for the job queue:
//!
//! - **JobId**: Unique string identifier for a job
//! - **JobState**: Enumeration of lifecycle states
//! - **Job**: The persisted job record
//! - **JobSpec**: An enqueue request with optional overrides
//! - **QueueStatus**: Per-state job counts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::scheduler;

// ═══════════════════════════════════════════════════════════════════════════════
// Job Identification
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique identifier for a job.
///
/// Identifiers are user-assigned, immutable, and globally unique for the
/// lifetime of the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Create a job id from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job State
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle state of a job.
///
/// Valid transitions:
///
/// ```text
/// pending ──claim──▶ processing ──success──────────────▶ completed
///    ▲                  │    ▲
///    │                  │    └──claim after next_retry_at── failed
///    │                  │                                      ▲
///    │                  ├──failure, retries left───────────────┘
///    │                  └──failure, budget exhausted──▶ dead
///    └──────────────────────────manual retry────────────┘
/// ```
///
/// No other transitions are valid; the store rejects out-of-band settle
/// attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting in the queue, claimable
    Pending,
    /// Job is claimed and executing under a worker lock
    Processing,
    /// Job completed successfully (terminal)
    Completed,
    /// Job failed and becomes claimable again after `next_retry_at`
    Failed,
    /// Job failed past its retry budget (terminal, the DLQ)
    Dead,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Dead)
    }

    /// Check if jobs in this state participate in claim selection.
    ///
    /// Failed jobs are additionally gated on `next_retry_at`.
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    /// The persisted string form of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "dead" => Ok(Self::Dead),
            other => Err(format!(
                "unknown job state '{}' (expected pending, processing, completed, failed, or dead)",
                other
            )),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Record
// ═══════════════════════════════════════════════════════════════════════════════

/// A persisted job record.
///
/// Mutation happens exclusively through the store's claim and settle
/// operations; this struct is a read-side projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier
    pub id: JobId,
    /// Shell command to execute (opaque to the engine)
    pub command: String,
    /// Current lifecycle state
    pub state: JobState,
    /// Execution attempts made so far
    pub attempts: u32,
    /// Ceiling on retries before the job is moved to the DLQ
    pub max_retries: u32,
    /// Execution timeout in seconds
    pub timeout_secs: u32,
    /// Base for exponential retry backoff
    pub backoff_base: u32,
    /// User-assigned urgency
    pub priority: i64,
    /// Anti-starvation accumulator, incremented per enqueue while waiting
    pub waiting_time: i64,
    /// When the job was enqueued
    pub created_at: DateTime<Utc>,
    /// When the job was last mutated
    pub updated_at: DateTime<Utc>,
    /// Earliest time a failed job becomes claimable again
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Last failure description
    pub error_message: Option<String>,
    /// Captured stdout of the successful attempt
    pub output: Option<String>,
    /// Elapsed seconds of the last attempt
    pub execution_time: Option<f64>,
    /// Claiming worker identity; non-null iff processing
    pub locked_by: Option<String>,
    /// When the claim was taken
    pub locked_at: Option<DateTime<Utc>>,
}

impl Job {
    /// The job's effective priority: the sole ranking key for selection.
    pub fn effective_priority(&self) -> i64 {
        scheduler::effective_priority(self.priority, self.waiting_time)
    }

    /// Check whether this job is claimable at `now`.
    pub fn is_claimable_at(&self, now: DateTime<Utc>) -> bool {
        scheduler::is_claimable_at(self, now)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Spec
// ═══════════════════════════════════════════════════════════════════════════════

/// An enqueue request.
///
/// Unset fields fall back to the store's config-table defaults
/// (`max-retries`, `backoff-base`) or the built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Unique identifier for the new job
    pub id: JobId,
    /// Shell command to execute
    pub command: String,
    /// Maximum retry attempts before the DLQ
    pub max_retries: Option<u32>,
    /// Execution timeout in seconds
    pub timeout_secs: Option<u32>,
    /// Base for exponential backoff
    pub backoff_base: Option<u32>,
    /// User-assigned urgency
    pub priority: Option<i64>,
}

impl JobSpec {
    /// Create a spec for the given id and command.
    pub fn new(id: impl Into<JobId>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            max_retries: None,
            timeout_secs: None,
            backoff_base: None,
            priority: None,
        }
    }

    /// Set the retry ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the execution timeout.
    pub fn with_timeout_secs(mut self, timeout_secs: u32) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Set the backoff base.
    pub fn with_backoff_base(mut self, backoff_base: u32) -> Self {
        self.backoff_base = Some(backoff_base);
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Queue Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-state job counts for the whole queue.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStatus {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub dead: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_predicates() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Dead.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Processing.is_terminal());
        assert!(!JobState::Failed.is_terminal());

        assert!(JobState::Pending.is_claimable());
        assert!(JobState::Failed.is_claimable());
        assert!(!JobState::Processing.is_claimable());
        assert!(!JobState::Completed.is_claimable());
        assert!(!JobState::Dead.is_claimable());
    }

    #[test]
    fn test_job_state_round_trip() {
        for state in [
            JobState::Pending,
            JobState::Processing,
            JobState::Completed,
            JobState::Failed,
            JobState::Dead,
        ] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!("bogus".parse::<JobState>().is_err());
    }

    #[test]
    fn test_job_spec_builder() {
        let spec = JobSpec::new("report-42", "echo hello")
            .with_priority(8)
            .with_timeout_secs(5)
            .with_max_retries(2);

        assert_eq!(spec.id.as_str(), "report-42");
        assert_eq!(spec.priority, Some(8));
        assert_eq!(spec.timeout_secs, Some(5));
        assert_eq!(spec.max_retries, Some(2));
        assert!(spec.backoff_base.is_none());
    }

    #[test]
    fn test_job_id_display() {
        let id = JobId::from("job-1");
        assert_eq!(id.to_string(), "job-1");
        assert_eq!(id.as_str(), "job-1");
    }
}
