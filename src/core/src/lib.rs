//! # Conveyor Core
//!
//! A persistent, priority-aware background job queue engine.
//!
//! ## Architecture
//!
//! - **Job Store**: sqlite-backed table of job records plus key/value
//!   configuration; owns all job mutation through CRUD, the atomic claim,
//!   and the settle operations
//! - **Scheduler**: effective-priority selection (`priority +
//!   waiting_time`) with anti-starvation aging
//! - **Retry Engine**: exponential backoff and the dead-letter transition
//! - **Worker**: the poll → claim → execute → settle loop over a shell
//!   command executor
//! - **Worker Pool Manager**: registry-backed supervision of detached
//!   worker processes
//! - **Telemetry**: structured logging through tracing

pub mod config;
pub mod error;
pub mod jobs;
pub mod store;
pub mod telemetry;
pub mod worker;

pub use error::{ConveyorError, ErrorCode, ErrorContext, ErrorSeverity, Result};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{ConveyorError, ErrorCode, ErrorContext, ErrorSeverity, Result};
    pub use crate::jobs::{
        Job, JobId, JobSpec, JobState, QueueStatus, RetryDecision, RetryPolicy,
    };
    pub use crate::store::JobStore;
    pub use crate::worker::{
        generate_worker_id, CommandExecutor, ShellExecutor, Worker, WorkerConfig, WorkerEntry,
        WorkerPoolManager,
    };
}
