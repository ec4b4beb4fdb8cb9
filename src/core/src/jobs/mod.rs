//! Job domain model.
//!
//! This module provides the pure, storage-free half of the engine:
//!
//! - **Job types**: identifiers, the lifecycle state machine, the persisted
//!   record shape, and enqueue specs
//! - **Scheduler**: the effective-priority selection policy
//! - **Retry engine**: backoff arithmetic and the retry/DLQ decision
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Job Scheduling Engine                    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌───────────────┐   ┌─────────────────────────┐ │
//! │  │   Job    │──▶│   Scheduler   │──▶│   Retry/Backoff Engine  │ │
//! │  │  Types   │   │ (selection)   │   │ (failure transitions)   │ │
//! │  └──────────┘   └───────────────┘   └─────────────────────────┘ │
//! │        │               │                       │                │
//! │        ▼               ▼                       ▼                │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │          Job Store (store module, sqlite-backed)            ││
//! │  └─────────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod job;
pub mod retry;
pub mod scheduler;

pub use job::{Job, JobId, JobSpec, JobState, QueueStatus};
pub use retry::{backoff_delay, evaluate, RetryDecision, RetryPolicy, MAX_BACKOFF_SECS};
pub use scheduler::{effective_priority, is_claimable_at, select_next};
