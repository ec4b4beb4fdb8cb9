//! Worker subsystem.
//!
//! - **executor**: the command-execution seam (`CommandExecutor` trait and
//!   the shell implementation)
//! - **runner**: the per-identity poll → claim → execute → settle loop
//! - **pool**: the process supervisor tracking detached worker processes
//!
//! Workers are independent OS processes (or in-process loops in
//! foreground mode and tests); the only shared mutable resource is the
//! job store, and the only coordination primitive is its atomic claim.

pub mod executor;
pub mod pool;
pub mod runner;

pub use executor::{CommandExecutor, ExecutionReport, ShellExecutor};
pub use pool::{WorkerEntry, WorkerPoolManager};
pub use runner::{generate_worker_id, Worker, WorkerConfig};
