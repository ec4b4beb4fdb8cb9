//! Worker execution loop.
//!
//! One [`Worker`] drives the poll → claim → execute → settle cycle for a
//! single worker identity. Coordination with other workers happens
//! exclusively through the store's atomic claim; the loop itself is
//! sequential.
//!
//! Shutdown is cooperative: a `watch` flag is honored only at
//! loop-iteration boundaries, so an in-flight job is always executed and
//! settled before the loop exits.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::ErrorCode;
use crate::jobs::{Job, RetryDecision};
use crate::store::JobStore;

use super::executor::{CommandExecutor, ShellExecutor};

/// Generate a fresh worker identity (`worker-xxxxxxxx`).
pub fn generate_worker_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("worker-{}", &uuid[..8])
}

/// Configuration for a worker loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker identity, recorded in claim locks
    pub worker_id: String,
    /// Poll interval between unsuccessful claims (milliseconds)
    pub poll_interval_ms: u64,
}

impl WorkerConfig {
    /// Create a config for the given identity.
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            poll_interval_ms: 1000,
        }
    }

    /// Set the poll interval.
    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new(generate_worker_id())
    }
}

/// A single worker: claims jobs from the store and executes them.
pub struct Worker {
    store: JobStore,
    executor: Arc<dyn CommandExecutor>,
    config: WorkerConfig,
}

impl Worker {
    /// Create a worker backed by the system shell executor.
    pub fn new(store: JobStore, config: WorkerConfig) -> Self {
        Self::with_executor(store, Arc::new(ShellExecutor::new()), config)
    }

    /// Create a worker with a custom executor.
    pub fn with_executor(
        store: JobStore,
        executor: Arc<dyn CommandExecutor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    /// The worker's identity.
    pub fn id(&self) -> &str {
        &self.config.worker_id
    }

    /// Run the worker loop until `shutdown` flips to true.
    ///
    /// Execution-time failures never escape this loop: they are converted
    /// into settle calls or logged and absorbed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        tracing::info!(
            worker_id = %self.config.worker_id,
            poll_interval_ms = self.config.poll_interval_ms,
            pid = std::process::id(),
            "Worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.store.claim(&self.config.worker_id).await {
                Ok(Some(job)) => {
                    self.process(job).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    e.log();
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        tracing::info!(worker_id = %self.config.worker_id, "Worker stopped");
    }

    /// Execute one claimed job and settle the result.
    async fn process(&self, job: Job) {
        let timeout = Duration::from_secs(job.timeout_secs as u64);

        tracing::info!(
            worker_id = %self.config.worker_id,
            job_id = %job.id,
            command = %job.command,
            attempt = job.attempts + 1,
            max_attempts = job.max_retries + 1,
            timeout_secs = job.timeout_secs,
            "Starting job"
        );

        match self.executor.run(&job.command, timeout).await {
            Ok(report) if report.success() => {
                let elapsed = report.elapsed.as_secs_f64();
                match self
                    .store
                    .settle_success(&job.id, report.stdout.trim(), elapsed)
                    .await
                {
                    Ok(()) => {
                        tracing::info!(
                            worker_id = %self.config.worker_id,
                            job_id = %job.id,
                            execution_time = elapsed,
                            "Job completed"
                        );
                    }
                    Err(e) => self.report_settle_error(&job, e),
                }
            }
            Ok(report) => {
                let mut message = match report.exit_code {
                    Some(code) => format!("Exit code {}", code),
                    None => "Terminated by signal".to_string(),
                };
                let stderr = report.stderr.trim();
                if !stderr.is_empty() {
                    message.push_str(": ");
                    message.push_str(stderr);
                }
                self.settle_failed(&job, &message, Some(report.elapsed.as_secs_f64()))
                    .await;
            }
            Err(e) => {
                // Timeout or launch failure: both feed the retry engine.
                let elapsed = match e.code() {
                    ErrorCode::ExecutionTimeout => Some(timeout.as_secs_f64()),
                    _ => None,
                };
                self.settle_failed(&job, e.user_message(), elapsed).await;
            }
        }
    }

    async fn settle_failed(&self, job: &Job, message: &str, execution_time: Option<f64>) {
        match self
            .store
            .settle_failure(&job.id, message, execution_time)
            .await
        {
            Ok(RetryDecision::Retry {
                attempts,
                next_retry_at,
            }) => {
                tracing::warn!(
                    worker_id = %self.config.worker_id,
                    job_id = %job.id,
                    attempt = attempts,
                    next_retry_at = %next_retry_at,
                    error = message,
                    "Job failed, will retry"
                );
            }
            Ok(RetryDecision::Dead { attempts }) => {
                tracing::error!(
                    worker_id = %self.config.worker_id,
                    job_id = %job.id,
                    attempts = attempts,
                    error = message,
                    "Job failed permanently, moved to DLQ"
                );
            }
            Err(e) => self.report_settle_error(job, e),
        }
    }

    /// A failed settle indicates a lost race or operator interference; it
    /// must not take the worker down.
    fn report_settle_error(&self, job: &Job, error: crate::error::ConveyorError) {
        tracing::warn!(
            worker_id = %self.config.worker_id,
            job_id = %job.id,
            error = %error,
            "Settle rejected, job left to its current owner"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = generate_worker_id();
        let b = generate_worker_id();
        assert_ne!(a, b);
        assert!(a.starts_with("worker-"));
        assert_eq!(a.len(), "worker-".len() + 8);
    }

    #[test]
    fn test_worker_config_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, 1000);
        assert!(config.worker_id.starts_with("worker-"));

        let custom = WorkerConfig::new("worker-1").with_poll_interval_ms(50);
        assert_eq!(custom.poll_interval_ms, 50);
        assert_eq!(custom.worker_id, "worker-1");
    }
}
