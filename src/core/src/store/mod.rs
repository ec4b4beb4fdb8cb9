//! Persistent job store.
//!
//! SQLite-backed storage for job records and the flat key/value
//! configuration table, using sqlx with WAL journal mode so reads proceed
//! concurrently with the single in-flight writer.
//!
//! The store exclusively owns job mutation. Workers never write fields
//! directly; they go through [`JobStore::claim`] and the settle
//! operations, each of which is a single guarded statement (or a single
//! transaction) so the at-most-one-claimant property holds under any
//! number of concurrent callers.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::error::{ConveyorError, Result};
use crate::jobs::{
    retry, Job, JobId, JobSpec, JobState, QueueStatus, RetryDecision, RetryPolicy,
};

// ═══════════════════════════════════════════════════════════════════════════════
// Defaults and config keys
// ═══════════════════════════════════════════════════════════════════════════════

/// Config-table key for the default retry ceiling.
pub const CONFIG_MAX_RETRIES: &str = "max-retries";
/// Config-table key for the default backoff base.
pub const CONFIG_BACKOFF_BASE: &str = "backoff-base";

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_BASE: u32 = 2;
const DEFAULT_TIMEOUT_SECS: u32 = 20;
const DEFAULT_PRIORITY: i64 = 5;

const JOB_COLUMNS: &str = "id, command, state, attempts, max_retries, timeout, backoff_base, \
                           priority, waiting_time, created_at, updated_at, next_retry_at, \
                           error_message, output, execution_time, locked_by, locked_at";

// ═══════════════════════════════════════════════════════════════════════════════
// Row Type
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    command: String,
    state: String,
    attempts: i64,
    max_retries: i64,
    #[sqlx(rename = "timeout")]
    timeout_secs: i64,
    backoff_base: i64,
    priority: i64,
    waiting_time: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    next_retry_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    output: Option<String>,
    execution_time: Option<f64>,
    locked_by: Option<String>,
    locked_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = ConveyorError;

    fn try_from(row: JobRow) -> Result<Self> {
        let state: JobState = row
            .state
            .parse()
            .map_err(|e: String| ConveyorError::internal(e))?;

        Ok(Job {
            id: JobId::from(row.id),
            command: row.command,
            state,
            attempts: row.attempts as u32,
            max_retries: row.max_retries as u32,
            timeout_secs: row.timeout_secs as u32,
            backoff_base: row.backoff_base as u32,
            priority: row.priority,
            waiting_time: row.waiting_time,
            created_at: row.created_at,
            updated_at: row.updated_at,
            next_retry_at: row.next_retry_at,
            error_message: row.error_message,
            output: row.output,
            execution_time: row.execution_time,
            locked_by: row.locked_by,
            locked_at: row.locked_at,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Handle to the persistent job store.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    /// Open (creating if necessary) the store at the given path and apply
    /// migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with(path, &StoreConfig::default()).await
    }

    /// Open the store with explicit pool settings.
    pub async fn connect_with(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::debug!(path = %path.display(), "Job store opened");

        Ok(Self { pool })
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Enqueue
    // ═══════════════════════════════════════════════════════════════════════

    /// Enqueue a new job.
    ///
    /// Fails with `DuplicateJob` if the identifier already exists. As a
    /// single transaction, increments `waiting_time` for every pending or
    /// failed job and inserts the new job with waiting_time = 0 — queue
    /// age is measured in enqueue events, not wall-clock time.
    pub async fn enqueue(&self, spec: &JobSpec) -> Result<Job> {
        let mut tx = self.pool.begin().await?;

        let max_retries = match spec.max_retries {
            Some(v) => v,
            None => {
                config_value_in(&mut tx, CONFIG_MAX_RETRIES, DEFAULT_MAX_RETRIES).await?
            }
        };
        let backoff_base = match spec.backoff_base {
            Some(v) => v,
            None => {
                config_value_in(&mut tx, CONFIG_BACKOFF_BASE, DEFAULT_BACKOFF_BASE).await?
            }
        };
        let timeout_secs = spec.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let priority = spec.priority.unwrap_or(DEFAULT_PRIORITY);

        sqlx::query("UPDATE jobs SET waiting_time = waiting_time + 1 WHERE state IN ('pending', 'failed')")
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO jobs (id, command, state, attempts, max_retries, timeout,
                              backoff_base, priority, waiting_time, created_at, updated_at)
            VALUES (?, ?, 'pending', 0, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(spec.id.as_str())
        .bind(&spec.command)
        .bind(max_retries as i64)
        .bind(timeout_secs as i64)
        .bind(backoff_base as i64)
        .bind(priority)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ConveyorError::duplicate_job(&spec.id)
            }
            _ => ConveyorError::from(e),
        })?;

        tx.commit().await?;

        tracing::info!(
            job_id = %spec.id,
            priority = priority,
            max_retries = max_retries,
            "Job enqueued"
        );

        self.get(&spec.id)
            .await?
            .ok_or_else(|| ConveyorError::internal("enqueued job vanished before read-back"))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Claim
    // ═══════════════════════════════════════════════════════════════════════

    /// Atomically claim the best claimable job for `worker_id`.
    ///
    /// Candidates are unlocked jobs that are pending, or failed with an
    /// elapsed `next_retry_at`, ordered by effective priority
    /// (`priority + waiting_time`) descending with ties going to the
    /// oldest. The transition to `processing` is a conditional update
    /// guarded on `locked_by IS NULL`: of any number of concurrent
    /// callers observing the same candidate, exactly one wins. A loser
    /// re-selects (and may claim a different job) rather than reporting
    /// failure.
    ///
    /// Returns `Ok(None)` when no job is available — that is not an error.
    pub async fn claim(&self, worker_id: &str) -> Result<Option<Job>> {
        loop {
            let now = Utc::now();

            let candidate = sqlx::query_as::<_, JobRow>(&format!(
                r#"
                SELECT {JOB_COLUMNS}
                FROM jobs
                WHERE locked_by IS NULL
                  AND (state = 'pending' OR (state = 'failed' AND next_retry_at <= ?))
                ORDER BY (priority + waiting_time) DESC, created_at ASC
                LIMIT 1
                "#
            ))
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

            let Some(candidate) = candidate else {
                return Ok(None);
            };

            let result = sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'processing',
                    locked_by = ?,
                    locked_at = ?,
                    next_retry_at = NULL,
                    updated_at = ?
                WHERE id = ? AND locked_by IS NULL AND state IN ('pending', 'failed')
                "#,
            )
            .bind(worker_id)
            .bind(now)
            .bind(now)
            .bind(&candidate.id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                // Lost the race to another worker; re-select.
                tracing::debug!(
                    worker_id = worker_id,
                    job_id = %candidate.id,
                    "Claim race lost, retrying selection"
                );
                continue;
            }

            let job = self
                .get(&JobId::from(candidate.id.as_str()))
                .await?
                .ok_or_else(|| ConveyorError::internal("claimed job vanished before read-back"))?;

            tracing::info!(
                worker_id = worker_id,
                job_id = %job.id,
                attempt = job.attempts + 1,
                effective_priority = job.effective_priority(),
                "Job claimed"
            );

            return Ok(Some(job));
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Settle
    // ═══════════════════════════════════════════════════════════════════════

    /// Record a successful execution: `processing` → `completed`.
    ///
    /// Conditional on the job still being in `processing`; a second settle
    /// of the same attempt fails with `InvalidStateTransition` and leaves
    /// the record unchanged.
    pub async fn settle_success(
        &self,
        job_id: &JobId,
        output: &str,
        execution_time: f64,
    ) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'completed',
                output = ?,
                execution_time = ?,
                locked_by = NULL,
                locked_at = NULL,
                updated_at = ?
            WHERE id = ? AND state = 'processing'
            "#,
        )
        .bind(output)
        .bind(execution_time)
        .bind(now)
        .bind(job_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.settle_conflict(job_id).await);
        }

        tracing::info!(job_id = %job_id, execution_time = execution_time, "Job completed");
        Ok(())
    }

    /// Record a failed execution: `processing` → `failed` or `dead`.
    ///
    /// The retry engine decides the next state; lock fields are cleared
    /// either way so a finished attempt never leaves a dangling lock.
    /// Returns the decision so callers can report the retry schedule.
    pub async fn settle_failure(
        &self,
        job_id: &JobId,
        error_message: &str,
        execution_time: Option<f64>,
    ) -> Result<RetryDecision> {
        let job = self
            .get(job_id)
            .await?
            .ok_or_else(|| ConveyorError::job_not_found(job_id))?;

        if job.state != JobState::Processing {
            return Err(ConveyorError::invalid_state(
                job_id,
                JobState::Processing,
                job.state,
            ));
        }

        let now = Utc::now();
        let policy = RetryPolicy::new(job.max_retries, job.backoff_base);
        let decision = retry::evaluate(job.attempts, &policy, now);

        let result = match decision {
            RetryDecision::Retry {
                attempts,
                next_retry_at,
            } => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET state = 'failed',
                        attempts = ?,
                        error_message = ?,
                        execution_time = ?,
                        locked_by = NULL,
                        locked_at = NULL,
                        next_retry_at = ?,
                        updated_at = ?
                    WHERE id = ? AND state = 'processing'
                    "#,
                )
                .bind(attempts as i64)
                .bind(error_message)
                .bind(execution_time)
                .bind(next_retry_at)
                .bind(now)
                .bind(job_id.as_str())
                .execute(&self.pool)
                .await?
            }
            RetryDecision::Dead { attempts } => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET state = 'dead',
                        attempts = ?,
                        error_message = ?,
                        execution_time = ?,
                        locked_by = NULL,
                        locked_at = NULL,
                        next_retry_at = NULL,
                        updated_at = ?
                    WHERE id = ? AND state = 'processing'
                    "#,
                )
                .bind(attempts as i64)
                .bind(error_message)
                .bind(execution_time)
                .bind(now)
                .bind(job_id.as_str())
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(self.settle_conflict(job_id).await);
        }

        match decision {
            RetryDecision::Retry {
                attempts,
                next_retry_at,
            } => {
                tracing::warn!(
                    job_id = %job_id,
                    attempt = attempts,
                    next_retry_at = %next_retry_at,
                    error = error_message,
                    "Job failed, retry scheduled"
                );
            }
            RetryDecision::Dead { attempts } => {
                tracing::error!(
                    job_id = %job_id,
                    attempts = attempts,
                    error = error_message,
                    "Job moved to dead letter queue"
                );
            }
        }

        Ok(decision)
    }

    /// Classify a zero-row settle update as not-found or a state conflict.
    async fn settle_conflict(&self, job_id: &JobId) -> ConveyorError {
        match self.get(job_id).await {
            Ok(Some(job)) => {
                ConveyorError::invalid_state(job_id, JobState::Processing, job.state)
            }
            Ok(None) => ConveyorError::job_not_found(job_id),
            Err(e) => e,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════

    /// Get a job by id.
    pub async fn get(&self, job_id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"
        ))
        .bind(job_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    /// List jobs, newest first, optionally filtered by state.
    pub async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        let rows = match state {
            Some(state) => {
                sqlx::query_as::<_, JobRow>(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE state = ? ORDER BY created_at DESC"
                ))
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, JobRow>(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(Job::try_from).collect()
    }

    /// Per-state job counts.
    pub async fn counts(&self) -> Result<QueueStatus> {
        let rows = sqlx::query("SELECT state, COUNT(*) AS count FROM jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await?;

        let mut status = QueueStatus::default();
        for row in rows {
            let state: String = row.get("state");
            let count: i64 = row.get("count");
            let count = count as u64;
            status.total += count;
            match state.as_str() {
                "pending" => status.pending = count,
                "processing" => status.processing = count,
                "completed" => status.completed = count,
                "failed" => status.failed = count,
                "dead" => status.dead = count,
                _ => {}
            }
        }

        Ok(status)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Administrative deletion
    // ═══════════════════════════════════════════════════════════════════════

    /// Delete a job. Returns `false` (not an error) when the id is unknown.
    pub async fn remove(&self, job_id: &JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(job_id.as_str())
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            tracing::info!(job_id = %job_id, "Job removed");
        }
        Ok(removed)
    }

    /// Delete every job. Returns the number of deleted rows.
    pub async fn clear_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM jobs").execute(&self.pool).await?;
        let cleared = result.rows_affected();
        tracing::info!(cleared = cleared, "All jobs cleared");
        Ok(cleared)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Dead letter queue
    // ═══════════════════════════════════════════════════════════════════════

    /// List the dead letter queue (jobs in the `dead` state).
    pub async fn dlq_list(&self) -> Result<Vec<Job>> {
        self.list(Some(JobState::Dead)).await
    }

    /// Requeue a dead job: `dead` → `pending` with a reset attempt counter
    /// and cleared error/lock fields. Accumulated `waiting_time` survives.
    pub async fn dlq_retry(&self, job_id: &JobId) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending',
                attempts = 0,
                error_message = NULL,
                next_retry_at = NULL,
                locked_by = NULL,
                locked_at = NULL,
                updated_at = ?
            WHERE id = ? AND state = 'dead'
            "#,
        )
        .bind(now)
        .bind(job_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(job_id).await? {
                Some(job) => Err(ConveyorError::invalid_state(job_id, JobState::Dead, job.state)),
                None => Err(ConveyorError::job_not_found(job_id)),
            };
        }

        tracing::info!(job_id = %job_id, "Dead job requeued");
        Ok(())
    }

    /// Delete every dead job. Returns the number of deleted rows.
    pub async fn dlq_clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM jobs WHERE state = 'dead'")
            .execute(&self.pool)
            .await?;
        let cleared = result.rows_affected();
        tracing::info!(cleared = cleared, "Dead letter queue cleared");
        Ok(cleared)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Configuration table
    // ═══════════════════════════════════════════════════════════════════════

    /// Set a configuration value (upsert).
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO config (key, value) VALUES (?, ?) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a configuration value.
    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    /// List all configuration entries, sorted by key.
    pub async fn config_all(&self) -> Result<Vec<(String, String)>> {
        let entries =
            sqlx::query_as::<_, (String, String)>("SELECT key, value FROM config ORDER BY key")
                .fetch_all(&self.pool)
                .await?;
        Ok(entries)
    }
}

/// Read a numeric default from the config table inside an open
/// transaction, falling back to the built-in default when unset.
async fn config_value_in(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    key: &str,
    fallback: u32,
) -> Result<u32> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM config WHERE key = ?")
        .bind(key)
        .fetch_optional(&mut **tx)
        .await?;

    match value {
        Some(raw) => raw.parse::<u32>().map_err(|_| {
            ConveyorError::configuration(format!(
                "Config key '{}' holds a non-numeric value: '{}'",
                key, raw
            ))
        }),
        None => Ok(fallback),
    }
}
