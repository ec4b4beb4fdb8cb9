//! Worker pool manager.
//!
//! Supervises detached worker processes: a JSON registry in the data
//! directory maps worker identities to PIDs, and start/stop operate on
//! that registry. The manager owns no job data — it only manages
//! execution-loop lifetimes.
//!
//! Liveness is probed with signal 0; termination is a SIGTERM so a worker
//! finishes its in-flight job before exiting. Entries whose process died
//! without deregistering are pruned on every operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;

use crate::config;
use crate::error::{ConveyorError, ErrorCode, ErrorContext, Result};

use super::runner::generate_worker_id;

/// File name of the worker registry inside the data directory.
pub const REGISTRY_FILE: &str = "workers.json";

const WORKER_BINARY: &str = if cfg!(windows) {
    "conveyor-worker.exe"
} else {
    "conveyor-worker"
};

/// A tracked worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerEntry {
    /// Worker identity (matches the claim lock's `locked_by`)
    pub worker_id: String,
    /// OS process id
    pub pid: u32,
    /// When the process was spawned
    pub started_at: DateTime<Utc>,
}

/// Manages the registry of detached worker processes.
pub struct WorkerPoolManager {
    data_dir: PathBuf,
    db_path: PathBuf,
}

impl WorkerPoolManager {
    /// Create a manager over an explicit data directory and store path.
    pub fn new(data_dir: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            db_path: db_path.into(),
        }
    }

    /// Create a manager over the default data directory.
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(config::default_data_dir()?, config::default_db_path()?))
    }

    fn registry_path(&self) -> PathBuf {
        self.data_dir.join(REGISTRY_FILE)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registry persistence
    // ─────────────────────────────────────────────────────────────────────────

    fn load_registry(&self) -> Vec<WorkerEntry> {
        let path = self.registry_path();
        if !path.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(&path)
            .map_err(ConveyorError::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(ConveyorError::from))
        {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Worker registry unreadable, treating as empty"
                );
                Vec::new()
            }
        }
    }

    fn save_registry(&self, entries: &[WorkerEntry]) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .context("Failed to create the data directory")?;
        let raw = serde_json::to_string_pretty(entries)?;
        std::fs::write(self.registry_path(), raw)
            .context("Failed to write the worker registry")?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Remove registry entries whose process is gone. Returns how many
    /// entries were pruned.
    pub fn cleanup_dead(&self) -> Result<usize> {
        let entries = self.load_registry();
        let before = entries.len();
        let alive: Vec<WorkerEntry> = entries
            .into_iter()
            .filter(|w| process_alive(w.pid))
            .collect();

        let pruned = before - alive.len();
        if pruned > 0 {
            tracing::debug!(pruned = pruned, "Pruned dead worker entries");
            self.save_registry(&alive)?;
        }
        Ok(pruned)
    }

    /// List live tracked workers.
    pub fn active(&self) -> Result<Vec<WorkerEntry>> {
        self.cleanup_dead()?;
        Ok(self.load_registry())
    }

    /// Start `count` detached worker processes and record them.
    pub fn start(&self, count: usize) -> Result<Vec<WorkerEntry>> {
        self.cleanup_dead()?;
        let mut entries = self.load_registry();
        let mut started = Vec::with_capacity(count);

        for _ in 0..count {
            let worker_id = generate_worker_id();
            let pid = self.spawn_worker(&worker_id)?;
            let entry = WorkerEntry {
                worker_id,
                pid,
                started_at: Utc::now(),
            };
            tracing::info!(
                worker_id = %entry.worker_id,
                pid = pid,
                "Worker process started"
            );
            entries.push(entry.clone());
            started.push(entry);
        }

        self.save_registry(&entries)?;
        Ok(started)
    }

    /// Signal every tracked worker to terminate and clear the registry.
    ///
    /// Workers finish their in-flight job before exiting. Entries whose
    /// process already died are tolerated silently. Returns the number of
    /// workers actually signaled.
    pub fn stop(&self) -> Result<usize> {
        self.cleanup_dead()?;
        let entries = self.load_registry();

        let mut stopped = 0;
        for entry in &entries {
            if terminate(entry.pid) {
                tracing::info!(
                    worker_id = %entry.worker_id,
                    pid = entry.pid,
                    "Worker signaled to stop"
                );
                stopped += 1;
            } else {
                tracing::warn!(
                    worker_id = %entry.worker_id,
                    pid = entry.pid,
                    "Worker already gone"
                );
            }
        }

        self.save_registry(&[])?;
        Ok(stopped)
    }

    fn spawn_worker(&self, worker_id: &str) -> Result<u32> {
        let mut cmd = std::process::Command::new(worker_binary());
        cmd.arg("--worker-id")
            .arg(worker_id)
            .arg("--db")
            .arg(&self.db_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Detach into its own process group so it survives the CLI's exit
        // and never receives the CLI's terminal signals.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|e| {
            ConveyorError::with_internal(
                ErrorCode::WorkerSpawnFailed,
                "Failed to start worker process",
                e.to_string(),
            )
            .with_source(e)
        })?;

        Ok(child.id())
    }
}

/// Resolve the worker binary: next to the current executable first, then
/// the PATH.
fn worker_binary() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join(WORKER_BINARY);
            if candidate.exists() {
                return candidate;
            }
        }
    }
    PathBuf::from(WORKER_BINARY)
}

/// Check whether a process exists.
#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// Request graceful termination. Returns false when the process is gone.
#[cfg(unix)]
fn terminate(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn terminate(_pid: u32) -> bool {
    false
}
