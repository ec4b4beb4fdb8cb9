//! Command execution.
//!
//! The engine treats a job's command as an opaque shell instruction. The
//! [`CommandExecutor`] trait is the seam between the worker loop and the
//! operating system; [`ShellExecutor`] is the production implementation,
//! and tests substitute scripted executors through the same trait.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::error::{ConveyorError, Result};

/// Outcome of one command execution.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Process exit code; `None` when terminated by a signal
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Wall-clock execution time
    pub elapsed: Duration,
}

impl ExecutionReport {
    /// Whether the command exited zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Executes job commands under a timeout.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` to completion, or fail with `ExecutionTimeout` /
    /// `LaunchFailed`.
    ///
    /// Implementations must guarantee the underlying process is forcibly
    /// terminated when the timeout elapses.
    async fn run(&self, command: &str, timeout: Duration) -> Result<ExecutionReport>;
}

/// Runs commands through the system shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }

    fn build_command(command: &str) -> Command {
        #[cfg(unix)]
        {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        }
        #[cfg(windows)]
        {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        }
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(&self, command: &str, timeout: Duration) -> Result<ExecutionReport> {
        let started = Instant::now();

        let mut cmd = Self::build_command(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // dropping the wait future on timeout must take the child with it
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| ConveyorError::launch_failed(e.to_string()).with_source(e))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ConveyorError::execution_timeout(timeout.as_secs()))?
            .map_err(|e| ConveyorError::launch_failed(e.to_string()).with_source(e))?;

        Ok(ExecutionReport {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed: started.elapsed(),
        })
    }
}
