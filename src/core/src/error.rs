//! Error handling for Conveyor Core.
//!
//! This module provides:
//! - Machine-readable error codes for the administrative surface
//! - User-friendly messages vs detailed internal messages
//! - Error chaining with source preservation
//! - Severity classification and tracing-integrated logging
//!
//! # Usage
//!
//! ```rust,ignore
//! use conveyor_core::error::{ConveyorError, ErrorContext, Result};
//!
//! fn load_registry() -> Result<Registry> {
//!     std::fs::read_to_string(path)
//!         .context("Failed to read worker registry")?;
//!     // ...
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Conveyor operations.
pub type Result<T> = std::result::Result<T, ConveyorError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by callers for programmatic error
/// handling (e.g. distinguishing a duplicate enqueue from a store failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Job errors (1000-1099)
    JobNotFound,
    DuplicateJob,
    InvalidStateTransition,

    // Execution errors (1100-1199)
    ExecutionTimeout,
    LaunchFailed,

    // Database errors (2000-2099)
    DatabaseError,
    DatabaseConnectionFailed,
    DatabaseQueryFailed,
    MigrationFailed,

    // Serialization errors (2200-2299)
    SerializationError,

    // Worker pool errors (3000-3099)
    WorkerSpawnFailed,

    // Configuration errors (5000-5099)
    ConfigurationError,
    MissingConfiguration,

    // Internal errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::JobNotFound => 1000,
            Self::DuplicateJob => 1001,
            Self::InvalidStateTransition => 1002,

            Self::ExecutionTimeout => 1100,
            Self::LaunchFailed => 1101,

            Self::DatabaseError => 2000,
            Self::DatabaseConnectionFailed => 2001,
            Self::DatabaseQueryFailed => 2002,
            Self::MigrationFailed => 2003,

            Self::SerializationError => 2200,

            Self::WorkerSpawnFailed => 3000,

            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,

            Self::InternalError => 9000,
        }
    }

    /// Check if the failure behind this error is worth retrying.
    ///
    /// Execution-time codes feed the retry engine; transient store codes
    /// may succeed on the next poll iteration.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExecutionTimeout
                | Self::LaunchFailed
                | Self::DatabaseConnectionFailed
                | Self::DatabaseQueryFailed
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "job",
            1100..=1199 => "execution",
            2000..=2099 => "database",
            2200..=2299 => "serialization",
            3000..=3099 => "worker",
            5000..=5099 => "configuration",
            _ => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (unknown id, duplicate enqueue, settle races)
    Low,
    /// Operational issues (timeouts, launch failures)
    Medium,
    /// System errors (store failures, bad configuration)
    High,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::JobNotFound
            | ErrorCode::DuplicateJob
            | ErrorCode::InvalidStateTransition => Self::Low,

            ErrorCode::ExecutionTimeout | ErrorCode::LaunchFailed => Self::Medium,

            ErrorCode::DatabaseError
            | ErrorCode::DatabaseConnectionFailed
            | ErrorCode::DatabaseQueryFailed
            | ErrorCode::MigrationFailed
            | ErrorCode::SerializationError
            | ErrorCode::WorkerSpawnFailed
            | ErrorCode::ConfigurationError
            | ErrorCode::MissingConfiguration
            | ErrorCode::InternalError => Self::High,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Conveyor Core.
#[derive(Error, Debug)]
pub struct ConveyorError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to print to the operator)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for ConveyorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl ConveyorError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            source: None,
        }
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    /// Create a job-not-found error.
    pub fn job_not_found(job_id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::JobNotFound, format!("Job not found: {}", job_id))
    }

    /// Create a duplicate-job error.
    pub fn duplicate_job(job_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::DuplicateJob,
            format!("A job with id '{}' already exists", job_id),
        )
    }

    /// Create an invalid-state-transition error.
    pub fn invalid_state(
        job_id: impl fmt::Display,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self::new(
            ErrorCode::InvalidStateTransition,
            format!(
                "Job '{}' is {}, expected {}",
                job_id, actual, expected
            ),
        )
    }

    /// Create an execution-timeout error.
    pub fn execution_timeout(timeout_secs: u64) -> Self {
        Self::new(
            ErrorCode::ExecutionTimeout,
            format!("Timeout exceeded ({}s)", timeout_secs),
        )
    }

    /// Create a launch-failure error.
    pub fn launch_failed(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::LaunchFailed,
            "Command could not be started",
            message,
        )
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    source = ?self.source,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| ConveyorError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| ConveyorError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| ConveyorError::new(ErrorCode::JobNotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| ConveyorError::new(code, "Resource not found"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for ConveyorError {
    fn from(error: sqlx::Error) -> Self {
        let (code, user_msg) = match &error {
            sqlx::Error::RowNotFound => {
                (ErrorCode::JobNotFound, "The requested record was not found")
            }
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    return Self::with_internal(
                        ErrorCode::DuplicateJob,
                        "A record with this identifier already exists",
                        db_err.to_string(),
                    )
                    .with_source(error);
                }
                (ErrorCode::DatabaseQueryFailed, "A database error occurred")
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => (
                ErrorCode::DatabaseConnectionFailed,
                "Unable to open the job store",
            ),
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<sqlx::migrate::MigrateError> for ConveyorError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::with_internal(
            ErrorCode::MigrationFailed,
            "Failed to apply job store schema",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<serde_json::Error> for ConveyorError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to process JSON data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<std::io::Error> for ConveyorError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let (code, user_msg) = match error.kind() {
            ErrorKind::NotFound => (ErrorCode::JobNotFound, "File or resource not found"),
            ErrorKind::TimedOut => (ErrorCode::ExecutionTimeout, "Operation timed out"),
            _ => (ErrorCode::InternalError, "An I/O error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<config::ConfigError> for ConveyorError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::NotFound(_) => (
                ErrorCode::MissingConfiguration,
                "Required configuration not found",
            ),
            _ => (ErrorCode::ConfigurationError, "Invalid configuration"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_categories() {
        assert_eq!(ErrorCode::DuplicateJob.category(), "job");
        assert_eq!(ErrorCode::ExecutionTimeout.category(), "execution");
        assert_eq!(ErrorCode::DatabaseError.category(), "database");
        assert_eq!(ErrorCode::WorkerSpawnFailed.category(), "worker");
        assert_eq!(ErrorCode::InternalError.category(), "internal");
    }

    #[test]
    fn test_retryable_codes() {
        assert!(ErrorCode::ExecutionTimeout.is_retryable());
        assert!(ErrorCode::LaunchFailed.is_retryable());
        assert!(!ErrorCode::DuplicateJob.is_retryable());
        assert!(!ErrorCode::InvalidStateTransition.is_retryable());
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(
            ConveyorError::job_not_found("missing").severity(),
            ErrorSeverity::Low
        );
        assert_eq!(
            ConveyorError::execution_timeout(5).severity(),
            ErrorSeverity::Medium
        );
        assert_eq!(
            ConveyorError::internal("boom").severity(),
            ErrorSeverity::High
        );
    }

    #[test]
    fn test_display_includes_code_and_internal() {
        let err = ConveyorError::with_internal(
            ErrorCode::LaunchFailed,
            "Command could not be started",
            "no such file",
        );
        let s = err.to_string();
        assert!(s.contains("LaunchFailed"));
        assert!(s.contains("no such file"));
    }

    #[test]
    fn test_invalid_state_message() {
        let err = ConveyorError::invalid_state("job1", "processing", "completed");
        assert_eq!(err.code(), ErrorCode::InvalidStateTransition);
        assert!(err.user_message().contains("job1"));
        assert!(err.user_message().contains("processing"));
    }

    #[test]
    fn test_option_context() {
        let missing: Option<u32> = None;
        let err = missing.context("no such job").unwrap_err();
        assert_eq!(err.code(), ErrorCode::JobNotFound);
    }
}
