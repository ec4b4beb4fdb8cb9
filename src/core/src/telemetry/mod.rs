//! Telemetry infrastructure.
//!
//! Conveyor's observability is structured logging: the `logging` module
//! configures a `tracing` subscriber with JSON, pretty, or compact output.

pub mod logging;

pub use logging::{init_logging, LogFormat, LoggingConfig};
