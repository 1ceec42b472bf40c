//! Shimload Telemetry - logging setup and run correlation.
//!
//! This crate provides:
//! - [`LogConfig`] and [`setup_logging`] to install a `tracing` subscriber
//!   with a chosen format and target (stdout, stderr, or rolling files)
//! - [`RunContext`] and [`RunGuard`] to correlate every log line of one
//!   invocation under a single span
//!
//! # Example
//!
//! ```rust,no_run
//! use shimload_telemetry::{LogConfig, LogFormat, RunContext, RunGuard, setup_logging};
//!
//! # fn main() -> Result<(), shimload_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("shimload_core=debug");
//! setup_logging(&config)?;
//!
//! let guard = RunGuard::new(RunContext::new("plan").with_label("payloads", "2"));
//! tracing::info!("Planning");
//! guard.finish(true);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::{RunContext, RunGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging,
    setup_logging,
};
