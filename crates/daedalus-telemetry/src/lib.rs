//! Logging setup for Daedalus services.
//!
//! The framework crates emit `tracing` events. This crate installs the
//! subscriber that turns them into output:
//!
//! - [`LogConfig`] - filter directives and output format
//! - [`init_logging`] - installs the global subscriber
//! - [`logging::fields`] - field names shared by framework events
//!
//! # Example
//!
//! ```rust,no_run
//! use daedalus_telemetry::{init_logging, LogConfig};
//!
//! let config = LogConfig::production().with_service_name("chores");
//! init_logging(&config).expect("logging");
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
