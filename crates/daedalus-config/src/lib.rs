//! Typed configuration for Daedalus services.
//!
//! - [`DaedalusConfig`] - the root, with [`ServerConfig`], [`RouterConfig`]
//!   and the logging [`LogConfig`](daedalus_telemetry::LogConfig) sections
//! - [`ConfigLoader`] - defaults → file → environment, then validation
//!
//! Unknown fields are rejected at every level.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! address = "0.0.0.0:8080"
//! proxy = false
//! log_errors = true
//! state_policy = "clone"
//!
//! [router]
//! prefix = "/api"
//! sensitive = false
//! strict = false
//!
//! [logging]
//! level = "info"
//! json_format = true
//! service_name = "chores"
//! ```
//!
//! # Environment Variable Overrides
//!
//! With [`ConfigLoader::with_env_prefix`], any field can be overridden as
//! `PREFIX__SECTION__KEY`:
//!
//! - `DAEDALUS__SERVER__ADDRESS=0.0.0.0:9000`
//! - `DAEDALUS__SERVER__TLS__CERT_PATH=/etc/daedalus/cert.pem`
//! - `DAEDALUS__LOGGING__LEVEL=debug`

#![doc(html_root_url = "https://docs.rs/daedalus-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::{DaedalusConfig, RouterConfig, ServerConfig};
pub use error::ConfigError;
pub use loader::ConfigLoader;
