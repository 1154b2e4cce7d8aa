//! Listener and application options.
//!
//! # Example
//!
//! ```rust
//! use daedalus_server::ListenOptions;
//!
//! let options: ListenOptions = "[::1]:8443".parse().unwrap();
//! assert_eq!(options.hostname(), "::1");
//! assert_eq!(options.port(), 8443);
//! assert_eq!(options.address(), "[::1]:8443");
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use daedalus_core::{KeyRing, StatePolicy};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ServerError;

/// Default hostname to bind.
pub const DEFAULT_HOSTNAME: &str = "0.0.0.0";

/// Default port to bind.
pub const DEFAULT_PORT: u16 = 8080;

const ADDRESS_PATTERN: &str = r"^\[?([^\]]*)\]?:([0-9]{1,5})$";

static ADDRESS: OnceLock<Option<Regex>> = OnceLock::new();

/// The compiled listen address pattern, built on first use.
fn address_pattern() -> Option<&'static Regex> {
    ADDRESS.get_or_init(|| Regex::new(ADDRESS_PATTERN).ok()).as_ref()
}

/// Certificate and key for serving HTTPS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsOptions {
    /// PEM certificate chain.
    pub cert_path: PathBuf,
    /// PEM private key.
    pub key_path: PathBuf,
}

/// Where and how to listen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenOptions {
    hostname: String,
    port: u16,
    tls: Option<TlsOptions>,
}

impl ListenOptions {
    /// Plain HTTP on `hostname:port`. Port `0` picks a free port.
    #[must_use]
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            tls: None,
        }
    }

    /// Serves HTTPS with the given PEM files.
    #[must_use]
    pub fn with_tls(mut self, cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        self.tls = Some(TlsOptions {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        });
        self
    }

    /// The hostname to bind.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The port to bind.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// TLS material, if serving HTTPS.
    #[must_use]
    pub fn tls(&self) -> Option<&TlsOptions> {
        self.tls.as_ref()
    }

    /// Returns `true` when serving HTTPS.
    #[must_use]
    pub fn secure(&self) -> bool {
        self.tls.is_some()
    }

    /// `host:port`, bracketing IPv6 hosts.
    #[must_use]
    pub fn address(&self) -> String {
        if self.hostname.contains(':') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self::new(DEFAULT_HOSTNAME, DEFAULT_PORT)
    }
}

impl FromStr for ListenOptions {
    type Err = ServerError;

    /// Parses `host:port` or `[ipv6]:port`. An empty host binds every
    /// interface.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ServerError::InvalidAddress(s.to_string());
        let pattern = address_pattern().ok_or_else(invalid)?;
        let captures = pattern.captures(s).ok_or_else(invalid)?;

        let hostname = captures.get(1).map_or("", |m| m.as_str());
        let port = captures
            .get(2)
            .and_then(|m| m.as_str().parse::<u16>().ok())
            .ok_or_else(invalid)?;

        let hostname = if hostname.is_empty() {
            DEFAULT_HOSTNAME
        } else {
            hostname
        };
        Ok(Self::new(hostname, port))
    }
}

impl fmt::Display for ListenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure() { "https" } else { "http" };
        write!(f, "{scheme}://{}", self.address())
    }
}

/// Application-wide settings.
///
/// # Example
///
/// ```rust
/// use daedalus_core::StatePolicy;
/// use daedalus_server::ApplicationOptions;
///
/// let options = ApplicationOptions::new()
///     .state_policy(StatePolicy::Alias)
///     .proxy(true)
///     .state_value("version", "1.0");
/// assert!(options.proxy);
/// ```
#[derive(Clone)]
pub struct ApplicationOptions {
    /// How each request's state is derived from the application state.
    pub state_policy: StatePolicy,
    /// Trust `x-forwarded-*` headers.
    pub proxy: bool,
    /// Log request errors through `tracing`.
    pub log_errors: bool,
    /// Key ring for signing cookies.
    pub keys: Option<Arc<dyn KeyRing>>,
    /// Initial application state.
    pub state: Map<String, Value>,
}

impl Default for ApplicationOptions {
    fn default() -> Self {
        Self {
            state_policy: StatePolicy::default(),
            proxy: false,
            log_errors: true,
            keys: None,
            state: Map::new(),
        }
    }
}

impl ApplicationOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the state policy.
    #[must_use]
    pub fn state_policy(mut self, policy: StatePolicy) -> Self {
        self.state_policy = policy;
        self
    }

    /// Trusts proxy headers.
    #[must_use]
    pub fn proxy(mut self, proxy: bool) -> Self {
        self.proxy = proxy;
        self
    }

    /// Enables or disables error logging.
    #[must_use]
    pub fn log_errors(mut self, log_errors: bool) -> Self {
        self.log_errors = log_errors;
        self
    }

    /// Sets the key ring.
    #[must_use]
    pub fn keys(mut self, keys: Arc<dyn KeyRing>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Seeds one application state entry.
    #[must_use]
    pub fn state_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }
}

impl fmt::Debug for ApplicationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationOptions")
            .field("state_policy", &self.state_policy)
            .field("proxy", &self.proxy)
            .field("log_errors", &self.log_errors)
            .field("keys", &self.keys.is_some())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port() {
        let options: ListenOptions = "127.0.0.1:3000".parse().unwrap();
        assert_eq!(options.hostname(), "127.0.0.1");
        assert_eq!(options.port(), 3000);
        assert!(!options.secure());
    }

    #[test]
    fn test_parse_ipv6() {
        let options: ListenOptions = "[::]:80".parse().unwrap();
        assert_eq!(options.hostname(), "::");
        assert_eq!(options.to_string(), "http://[::]:80");
    }

    #[test]
    fn test_parse_empty_host() {
        let options: ListenOptions = ":9000".parse().unwrap();
        assert_eq!(options.hostname(), DEFAULT_HOSTNAME);
    }

    #[test]
    fn test_parse_rejects() {
        for input in ["localhost", "host:", "host:123456", "host:99999", "host:80/path"] {
            assert!(
                matches!(input.parse::<ListenOptions>(), Err(ServerError::InvalidAddress(_))),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn test_address_pattern_compiled_once() {
        let first = address_pattern().unwrap();
        let _ = "127.0.0.1:80".parse::<ListenOptions>().unwrap();
        assert!(std::ptr::eq(first, address_pattern().unwrap()));
    }

    #[test]
    fn test_tls_marks_secure() {
        let options = ListenOptions::new("localhost", 443).with_tls("cert.pem", "key.pem");
        assert!(options.secure());
        assert_eq!(options.to_string(), "https://localhost:443");
    }

    #[test]
    fn test_application_defaults() {
        let options = ApplicationOptions::default();
        assert_eq!(options.state_policy, StatePolicy::Clone);
        assert!(options.log_errors);
        assert!(!options.proxy);
    }
}
