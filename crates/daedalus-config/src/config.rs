//! Configuration types.

use daedalus_core::StatePolicy;
use daedalus_router::RouterOptions;
use daedalus_server::{ApplicationOptions, ListenOptions, TlsOptions};
use daedalus_telemetry::LogConfig;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Root configuration of a Daedalus service.
///
/// Every section falls back to its defaults, and unknown fields are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaedalusConfig {
    /// Listener and application settings.
    pub server: ServerConfig,
    /// Router settings.
    pub router: RouterConfig,
    /// Logging settings.
    pub logging: LogConfig,
}

impl DaedalusConfig {
    /// Debug logging with pretty output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            logging: LogConfig::development(),
            ..Self::default()
        }
    }

    /// JSON logging at info level.
    #[must_use]
    pub fn production() -> Self {
        Self {
            logging: LogConfig::production(),
            ..Self::default()
        }
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.router.validate()?;
        self.logging
            .validate()
            .map_err(|e| ConfigError::invalid_value("logging", e.to_string()))
    }
}

/// Listener and application settings.
///
/// ```toml
/// [server]
/// address = "127.0.0.1:3000"
/// proxy = true
/// state_policy = "prototype"
///
/// [server.tls]
/// cert_path = "/etc/daedalus/cert.pem"
/// key_path = "/etc/daedalus/key.pem"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// `host:port` or `[ipv6]:port`.
    pub address: String,
    /// Certificate and key for HTTPS.
    pub tls: Option<TlsOptions>,
    /// Trust `x-forwarded-*` headers.
    pub proxy: bool,
    /// Log request errors.
    pub log_errors: bool,
    /// How request state is derived from application state.
    pub state_policy: StatePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: format!("{}:{}", daedalus_server::DEFAULT_HOSTNAME, daedalus_server::DEFAULT_PORT),
            tls: None,
            proxy: false,
            log_errors: true,
            state_policy: StatePolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Where to listen.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the address does not parse.
    pub fn listen_options(&self) -> Result<ListenOptions, ConfigError> {
        let options: ListenOptions = self
            .address
            .parse()
            .map_err(|e: daedalus_server::ServerError| ConfigError::invalid_value("server.address", e.to_string()))?;
        Ok(match &self.tls {
            Some(tls) => options.with_tls(tls.cert_path.clone(), tls.key_path.clone()),
            None => options,
        })
    }

    /// Application options for these settings.
    #[must_use]
    pub fn application_options(&self) -> ApplicationOptions {
        ApplicationOptions::new()
            .proxy(self.proxy)
            .log_errors(self.log_errors)
            .state_policy(self.state_policy)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.listen_options()?;
        if let Some(tls) = &self.tls {
            if tls.cert_path.as_os_str().is_empty() {
                return Err(ConfigError::invalid_value("server.tls.cert_path", "must not be empty"));
            }
            if tls.key_path.as_os_str().is_empty() {
                return Err(ConfigError::invalid_value("server.tls.key_path", "must not be empty"));
            }
        }
        Ok(())
    }
}

/// Router settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Prefix for every route, e.g. `"/api"`.
    pub prefix: Option<String>,
    /// Case-sensitive matching.
    pub sensitive: bool,
    /// Strict trailing-slash matching.
    pub strict: bool,
}

impl RouterConfig {
    /// Router options for these settings.
    #[must_use]
    pub fn router_options(&self) -> RouterOptions {
        let options = RouterOptions::default()
            .sensitive(self.sensitive)
            .strict(self.strict);
        match &self.prefix {
            Some(prefix) => options.prefix(prefix.clone()),
            None => options,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match &self.prefix {
            Some(prefix) if !prefix.starts_with('/') => {
                Err(ConfigError::invalid_value("router.prefix", "must start with '/'"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DaedalusConfig::default();
        assert_eq!(config.server.address, "0.0.0.0:8080");
        assert!(config.server.log_errors);
        assert_eq!(config.router.prefix, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_listen_options_with_tls() {
        let server = ServerConfig {
            address: "[::1]:8443".to_string(),
            tls: Some(TlsOptions {
                cert_path: "cert.pem".into(),
                key_path: "key.pem".into(),
            }),
            ..ServerConfig::default()
        };
        let options = server.listen_options().unwrap();
        assert_eq!(options.hostname(), "::1");
        assert!(options.secure());
        assert_eq!(options.to_string(), "https://[::1]:8443");
    }

    #[test]
    fn test_invalid_address() {
        let config = DaedalusConfig {
            server: ServerConfig {
                address: "localhost".to_string(),
                ..ServerConfig::default()
            },
            ..DaedalusConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_router_prefix_must_be_absolute() {
        let router = RouterConfig {
            prefix: Some("api".to_string()),
            ..RouterConfig::default()
        };
        assert!(router.validate().is_err());

        let router = RouterConfig {
            prefix: Some("/api".to_string()),
            sensitive: true,
            strict: false,
        };
        let options = router.router_options();
        assert_eq!(options.prefix.as_deref(), Some("/api"));
        assert!(options.sensitive);
    }

    #[test]
    fn test_application_options() {
        let server = ServerConfig {
            proxy: true,
            state_policy: StatePolicy::Alias,
            ..ServerConfig::default()
        };
        let options = server.application_options();
        assert!(options.proxy);
        assert_eq!(options.state_policy, StatePolicy::Alias);
    }
}
