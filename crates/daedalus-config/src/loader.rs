//! Layered configuration loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use daedalus_core::StatePolicy;
use daedalus_server::TlsOptions;

use crate::{ConfigError, DaedalusConfig};

/// Loads a [`DaedalusConfig`] in layers, later layers overriding earlier
/// ones:
///
/// 1. defaults (or a preset)
/// 2. a TOML or JSON file
/// 3. `PREFIX__SECTION__KEY` environment variables
///
/// # Example
///
/// ```no_run
/// use daedalus_config::ConfigLoader;
///
/// # fn main() -> Result<(), daedalus_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_dotenv()?
///     .with_optional_file("daedalus.toml")?
///     .with_env_prefix("DAEDALUS")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: DaedalusConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Starts from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: DaedalusConfig::default(),
            env_prefix: None,
        }
    }

    /// Starts from the development preset.
    ///
    /// ```
    /// use daedalus_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = DaedalusConfig::development();
        self
    }

    /// Starts from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = DaedalusConfig::production();
        self
    }

    /// Loads a `.toml` or `.json` file. Sections it omits keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, unreadable, malformed or has unknown
    /// fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        self.config = parse_file(&content, path)?;
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is skipped.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration from a string in the given format (`toml` or
    /// `json`).
    ///
    /// ```
    /// use daedalus_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [server]
    ///     address = "127.0.0.1:3000"
    /// "#;
    /// let config = ConfigLoader::new().with_string(toml, "toml").unwrap().load().unwrap();
    /// assert_eq!(config.server.address, "127.0.0.1:3000");
    /// ```
    ///
    /// # Errors
    ///
    /// Fails on malformed input, unknown fields or an unsupported format.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Reads `PREFIX__SECTION__KEY` overrides at [`load`](Self::load), e.g.
    /// `DAEDALUS__SERVER__ADDRESS=0.0.0.0:9000` or
    /// `DAEDALUS__LOGGING__LEVEL=debug`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Loads `.env` from the working directory or its parents into the
    /// process environment. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Fails if a `.env` file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    /// Applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Fails on an unparsable or unknown override, or an invalid result.
    pub fn load(mut self) -> Result<DaedalusConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let mut vars: Vec<(String, String)> = env::vars().filter(|(key, _)| key.starts_with(&prefix)).collect();
            vars.sort();
            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without env overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> DaedalusConfig {
        self.config
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(path) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            // Shares the prefix but not the separator, e.g. DAEDALUSX.
            return Ok(());
        };
        let parts: Vec<&str> = path.split("__").collect();
        let bool_value = || parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"));

        let config = &mut self.config;
        match parts.as_slice() {
            ["SERVER", "ADDRESS"] => config.server.address = value.to_string(),
            ["SERVER", "PROXY"] => config.server.proxy = bool_value()?,
            ["SERVER", "LOG_ERRORS"] => config.server.log_errors = bool_value()?,
            ["SERVER", "STATE_POLICY"] => {
                config.server.state_policy = value
                    .parse::<StatePolicy>()
                    .map_err(|e| ConfigError::env_parse_error(key, e.to_string()))?;
            }
            ["SERVER", "TLS", "CERT_PATH"] => tls_mut(&mut config.server.tls).cert_path = PathBuf::from(value),
            ["SERVER", "TLS", "KEY_PATH"] => tls_mut(&mut config.server.tls).key_path = PathBuf::from(value),

            ["ROUTER", "PREFIX"] => {
                config.router.prefix = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            ["ROUTER", "SENSITIVE"] => config.router.sensitive = bool_value()?,
            ["ROUTER", "STRICT"] => config.router.strict = bool_value()?,

            ["LOGGING", "ENABLED"] => config.logging.enabled = bool_value()?,
            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "JSON_FORMAT"] => config.logging.json_format = bool_value()?,
            ["LOGGING", "SPAN_EVENTS"] => config.logging.span_events = bool_value()?,
            ["LOGGING", "FILE_LINE_INFO"] => config.logging.file_line_info = bool_value()?,
            ["LOGGING", "THREAD_IDS"] => config.logging.thread_ids = bool_value()?,
            ["LOGGING", "INCLUDE_TARGET"] => config.logging.include_target = bool_value()?,
            ["LOGGING", "SERVICE_NAME"] => config.logging.service_name = value.to_string(),

            [section, .., field] => {
                return Err(ConfigError::unknown_field(*field, section.to_lowercase()));
            }
            [_] | [] => return Err(ConfigError::env_parse_error(key, "expected PREFIX__SECTION__KEY")),
        }
        Ok(())
    }
}

fn parse_file(content: &str, path: &Path) -> Result<DaedalusConfig, ConfigError> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_lowercase);
    match extension.as_deref() {
        Some("toml") => Ok(toml::from_str(content)?),
        Some("json") => Ok(serde_json::from_str(content)?),
        _ => Err(ConfigError::validation_error(format!(
            "unsupported configuration file format: {}",
            path.display()
        ))),
    }
}

fn tls_mut(tls: &mut Option<TlsOptions>) -> &mut TlsOptions {
    tls.get_or_insert_with(|| TlsOptions {
        cert_path: PathBuf::new(),
        key_path: PathBuf::new(),
    })
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.server.address, "0.0.0.0:8080");
    }

    #[test]
    fn test_loader_presets() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert!(!config.logging.json_format);

        let config = ConfigLoader::new().with_production().load().unwrap();
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"server": {"address": "127.0.0.1:3000"}, "router": {"prefix": "/api"}}"#;
        let config = ConfigLoader::new().with_string(json, "json").unwrap().load().unwrap();
        assert_eq!(config.server.address, "127.0.0.1:3000");
        assert_eq!(config.router.prefix.as_deref(), Some("/api"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_loader_rejects_unknown_fields() {
        let toml = r#"
            [server]
            http_addr = "127.0.0.1:3000"
        "#;
        let result = ConfigLoader::new().with_string(toml, "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_unsupported_format() {
        let result = ConfigLoader::new().with_string("", "yaml");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_loader_with_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [server]
            address = "[::]:8443"
            state_policy = "prototype"

            [server.tls]
            cert_path = "/etc/daedalus/cert.pem"
            key_path = "/etc/daedalus/key.pem"

            [logging]
            level = "warn"
            "#
        )
        .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.server.state_policy, StatePolicy::Prototype);
        assert!(config.server.listen_options().unwrap().secure());
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/daedalus.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/daedalus.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.server.address, "0.0.0.0:8080");
    }

    #[test]
    fn test_load_validates() {
        let json = r#"{"server": {"address": "nowhere"}}"#;
        let result = ConfigLoader::new().with_string(json, "json").unwrap().load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load_unvalidated();
        assert_eq!(config.server.address, "nowhere");
    }

    #[test]
    fn test_apply_env_var_server() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__SERVER__ADDRESS", "127.0.0.1:9000", "TEST").unwrap();
        loader.apply_env_var("TEST__SERVER__PROXY", "yes", "TEST").unwrap();
        loader.apply_env_var("TEST__SERVER__STATE_POLICY", "alias", "TEST").unwrap();
        assert_eq!(loader.config.server.address, "127.0.0.1:9000");
        assert!(loader.config.server.proxy);
        assert_eq!(loader.config.server.state_policy, StatePolicy::Alias);
    }

    #[test]
    fn test_apply_env_var_tls_creates_section() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__SERVER__TLS__CERT_PATH", "cert.pem", "TEST").unwrap();
        assert!(loader.config.validate().is_err());

        loader.apply_env_var("TEST__SERVER__TLS__KEY_PATH", "key.pem", "TEST").unwrap();
        assert!(loader.config.validate().is_ok());
    }

    #[test]
    fn test_apply_env_var_logging_and_router() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__LOGGING__LEVEL", "debug", "TEST").unwrap();
        loader.apply_env_var("TEST__LOGGING__JSON_FORMAT", "off", "TEST").unwrap();
        loader.apply_env_var("TEST__ROUTER__PREFIX", "/v1", "TEST").unwrap();
        loader.apply_env_var("TEST__ROUTER__STRICT", "1", "TEST").unwrap();
        assert_eq!(loader.config.logging.level, "debug");
        assert!(!loader.config.logging.json_format);
        assert_eq!(loader.config.router.prefix.as_deref(), Some("/v1"));
        assert!(loader.config.router.strict);
    }

    #[test]
    fn test_apply_env_var_errors() {
        let mut loader = ConfigLoader::new();
        assert!(matches!(
            loader.apply_env_var("TEST__SERVER__PROXY", "maybe", "TEST"),
            Err(ConfigError::EnvParseError { .. })
        ));
        assert!(matches!(
            loader.apply_env_var("TEST__SERVER__STATE_POLICY", "shared", "TEST"),
            Err(ConfigError::EnvParseError { .. })
        ));
        assert!(matches!(
            loader.apply_env_var("TEST__LOGGING__COLOUR", "red", "TEST"),
            Err(ConfigError::UnknownField { .. })
        ));
        assert!(loader.apply_env_var("TESTING", "x", "TEST").is_ok());
    }

    #[test]
    fn test_env_prefix_overrides_file() {
        env::set_var("DAEDALUS_LOADER_TEST__SERVER__ADDRESS", "127.0.0.1:7070");
        let json = r#"{"server": {"address": "127.0.0.1:3000"}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .with_env_prefix("daedalus_loader_test")
            .load()
            .unwrap();
        env::remove_var("DAEDALUS_LOADER_TEST__SERVER__ADDRESS");
        assert_eq!(config.server.address, "127.0.0.1:7070");
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("No"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }
}
