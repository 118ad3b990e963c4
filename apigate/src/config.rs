use discovery::DEFAULT_DISCOVERY_PATH;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Sync interval cannot be 0")]
    InvalidSyncInterval,

    #[error("Pull timeout cannot be 0")]
    InvalidPullTimeout,

    #[error("Discovery path must start with '/': {0}")]
    InvalidDiscoveryPath(String),

    #[error("Empty backend name")]
    EmptyBackendName,

    #[error("Duplicate backend name: {0}")]
    DuplicateBackend(String),

    #[error("Backend {0} has an empty group or version")]
    EmptyGroupVersion(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Serves the merged discovery document
    pub listener: Listener,
    /// Serves health and readiness probes
    pub admin_listener: Listener,
    #[serde(default = "default_discovery_path")]
    pub discovery_path: String,
    #[serde(default)]
    pub sync: SyncConfig,
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

fn default_discovery_path() -> String {
    DEFAULT_DISCOVERY_PATH.to_string()
}

impl Config {
    /// Loads and validates a config file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.sync.validate()?;

        if !self.discovery_path.starts_with('/') {
            return Err(ValidationError::InvalidDiscoveryPath(
                self.discovery_path.clone(),
            ));
        }

        let mut backend_names = HashSet::new();
        for backend in &self.backends {
            if backend.name.is_empty() {
                return Err(ValidationError::EmptyBackendName);
            }

            if !backend_names.insert(&backend.name) {
                return Err(ValidationError::DuplicateBackend(backend.name.clone()));
            }

            if backend.group.is_empty() || backend.version.is_empty() {
                return Err(ValidationError::EmptyGroupVersion(backend.name.clone()));
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Seconds between full resynchronization passes
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound on a single pull from one backend
    #[serde(default = "default_pull_timeout_secs")]
    pub pull_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_pull_timeout_secs() -> u64 {
    5
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            interval_secs: default_interval_secs(),
            pull_timeout_secs: default_pull_timeout_secs(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval_secs == 0 {
            return Err(ValidationError::InvalidSyncInterval);
        }
        if self.pull_timeout_secs == 0 {
            return Err(ValidationError::InvalidPullTimeout);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

/// A remote backend contributing one group version.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// Unique source identity
    pub name: String,
    pub group: String,
    pub version: String,
    /// Base URL of the backend. Invalid URLs are rejected during deserialization.
    pub url: Url,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    fn base_config() -> Config {
        Config {
            listener: Listener {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            admin_listener: Listener {
                host: "127.0.0.1".to_string(),
                port: 8081,
            },
            discovery_path: "/apis".to_string(),
            sync: SyncConfig::default(),
            metrics: None,
            logging: None,
            backends: vec![BackendConfig {
                name: "v1.stable.example.com".to_string(),
                group: "stable.example.com".to_string(),
                version: "v1".to_string(),
                url: Url::parse("http://10.0.0.1:8443").unwrap(),
            }],
        }
    }

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
listener:
    host: "0.0.0.0"
    port: 8080
admin_listener:
    host: "127.0.0.1"
    port: 8081
sync:
    interval_secs: 30
metrics:
    statsd_host: 127.0.0.1
    statsd_port: 8125
backends:
    - name: v1.stable.example.com
      group: stable.example.com
      version: v1
      url: "http://10.0.0.1:8443"
    - name: v2.stable.example.com
      group: stable.example.com
      version: v2
      url: "http://10.0.0.2:8443/prefix"
"#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.discovery_path, "/apis");
        assert_eq!(config.sync.interval_secs, 30);
        assert_eq!(config.sync.pull_timeout_secs, 5);
        assert_eq!(config.metrics.unwrap().statsd_port, 8125);
        assert!(config.logging.is_none());
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[1].url.path(), "/prefix");
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let yaml = r#"
listener: {host: 0.0.0.0, port: 8080}
admin_listener: {host: 127.0.0.1, port: 8081}
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.discovery_path, DEFAULT_DISCOVERY_PATH);
        assert_eq!(config.sync, SyncConfig::default());
        assert!(config.backends.is_empty());
    }

    #[test]
    fn test_validation_errors() {
        assert!(base_config().validate().is_ok());

        let mut config = base_config();
        config.admin_listener.port = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::InvalidPort
        ));

        let mut config = base_config();
        config.sync.interval_secs = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::InvalidSyncInterval
        ));

        let mut config = base_config();
        config.sync.pull_timeout_secs = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::InvalidPullTimeout
        ));

        let mut config = base_config();
        config.discovery_path = "apis".to_string();
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::InvalidDiscoveryPath(_)
        ));

        let mut config = base_config();
        config.backends.push(config.backends[0].clone());
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::DuplicateBackend(_)
        ));

        let mut config = base_config();
        config.backends[0].name = String::new();
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::EmptyBackendName
        ));

        let mut config = base_config();
        config.backends[0].version = String::new();
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::EmptyGroupVersion(_)
        ));
    }

    #[test]
    fn test_load_errors() {
        let missing = std::path::Path::new("/nonexistent/apigate.yaml");
        assert!(matches!(
            Config::from_file(missing).unwrap_err(),
            ConfigError::LoadError(_)
        ));

        let tmp = write_tmp_file("listener: [not, a, listener]");
        assert!(matches!(
            Config::from_file(tmp.path()).unwrap_err(),
            ConfigError::ParseError(_)
        ));

        // Invalid URL
        let tmp = write_tmp_file(
            r#"
listener: {host: 0.0.0.0, port: 8080}
admin_listener: {host: 127.0.0.1, port: 8081}
backends:
    - {name: broken, group: stable.example.com, version: v1, url: "not a url"}
"#,
        );
        assert!(matches!(
            Config::from_file(tmp.path()).unwrap_err(),
            ConfigError::ParseError(_)
        ));

        let tmp = write_tmp_file(
            r#"
listener: {host: 0.0.0.0, port: 0}
admin_listener: {host: 127.0.0.1, port: 8081}
"#,
        );
        assert!(matches!(
            Config::from_file(tmp.path()).unwrap_err(),
            ConfigError::Invalid(ValidationError::InvalidPort)
        ));
    }
}
