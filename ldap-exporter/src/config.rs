//! Configuration for the LDAP exporter process.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// LDAP connection settings.
    #[serde(default)]
    pub ldap: LdapConfig,

    /// HTTP endpoint settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Which metrics to export.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// LDAP server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Server URI (default: "ldap://localhost:389").
    #[serde(default = "default_uri")]
    pub uri: String,

    /// DN to bind as; anonymous when unset.
    #[serde(default)]
    pub bind_dn: Option<String>,

    /// Password for `bind_dn`.
    #[serde(default)]
    pub bind_password: Option<String>,

    /// Upgrade an `ldap://` connection with StartTLS.
    #[serde(default)]
    pub starttls: bool,

    /// Skip TLS certificate verification.
    #[serde(default)]
    pub tls_skip_verify: bool,

    /// Connection and operation timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_uri() -> String {
    "ldap://localhost:389".to_string()
}

fn default_timeout() -> u64 {
    10
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            bind_dn: None,
            bind_password: None,
            starttls: false,
            tls_skip_verify: false,
            timeout_secs: default_timeout(),
        }
    }
}

impl LdapConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address to listen on (default: "0.0.0.0:9095").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:9095".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

/// Metric selection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// YAML metrics configuration file.
    #[serde(default)]
    pub config: Option<PathBuf>,

    /// Do not load the built-in metrics of the detected server vendor.
    #[serde(default)]
    pub disable_vendor_metrics: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheme = self.ldap.uri.split_once("://").map(|(scheme, _)| scheme);
        if !matches!(scheme, Some("ldap" | "ldaps" | "ldapi")) {
            return Err(ConfigError::Validation(format!(
                "Unsupported LDAP URI '{}': scheme must be ldap, ldaps or ldapi",
                self.ldap.uri
            )));
        }

        if self.ldap.starttls && scheme != Some("ldap") {
            return Err(ConfigError::Validation(
                "starttls can only be used with ldap:// URIs".to_string(),
            ));
        }

        if self.ldap.bind_dn.is_some() != self.ldap.bind_password.is_some() {
            return Err(ConfigError::Validation(
                "bind_dn and bind_password must be given together".to_string(),
            ));
        }

        if self.ldap.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "timeout_secs must be > 0".to_string(),
            ));
        }

        // Validate listen address format
        if self.http.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.http.listen
            )));
        }

        // Validate path starts with /
        if !self.http.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let config = ExporterConfig::parse("{}").unwrap();

        assert_eq!(config.ldap.uri, "ldap://localhost:389");
        assert_eq!(config.ldap.timeout(), Duration::from_secs(10));
        assert!(config.ldap.bind_dn.is_none());
        assert_eq!(config.http.listen, "0.0.0.0:9095");
        assert_eq!(config.http.path, "/metrics");
        assert!(config.metrics.config.is_none());
        assert!(!config.metrics.disable_vendor_metrics);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            // Directory to scrape
            ldap: {
                uri: "ldaps://ldap.example.com:636",
                bind_dn: "cn=Directory Manager",
                bind_password: "secret",
                tls_skip_verify: true,
                timeout_secs: 30,
            },
            http: {
                listen: "127.0.0.1:9100",
                path: "/ldap/metrics",
            },
            metrics: {
                config: "/etc/ldap-exporter/metrics.yaml",
                disable_vendor_metrics: true,
            },
            logging: {
                level: "debug",
                format: "json",
            },
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.ldap.uri, "ldaps://ldap.example.com:636");
        assert_eq!(config.ldap.bind_dn.as_deref(), Some("cn=Directory Manager"));
        assert!(config.ldap.tls_skip_verify);
        assert_eq!(config.ldap.timeout_secs, 30);
        assert_eq!(config.http.listen, "127.0.0.1:9100");
        assert_eq!(config.http.path, "/ldap/metrics");
        assert_eq!(
            config.metrics.config,
            Some(PathBuf::from("/etc/ldap-exporter/metrics.yaml"))
        );
        assert!(config.metrics.disable_vendor_metrics);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validate_uri_scheme() {
        let result = ExporterConfig::parse(r#"{ ldap: { uri: "http://example.com" } }"#);
        assert!(result.unwrap_err().to_string().contains("Unsupported LDAP URI"));

        assert!(ExporterConfig::parse(r#"{ ldap: { uri: "ldapi://%2Fvar%2Frun%2Fslapd.sock" } }"#).is_ok());
    }

    #[test]
    fn test_validate_starttls_requires_plain_ldap() {
        let result =
            ExporterConfig::parse(r#"{ ldap: { uri: "ldaps://example.com", starttls: true } }"#);
        assert!(result.unwrap_err().to_string().contains("starttls"));

        assert!(
            ExporterConfig::parse(r#"{ ldap: { uri: "ldap://example.com", starttls: true } }"#)
                .is_ok()
        );
    }

    #[test]
    fn test_validate_bind_credentials_together() {
        let result = ExporterConfig::parse(r#"{ ldap: { bind_dn: "cn=admin" } }"#);
        assert!(result.unwrap_err().to_string().contains("together"));
    }

    #[test]
    fn test_validate_invalid_listen() {
        let result = ExporterConfig::parse(r#"{ http: { listen: "not-an-address" } }"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let result = ExporterConfig::parse(r#"{ http: { path: "no-leading-slash" } }"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must start with /")
        );
    }

    #[test]
    fn test_validate_zero_timeout() {
        assert!(ExporterConfig::parse(r#"{ ldap: { timeout_secs: 0 } }"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{ http: { listen: "127.0.0.1:9200" } }"#)
            .unwrap();

        let config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.http.listen, "127.0.0.1:9200");
    }
}
