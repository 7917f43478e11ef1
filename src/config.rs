//! Configuration for the console server

use crate::infrastructure::{DiscoveryOptions, DEFAULT_DISCOVERY_ROOT, DEFAULT_FALLBACK_BASE_DNS};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main console configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Directory client and base DN discovery
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Log file and level
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-operation timeout in seconds
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Entry whose immediate children are offered as databases
    #[serde(default = "default_discovery_root")]
    pub discovery_root: String,

    /// Well-known base DNs checked when the root search fails
    #[serde(default = "default_fallback_base_dns")]
    pub fallback_base_dns: Vec<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            operation_timeout_secs: default_operation_timeout(),
            discovery_root: default_discovery_root(),
            fallback_base_dns: default_fallback_base_dns(),
        }
    }
}

impl DirectoryConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn discovery(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            root: self.discovery_root.clone(),
            fallbacks: self.fallback_base_dns.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory of the log file; the executable's directory when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Log file name
    #[serde(default = "default_log_file")]
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            file_name: default_log_file(),
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_operation_timeout() -> u64 {
    30
}

fn default_discovery_root() -> String {
    DEFAULT_DISCOVERY_ROOT.to_string()
}

fn default_fallback_base_dns() -> Vec<String> {
    DEFAULT_FALLBACK_BASE_DNS.iter().map(|dn| dn.to_string()).collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "ldap-console.log".to_string()
}

impl ConsoleConfig {
    /// Load configuration from defaults, an optional file and
    /// `LDAP_CONSOLE__SECTION__KEY` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&ConsoleConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("LDAP_CONSOLE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConsoleConfig::default();
        assert_eq!(config.server.listen_addr.port(), 3000);
        assert!(config.server.enable_cors);
        assert_eq!(config.directory.operation_timeout(), Duration::from_secs(30));
        assert_eq!(config.logging.file_name, "ldap-console.log");
        assert!(config.logging.directory.is_none());
    }

    #[test]
    fn test_discovery_options() {
        let options = DirectoryConfig::default().discovery();
        assert_eq!(options, DiscoveryOptions::default());
    }

    #[test]
    fn test_load_without_file() {
        let config = ConsoleConfig::load(None).unwrap();
        assert_eq!(config.directory.connect_timeout_secs, 10);
        assert_eq!(config.directory.discovery_root, DEFAULT_DISCOVERY_ROOT);
    }
}
