//! Configuration loading and validation.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result, ValidationError};

/// Main configuration for hostpatch.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Network interface to sniff on. If None, auto-detect.
    pub interface: Option<String>,

    /// Hosts file that known hosts are loaded from and new records appended to.
    #[serde(default = "default_hosts_path")]
    pub hosts_path: PathBuf,

    /// Seconds to wait between two resolution cycles.
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    /// External lookup API settings.
    #[serde(default)]
    pub lookup: LookupSettings,

    /// Resolver cache flushing after new records are written.
    #[serde(default)]
    pub flush: FlushSettings,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Settings for the HTTP lookup API used to resolve blackholed hosts.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupSettings {
    /// Endpoint receiving the JSON lookup request.
    #[serde(default = "default_lookup_endpoint")]
    pub endpoint: String,

    /// Provider identifier sent as `dnsServer`.
    #[serde(default = "default_dns_server")]
    pub dns_server: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_lookup_timeout")]
    pub timeout_secs: u64,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            endpoint: default_lookup_endpoint(),
            dns_server: default_dns_server(),
            timeout_secs: default_lookup_timeout(),
        }
    }
}

impl LookupSettings {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Settings for the OS resolver cache flush.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlushSettings {
    /// Flush the resolver cache after a cycle that wrote records.
    #[serde(default = "default_flush_enabled")]
    pub enabled: bool,

    /// Program and arguments to run instead of the platform default.
    pub command: Option<Vec<String>>,
}

impl Default for FlushSettings {
    fn default() -> Self {
        Self {
            enabled: default_flush_enabled(),
            command: None,
        }
    }
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Address of the `/metrics` HTTP listener.
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

#[cfg(windows)]
fn default_hosts_path() -> PathBuf {
    PathBuf::from(r"C:\Windows\System32\drivers\etc\hosts")
}

#[cfg(not(windows))]
fn default_hosts_path() -> PathBuf {
    PathBuf::from("/etc/hosts")
}

const fn default_cycle_interval() -> u64 {
    5
}

fn default_lookup_endpoint() -> String {
    "https://www.nslookup.io/api/v1/records".to_string()
}

fn default_dns_server() -> String {
    "thenetherlands".to_string()
}

const fn default_lookup_timeout() -> u64 {
    30
}

const fn default_flush_enabled() -> bool {
    true
}

const fn default_metrics_listen() -> SocketAddr {
    SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), 9090)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: None,
            hosts_path: default_hosts_path(),
            cycle_interval_secs: default_cycle_interval(),
            lookup: LookupSettings::default(),
            flush: FlushSettings::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate().map_err(ConfigError::from)?;
        Ok(config)
    }

    pub const fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.cycle_interval_secs == 0 {
            return Err(ValidationError::ZeroCycleInterval);
        }

        if self.hosts_path.as_os_str().is_empty() {
            return Err(ValidationError::EmptyHostsPath);
        }

        if self.lookup.timeout_secs == 0 {
            return Err(ValidationError::ZeroLookupTimeout);
        }

        if self.lookup.dns_server.trim().is_empty() {
            return Err(ValidationError::EmptyDnsServer);
        }

        let endpoint = &self.lookup.endpoint;
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ValidationError::InvalidLookupEndpoint {
                endpoint: endpoint.clone(),
            });
        }

        if let Some(command) = &self.flush.command
            && command.first().is_none_or(|program| program.trim().is_empty())
        {
            return Err(ValidationError::EmptyFlushCommand);
        }

        Ok(())
    }
}
