//! Error types for hostpatch.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for hostpatch operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("capture error: {0}")]
    Network(#[from] NetworkError),

    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors for configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("cycle_interval_secs must be greater than 0")]
    ZeroCycleInterval,

    #[error("hosts_path cannot be empty")]
    EmptyHostsPath,

    #[error("lookup.timeout_secs must be greater than 0")]
    ZeroLookupTimeout,

    #[error("lookup.dns_server cannot be empty")]
    EmptyDnsServer,

    #[error("lookup.endpoint must start with http:// or https://: {endpoint:?}")]
    InvalidLookupEndpoint { endpoint: String },

    #[error("flush.command cannot be empty")]
    EmptyFlushCommand,
}

/// Capture-side errors. These end the sniffer loop.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("no suitable network interface found")]
    NoInterface,

    #[error("failed to open datalink channel: {0}")]
    ChannelOpen(String),

    #[error("unsupported channel type")]
    UnsupportedChannel,

    #[error("failed to receive frame: {0}")]
    Receive(#[source] io::Error),
}

/// Malformed or truncated DNS payload. The offending datagram is dropped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload truncated at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

/// Failure resolving one hostname through the lookup API.
///
/// The hostname stays pending and is retried on the next cycle.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("failed to create HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("network error looking up {host}: {source}")]
    Network {
        host: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("lookup for {host} failed: status {status}")]
    HttpStatus { host: String, status: u16 },

    #[error("malformed lookup response for {host}: {source}")]
    Body {
        host: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no A record in lookup response for {host}")]
    NoAnswer { host: String },

    #[error("invalid address {value:?} in lookup response for {host}")]
    InvalidAddress { host: String, value: String },
}

/// Hosts file I/O failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open hosts file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read hosts file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to append to hosts file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("refusing to write hostname {hostname:?}: not a single hosts field")]
    InvalidHostname { hostname: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
