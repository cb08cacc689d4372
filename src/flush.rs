//! OS resolver cache invalidation.
//!
//! After new records land in the hosts file, the local resolver may still
//! serve the cached sinkhole answer. Flushing its cache makes the new records
//! take effect immediately.

use std::future::Future;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::FlushSettings;

/// Trait for resolver cache invalidation.
pub trait CacheFlusher: Send + Sync + 'static {
    /// Drop the resolver cache. Returns whether the flush succeeded.
    fn flush(&self) -> impl Future<Output = bool> + Send;
}

/// Flushes the resolver cache by running a system command.
#[derive(Debug, Clone, Default)]
pub struct SystemFlusher {
    command: Option<(String, Vec<String>)>,
}

impl SystemFlusher {
    /// Run `command` (program followed by arguments) to flush the cache.
    pub fn new(command: &[String]) -> Self {
        let command = command
            .split_first()
            .map(|(program, args)| (program.clone(), args.to_vec()));
        Self { command }
    }

    /// A flusher that does nothing and always reports success.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// The platform's resolver cache flush command, if there is one.
    pub fn platform_default() -> Self {
        let command: &[&str] = if cfg!(windows) {
            &["ipconfig", "/flushdns"]
        } else if cfg!(target_os = "macos") {
            &["dscacheutil", "-flushcache"]
        } else if cfg!(target_os = "linux") {
            &["resolvectl", "flush-caches"]
        } else {
            &[]
        };

        let command: Vec<String> = command.iter().map(ToString::to_string).collect();
        Self::new(&command)
    }

    pub fn from_settings(settings: &FlushSettings) -> Self {
        if !settings.enabled {
            return Self::disabled();
        }

        settings
            .command
            .as_deref()
            .map_or_else(Self::platform_default, Self::new)
    }

    pub fn is_enabled(&self) -> bool {
        self.command.is_some()
    }
}

impl CacheFlusher for SystemFlusher {
    async fn flush(&self) -> bool {
        let Some((program, args)) = &self.command else {
            debug!("resolver cache flush disabled");
            return true;
        };

        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {
                debug!(%program, "flushed resolver cache");
                true
            }
            Ok(status) => {
                warn!(%program, %status, "resolver cache flush failed");
                false
            }
            Err(err) => {
                warn!(%program, error = %err, "failed to run resolver cache flush");
                false
            }
        }
    }
}
