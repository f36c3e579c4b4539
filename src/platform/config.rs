// ============================================================================
// File: src/platform/config.rs
// ----------------------------------------------------------------------------
// Configuration types for flights and the clusters they create
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ssh::SshConfig;

/// Which machine address the remote shell connects to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkMode {
    /// Connect to the external address
    #[default]
    Public,
    /// Connect to the internal address (runner lives inside the provider network)
    Private,
}

/// Runtime configuration shared by every machine of a cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Base directory for artifacts; clusters get a subdirectory each
    pub output_dir: PathBuf,

    /// Address selection for SSH
    pub network_mode: NetworkMode,

    /// Default deadline for startup and reboot waits
    pub boot_timeout: Duration,

    /// Delay between reachability probes
    pub ssh_retry_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("_kola_temp"),
            network_mode: NetworkMode::Public,
            boot_timeout: Duration::from_secs(300),
            ssh_retry_interval: Duration::from_secs(5),
        }
    }
}

impl RuntimeConfig {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_network_mode(mut self, mode: NetworkMode) -> Self {
        self.network_mode = mode;
        self
    }

    pub fn with_boot_timeout(mut self, timeout: Duration) -> Self {
        self.boot_timeout = timeout;
        self
    }

    pub fn with_ssh_retry_interval(mut self, interval: Duration) -> Self {
        self.ssh_retry_interval = interval;
        self
    }
}

/// Session-level configuration for a Flight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightConfig {
    /// Session name; prefixes every cluster and machine name
    pub name: String,

    /// Runtime configuration handed to clusters
    pub runtime: RuntimeConfig,

    /// Credentials for the default ssh2 transport
    pub ssh: SshConfig,
}

impl FlightConfig {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            runtime: RuntimeConfig::default(),
            ssh: SshConfig::default(),
        }
    }

    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_ssh(mut self, ssh: SshConfig) -> Self {
        self.ssh = ssh;
        self
    }
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self::new("kola")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flight_config_builder() {
        let config = FlightConfig::new("kola-ci").with_runtime(
            RuntimeConfig::new("/tmp/kola")
                .with_network_mode(NetworkMode::Private)
                .with_boot_timeout(Duration::from_secs(60))
                .with_ssh_retry_interval(Duration::from_millis(250)),
        );

        assert_eq!(config.name, "kola-ci");
        assert_eq!(config.runtime.output_dir, PathBuf::from("/tmp/kola"));
        assert_eq!(config.runtime.network_mode, NetworkMode::Private);
        assert_eq!(config.runtime.boot_timeout, Duration::from_secs(60));
        assert_eq!(config.runtime.ssh_retry_interval, Duration::from_millis(250));
    }

    #[test]
    fn runtime_config_round_trips_through_json() {
        let runtime = RuntimeConfig::new("/var/tmp/kola");
        let json = serde_json::to_string(&runtime).expect("serialize runtime config");
        let parsed: RuntimeConfig = serde_json::from_str(&json).expect("parse runtime config");

        assert_eq!(parsed.output_dir, runtime.output_dir);
        assert_eq!(parsed.network_mode, NetworkMode::Public);
    }
}
