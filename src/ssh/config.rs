// ============================================================================
// File: src/ssh/config.rs
// ----------------------------------------------------------------------------
// SSH configuration for machine access.
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// SSH authentication methods for machine access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SshAuth {
    /// Agent-based authentication
    Agent,
    /// Key-based authentication with path to private key
    Key(PathBuf),
    /// Password authentication
    Password(String),
}

/// SSH configuration shared by every machine of a Flight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Login user on the guest
    pub username: String,
    /// SSH port
    pub port: u16,
    /// Authentication method
    pub auth: SshAuth,
    /// Deadline for TCP connect, handshake and authentication
    pub connect_timeout: Duration,
    /// Blocking limit for command I/O once authenticated; unset waits as
    /// long as the command runs
    #[serde(default)]
    pub command_timeout: Option<Duration>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            username: "core".to_string(),
            port: 22,
            auth: SshAuth::Agent,
            connect_timeout: Duration::from_secs(10),
            command_timeout: None,
        }
    }
}

impl SshConfig {
    pub fn new<U: Into<String>>(username: U) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_auth(mut self, auth: SshAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// libssh2 session timeout while connecting and authenticating
    pub(crate) fn handshake_timeout_ms(&self) -> u32 {
        timeout_ms(self.connect_timeout)
    }

    /// libssh2 session timeout for command channels; 0 disables it
    pub(crate) fn command_timeout_ms(&self) -> u32 {
        self.command_timeout.map_or(0, timeout_ms)
    }
}

fn timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssh_config_defaults() {
        let config = SshConfig::default();
        assert_eq!(config.username, "core");
        assert_eq!(config.port, 22);
        assert_eq!(config.auth, SshAuth::Agent);
        assert_eq!(config.command_timeout, None);
    }

    #[test]
    fn command_io_is_unbounded_by_default() {
        let config = SshConfig::default();

        assert_eq!(config.handshake_timeout_ms(), 10_000);
        assert_eq!(config.command_timeout_ms(), 0);
    }

    #[test]
    fn command_timeout_is_separate_from_connect_timeout() {
        let config = SshConfig::default()
            .with_connect_timeout(Duration::from_secs(3))
            .with_command_timeout(Duration::from_secs(600));

        assert_eq!(config.handshake_timeout_ms(), 3_000);
        assert_eq!(config.command_timeout_ms(), 600_000);
        assert_eq!(
            SshConfig::default()
                .with_command_timeout(Duration::from_secs(u64::MAX))
                .command_timeout_ms(),
            u32::MAX
        );
    }

    #[test]
    fn command_timeout_defaults_when_absent_from_serialized_config() {
        let json = r#"{"username":"core","port":22,"auth":"Agent","connect_timeout":{"secs":10,"nanos":0}}"#;
        let config: SshConfig = serde_json::from_str(json).expect("parse ssh config");

        assert_eq!(config.command_timeout, None);
    }

    #[test]
    fn ssh_config_builder() {
        let config = SshConfig::new("root")
            .with_port(2222)
            .with_auth(SshAuth::Key(PathBuf::from("/tmp/id_ed25519")))
            .with_connect_timeout(Duration::from_secs(3));

        assert_eq!(config.username, "root");
        assert_eq!(config.port, 2222);
        assert_eq!(config.auth, SshAuth::Key(PathBuf::from("/tmp/id_ed25519")));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
    }
}
