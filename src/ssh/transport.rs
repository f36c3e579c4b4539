//! ssh2-backed remote shell

use std::net::{TcpStream, ToSocketAddrs};

use log::debug;

use crate::async_task::{AsyncTask, AsyncTaskBuilder};
use crate::error::{HarnessError, HarnessResult};

use super::config::{SshAuth, SshConfig};
use super::session::{CommandOutput, SshClient};
use super::trait_def::RemoteShell;

/// Remote shell that opens a new ssh2 session per call
#[derive(Debug, Clone)]
pub struct SshTransport {
    config: SshConfig,
}

impl SshTransport {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Open and authenticate a session (blocking)
    fn open(config: &SshConfig, address: &str, username: &str, auth: &SshAuth) -> HarnessResult<SshClient> {
        if address.is_empty() {
            return Err(HarnessError::connectivity(
                address,
                "Machine has no address assigned",
            ));
        }

        let socket_addr = (address, config.port)
            .to_socket_addrs()
            .map_err(|e| HarnessError::connectivity(address, format!("Address resolution failed: {e}")))?
            .next()
            .ok_or_else(|| HarnessError::connectivity(address, "Address resolved to nothing"))?;

        let tcp = TcpStream::connect_timeout(&socket_addr, config.connect_timeout)
            .map_err(|e| HarnessError::connectivity(address, format!("TCP connection failed: {e}")))?;

        let mut session = ssh2::Session::new()
            .map_err(|e| HarnessError::connectivity(address, format!("SSH session creation failed: {e}")))?;

        session.set_tcp_stream(tcp);
        session.set_timeout(config.handshake_timeout_ms());
        session
            .handshake()
            .map_err(|e| HarnessError::connectivity(address, format!("SSH handshake failed: {e}")))?;

        match auth {
            SshAuth::Agent => {
                session.userauth_agent(username).map_err(|e| {
                    HarnessError::connectivity(address, format!("SSH agent auth failed: {e}"))
                })?;
            }
            SshAuth::Key(key_path) => {
                session
                    .userauth_pubkey_file(username, None, key_path, None)
                    .map_err(|e| {
                        HarnessError::connectivity(address, format!("SSH key auth failed: {e}"))
                    })?;
            }
            SshAuth::Password(password) => {
                session.userauth_password(username, password).map_err(|e| {
                    HarnessError::connectivity(address, format!("SSH password auth failed: {e}"))
                })?;
            }
        }

        if !session.authenticated() {
            return Err(HarnessError::connectivity(address, "SSH authentication failed"));
        }

        // The connect deadline must not cap commands that stay silent for long.
        session.set_timeout(config.command_timeout_ms());

        debug!("Opened SSH session to {}@{}", username, address);
        Ok(SshClient::new(session, address.to_string()))
    }

    fn spawn_open(&self, address: &str, username: String, auth: SshAuth) -> AsyncTask<HarnessResult<SshClient>> {
        let config = self.config.clone();
        let address = address.to_string();

        AsyncTaskBuilder::new(async move {
            tokio::task::spawn_blocking(move || Self::open(&config, &address, &username, &auth)).await?
        })
        .spawn()
    }
}

impl RemoteShell for SshTransport {
    fn connect(&self, address: &str) -> AsyncTask<HarnessResult<SshClient>> {
        self.spawn_open(address, self.config.username.clone(), self.config.auth.clone())
    }

    fn connect_with_password(
        &self,
        address: &str,
        user: &str,
        password: &str,
    ) -> AsyncTask<HarnessResult<SshClient>> {
        self.spawn_open(address, user.to_string(), SshAuth::Password(password.to_string()))
    }

    fn exec(&self, address: &str, command: &str) -> AsyncTask<HarnessResult<CommandOutput>> {
        let config = self.config.clone();
        let address = address.to_string();
        let command = command.to_string();

        AsyncTaskBuilder::new(async move {
            tokio::task::spawn_blocking(move || {
                let client = Self::open(&config, &address, &config.username, &config.auth)?;
                client.run(&command)
            })
            .await?
        })
        .spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_address_is_a_connectivity_error() {
        let transport = SshTransport::new(SshConfig::default());

        let result = transport
            .exec("", "true")
            .await
            .expect("exec task should not panic");

        assert!(matches!(result, Err(HarnessError::Connectivity { .. })));
    }
}
