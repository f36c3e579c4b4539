// ============================================================================
// File: src/ssh/session.rs
// ----------------------------------------------------------------------------
// Connected SSH client and command output.
// ============================================================================

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// Output of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: i32,
}

impl CommandOutput {
    pub fn new<O: Into<Vec<u8>>, E: Into<Vec<u8>>>(stdout: O, stderr: E, exit_status: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_status,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Stdout as lossy UTF-8 with surrounding whitespace removed
    pub fn stdout_trimmed(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Turn a non-zero exit status into `HarnessError::Command`
    pub fn into_success(self, machine: &str, command: &str) -> HarnessResult<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(HarnessError::Command {
            machine: machine.to_string(),
            command: command.to_string(),
            exit_status: self.exit_status,
            stderr: self.stderr_lossy().trim().to_string(),
        })
    }
}

/// Authenticated SSH client for one machine
///
/// All methods block; call them from `spawn_blocking` inside async code.
pub struct SshClient {
    session: ssh2::Session,
    address: String,
}

impl std::fmt::Debug for SshClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshClient")
            .field("address", &self.address)
            .field("authenticated", &self.session.authenticated())
            .finish()
    }
}

impl SshClient {
    pub(crate) fn new(session: ssh2::Session, address: String) -> Self {
        Self { session, address }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Underlying ssh2 session, for channels the harness does not wrap
    pub fn session(&self) -> &ssh2::Session {
        &self.session
    }

    /// Run a command on a fresh channel and collect its output
    pub fn run(&self, command: &str) -> HarnessResult<CommandOutput> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| self.failure(format!("Failed to create channel: {e}")))?;

        channel
            .exec(command)
            .map_err(|e| self.failure(format!("Exec failed: {e}")))?;

        let mut stdout = Vec::new();
        channel
            .read_to_end(&mut stdout)
            .map_err(|e| self.failure(format!("Read stdout failed: {e}")))?;

        let mut stderr = Vec::new();
        channel
            .stderr()
            .read_to_end(&mut stderr)
            .map_err(|e| self.failure(format!("Read stderr failed: {e}")))?;

        channel
            .wait_close()
            .map_err(|e| self.failure(format!("Wait close failed: {e}")))?;

        let exit_status = channel
            .exit_status()
            .map_err(|e| self.failure(format!("Get exit status failed: {e}")))?;

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_status,
        })
    }

    fn failure(&self, details: String) -> HarnessError {
        HarnessError::connectivity(self.address.clone(), details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_output_success() {
        let output = CommandOutput::new("  3f2a\n", "", 0);
        assert!(output.success());
        assert_eq!(output.stdout_trimmed(), "3f2a");
        assert!(output.into_success("m1", "cat boot_id").is_ok());
    }

    #[test]
    fn command_output_failure_carries_stderr() {
        let output = CommandOutput::new("", "permission denied\n", 1);
        match output.into_success("m1", "reboot") {
            Err(HarnessError::Command {
                machine,
                command,
                exit_status,
                stderr,
            }) => {
                assert_eq!(machine, "m1");
                assert_eq!(command, "reboot");
                assert_eq!(exit_status, 1);
                assert_eq!(stderr, "permission denied");
            }
            other => panic!("Expected command error, got {other:?}"),
        }
    }
}
