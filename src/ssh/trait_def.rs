// ============================================================================
// File: src/ssh/trait_def.rs
// ----------------------------------------------------------------------------
// RemoteShell trait definition
// ============================================================================

use crate::async_task::AsyncTask;
use crate::error::HarnessResult;

use super::session::{CommandOutput, SshClient};

/// Transport factory and execution bridge used by Clusters
///
/// Failures are reported as `HarnessError::Connectivity` and leave the
/// target machine untouched, so callers may retry.
pub trait RemoteShell: Send + Sync + std::fmt::Debug {
    /// Open an authenticated client using the configured credentials
    fn connect(&self, address: &str) -> AsyncTask<HarnessResult<SshClient>>;

    /// Open a client authenticating with an explicit user and password
    fn connect_with_password(
        &self,
        address: &str,
        user: &str,
        password: &str,
    ) -> AsyncTask<HarnessResult<SshClient>>;

    /// Run one command and collect its output
    ///
    /// A non-zero exit status is not an error here; it is reported in the
    /// returned output.
    fn exec(&self, address: &str, command: &str) -> AsyncTask<HarnessResult<CommandOutput>>;
}
