// ============================================================================
// File: src/ssh/mod.rs
// ----------------------------------------------------------------------------
// Remote shell access to test machines.
//
// - config: SSH user, port, authentication and timeouts
// - session: connected ssh2 client and command output
// - trait_def: RemoteShell seam used by Clusters
// - transport: ssh2-backed RemoteShell implementation
// ============================================================================

mod config;
mod session;
mod trait_def;
mod transport;

pub use config::{SshAuth, SshConfig};
pub use session::{CommandOutput, SshClient};
pub use trait_def::RemoteShell;
pub use transport::SshTransport;
