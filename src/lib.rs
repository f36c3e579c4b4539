// ============================================================================
// File: src/lib.rs
// ----------------------------------------------------------------------------
// Lifecycle harness for short-lived integration test machines.
//
// A Flight owns a provider and a remote shell for one test session. Clusters
// are created from the Flight for each test, and Machines are created from a
// Cluster. Teardown always runs console capture, then provider termination,
// then unregistration, and never fails outwardly.
// ============================================================================

pub mod async_task;
pub mod error;
pub mod platform;
pub mod provider;
pub mod ssh;

pub use async_task::{AsyncTask, AsyncTaskBuilder};
pub use error::{HarnessError, HarnessResult};
pub use platform::{
    Cluster, Flight, FlightConfig, Journal, Machine, NetworkMode, RuntimeConfig, TeardownFailure,
    TeardownReport, TeardownStage,
};
pub use provider::{
    Instance, InstanceSpec, MachineOptions, ProviderCapability, ProviderError, ProviderResult,
    UserData,
};
pub use ssh::{CommandOutput, RemoteShell, SshAuth, SshClient, SshConfig, SshTransport};
