// ============================================================================
// File: src/platform/machine.rs
// ----------------------------------------------------------------------------
// One provisioned test machine.
//
// A Machine is a cheap handle; clones share state. It holds a non-owning
// reference to its Cluster, which owns it through the live-machine map.
// Teardown order is fixed: console capture, provider termination, journal
// release, unregistration.
// ============================================================================

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use log::{debug, error, info};

use crate::async_task::{AsyncTask, AsyncTaskBuilder};
use crate::error::{HarnessError, HarnessResult};
use crate::provider::{Instance, ProviderCapability};
use crate::ssh::{CommandOutput, SshClient};

use super::boot;
use super::cluster::{Cluster, ClusterInner};
use super::config::{NetworkMode, RuntimeConfig};
use super::journal::Journal;
use super::teardown::{TeardownReport, TeardownStage};

const CONSOLE_FILE: &str = "console.txt";

/// Handle to a running test machine
#[derive(Debug, Clone)]
pub struct Machine {
    inner: Arc<MachineInner>,
}

#[derive(Debug)]
struct MachineInner {
    /// Instance name; also the provider handle
    name: String,
    internal_ip: String,
    external_ip: String,
    /// Artifact directory
    dir: PathBuf,
    runtime: RuntimeConfig,
    provider: Arc<dyn ProviderCapability>,
    cluster: Weak<ClusterInner>,
    journal: Option<Journal>,
    /// Console text, filled in during teardown
    console: RwLock<String>,
    /// Held for the whole teardown; true once it has run
    teardown: tokio::sync::Mutex<bool>,
    destroyed: AtomicBool,
}

impl Machine {
    pub(crate) fn new(
        name: String,
        instance: Instance,
        dir: PathBuf,
        cluster: &Arc<ClusterInner>,
        journal: Option<Journal>,
    ) -> Self {
        Self {
            inner: Arc::new(MachineInner {
                name,
                internal_ip: instance.internal_ip,
                external_ip: instance.external_ip,
                dir,
                runtime: cluster.runtime.clone(),
                provider: Arc::clone(&cluster.provider),
                cluster: Arc::downgrade(cluster),
                journal,
                console: RwLock::new(String::new()),
                teardown: tokio::sync::Mutex::new(false),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.name
    }

    /// External address
    pub fn ip(&self) -> &str {
        &self.inner.external_ip
    }

    /// Internal address
    pub fn private_ip(&self) -> &str {
        &self.inner.internal_ip
    }

    /// Artifact directory for this machine
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn runtime_conf(&self) -> &RuntimeConfig {
        &self.inner.runtime
    }

    /// Address the remote shell connects to, per the cluster's network mode
    pub fn ssh_address(&self) -> &str {
        match self.inner.runtime.network_mode {
            NetworkMode::Public => self.ip(),
            NetworkMode::Private => self.private_ip(),
        }
    }

    pub fn journal(&self) -> Option<&Journal> {
        self.inner.journal.as_ref()
    }

    /// Whether `destroy` has completed
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Owning cluster, if it still exists
    ///
    /// The machine only holds a weak reference. Once every `Cluster` handle
    /// is dropped (for example after `Flight::del_cluster`), this returns
    /// `HarnessError::Internal`.
    pub fn cluster(&self) -> HarnessResult<Cluster> {
        self.inner
            .cluster
            .upgrade()
            .map(Cluster::from_inner)
            .ok_or_else(|| {
                HarnessError::internal(format!("Cluster of machine {} no longer exists", self.id()))
            })
    }

    /// Cluster whose remote shell serves this machine
    ///
    /// A dropped cluster means no shell is left to reach the machine, so the
    /// error is reported as `HarnessError::Connectivity`.
    fn shell_cluster(&self) -> HarnessResult<Cluster> {
        self.inner
            .cluster
            .upgrade()
            .map(Cluster::from_inner)
            .ok_or_else(|| {
                HarnessError::connectivity(
                    self.ssh_address(),
                    format!(
                        "cluster of machine {} no longer exists; no remote shell is available",
                        self.id()
                    ),
                )
            })
    }

    /// Open an SSH client with the flight's credentials
    pub fn ssh_client(&self) -> AsyncTask<HarnessResult<SshClient>> {
        match self.shell_cluster() {
            Ok(cluster) => cluster.ssh_client(self.ssh_address()),
            Err(e) => AsyncTaskBuilder::new(async move { Err(e) }).spawn(),
        }
    }

    /// Open an SSH client authenticating with `user` and `password`
    pub fn password_ssh_client(&self, user: &str, password: &str) -> AsyncTask<HarnessResult<SshClient>> {
        match self.shell_cluster() {
            Ok(cluster) => cluster.password_ssh_client(self.ssh_address(), user, password),
            Err(e) => AsyncTaskBuilder::new(async move { Err(e) }).spawn(),
        }
    }

    /// Run a command on the machine
    pub fn ssh(&self, command: &str) -> AsyncTask<HarnessResult<CommandOutput>> {
        match self.shell_cluster() {
            Ok(cluster) => cluster.ssh(self, command),
            Err(e) => AsyncTaskBuilder::new(async move { Err(e) }).spawn(),
        }
    }

    pub(crate) async fn run(&self, command: &str) -> HarnessResult<CommandOutput> {
        self.ssh(command).await?
    }

    /// Wait until the machine is reachable
    pub fn start(&self) -> AsyncTask<HarnessResult<()>> {
        let machine = self.clone();
        AsyncTaskBuilder::new(async move { machine.boot().await }).spawn()
    }

    pub(crate) async fn boot(&self) -> HarnessResult<()> {
        boot::start_machine(self, self.journal(), self.inner.runtime.boot_timeout).await
    }

    /// Reboot the machine and wait for the new boot
    pub fn reboot(&self) -> AsyncTask<HarnessResult<()>> {
        let machine = self.clone();
        AsyncTaskBuilder::new(async move {
            boot::reboot_machine(&machine, machine.journal(), machine.inner.runtime.boot_timeout).await
        })
        .spawn()
    }

    /// Wait until a boot id other than `prior_boot_id` is observed
    ///
    /// # Arguments
    /// * `timeout` - Deadline for the new boot to appear
    /// * `prior_boot_id` - Boot id read before the reboot was triggered
    pub fn wait_for_reboot(&self, timeout: Duration, prior_boot_id: &str) -> AsyncTask<HarnessResult<()>> {
        let machine = self.clone();
        let prior_boot_id = prior_boot_id.to_string();
        AsyncTaskBuilder::new(async move {
            boot::wait_for_machine_reboot(&machine, machine.journal(), timeout, &prior_boot_id).await
        })
        .spawn()
    }

    /// Console text captured at teardown; empty before that
    pub fn console_output(&self) -> String {
        self.inner
            .console
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Journal contents; empty when no journal is attached
    pub fn journal_output(&self) -> String {
        let Some(journal) = &self.inner.journal else {
            return String::new();
        };

        match journal.read() {
            Ok(data) => String::from_utf8_lossy(&data).into_owned(),
            Err(e) => {
                error!("Reading journal for instance {}: {}", self.id(), e);
                String::new()
            }
        }
    }

    /// Tear the machine down
    ///
    /// Never fails. Failures are logged and returned in the report, and the
    /// machine is always removed from its cluster. Calling it again returns
    /// an empty report without touching the provider.
    pub fn destroy(&self) -> AsyncTask<TeardownReport> {
        let machine = self.clone();
        AsyncTaskBuilder::new(async move { machine.teardown().await }).spawn()
    }

    pub(crate) async fn teardown(&self) -> TeardownReport {
        let mut done = self.inner.teardown.lock().await;
        let mut report = TeardownReport::new();
        if *done {
            debug!("Machine {} already destroyed", self.id());
            return report;
        }

        if let Err(e) = self.save_console().await {
            error!("Error saving console for instance {}: {}", self.id(), e);
            report.record(self.id(), TeardownStage::ConsoleCapture, e.to_string());
        }

        match self.inner.provider.terminate_instance(self.id()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Error terminating instance {}: {}", self.id(), e);
                report.record(self.id(), TeardownStage::Terminate, e.to_string());
            }
            Err(e) => {
                error!("Terminate task for instance {} failed: {}", self.id(), e);
                report.record(self.id(), TeardownStage::Terminate, e.to_string());
            }
        }

        if let Some(journal) = &self.inner.journal
            && let Err(e) = journal.destroy()
        {
            error!("Error releasing journal for instance {}: {}", self.id(), e);
            report.record(self.id(), TeardownStage::Journal, e.to_string());
        }

        if let Some(cluster) = self.inner.cluster.upgrade() {
            Cluster::from_inner(cluster).del_mach(self);
        }

        *done = true;
        self.inner.destroyed.store(true, Ordering::SeqCst);
        report.destroyed.push(self.id().to_string());
        info!("Destroyed machine {}", self.id());
        report
    }

    async fn save_console(&self) -> HarnessResult<()> {
        let console = self.inner.provider.get_console_output(self.id()).await??;

        *self
            .inner
            .console
            .write()
            .unwrap_or_else(PoisonError::into_inner) = console.clone();

        write_console(&self.inner.dir, &console)
    }
}

/// Write `console.txt` under `dir`, replacing any earlier capture
fn write_console(dir: &Path, console: &str) -> HarnessResult<()> {
    let path = dir.join(CONSOLE_FILE);

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }

    let mut file = options.open(&path).map_err(|e| {
        HarnessError::internal(format!("Failed to open {}: {e}", path.display()))
    })?;

    file.write_all(console.as_bytes()).map_err(|e| {
        HarnessError::internal(format!("Failed to write {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use assert_fs::TempDir;
    use assert_fs::prelude::*;

    use super::*;

    #[test]
    fn console_file_is_truncated_on_rewrite() {
        let dir = TempDir::new().expect("temp dir");

        write_console(dir.path(), "first capture, quite long\n").expect("first write");
        write_console(dir.path(), "second\n").expect("second write");

        dir.child("console.txt").assert("second\n");
    }

    #[test]
    fn console_write_fails_for_missing_dir() {
        let dir = TempDir::new().expect("temp dir");
        let missing = dir.path().join("gone");

        assert!(write_console(&missing, "text").is_err());
    }
}
