// ============================================================================
// File: src/platform/cluster.rs
// ----------------------------------------------------------------------------
// Group of machines created for one test.
//
// - Unique machine naming from cryptographic random bytes
// - Machine creation through the provider, with registration on success
// - Live-machine bookkeeping behind a per-cluster lock
// - Cascading teardown and notification of the owning Flight
// ============================================================================

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use log::{debug, error, info, warn};
use rand::RngCore;

use crate::async_task::{AsyncTask, AsyncTaskBuilder};
use crate::error::{HarnessError, HarnessResult};
use crate::provider::{InstanceSpec, MachineOptions, ProviderCapability, UserData};
use crate::ssh::{CommandOutput, RemoteShell, SshClient};

use super::config::RuntimeConfig;
use super::flight::FlightInner;
use super::journal::Journal;
use super::machine::Machine;
use super::teardown::TeardownReport;

/// Characters of the cluster name kept in machine names
const VM_NAME_PREFIX_LEN: usize = 13;

/// Random bytes in each machine name suffix (40 bits)
const VM_NAME_RANDOM_BYTES: usize = 5;

/// Handle to a test cluster
#[derive(Debug, Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

#[derive(Debug)]
pub(crate) struct ClusterInner {
    pub(crate) name: String,
    pub(crate) test_name: String,
    pub(crate) flight: Weak<FlightInner>,
    pub(crate) provider: Arc<dyn ProviderCapability>,
    pub(crate) shell: Arc<dyn RemoteShell>,
    /// Runtime configuration with this cluster's output directory
    pub(crate) runtime: RuntimeConfig,
    pub(crate) machines: RwLock<HashMap<String, Machine>>,
    /// Set when teardown starts; no machines are accepted afterwards
    pub(crate) closed: AtomicBool,
    pub(crate) teardown: tokio::sync::Mutex<bool>,
}

impl Cluster {
    pub(crate) fn new(
        name: String,
        test_name: String,
        flight: Weak<FlightInner>,
        provider: Arc<dyn ProviderCapability>,
        shell: Arc<dyn RemoteShell>,
        runtime: RuntimeConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ClusterInner {
                name,
                test_name,
                flight,
                provider,
                shell,
                runtime,
                machines: RwLock::new(HashMap::new()),
                closed: AtomicBool::new(false),
                teardown: tokio::sync::Mutex::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ClusterInner>) -> Self {
        Self { inner }
    }

    /// Generated cluster name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Test name the cluster was requested with
    pub fn test_name(&self) -> &str {
        &self.inner.test_name
    }

    pub fn runtime_conf(&self) -> &RuntimeConfig {
        &self.inner.runtime
    }

    pub fn output_dir(&self) -> &Path {
        &self.inner.runtime.output_dir
    }

    /// Whether teardown has started
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Fresh machine name: truncated cluster name plus random hex suffix
    pub fn vm_name(&self) -> String {
        generate_vm_name(&self.inner.name)
    }

    /// Create a machine with default options
    pub fn new_machine(&self, userdata: UserData) -> AsyncTask<HarnessResult<Machine>> {
        self.new_machine_with_options(userdata, MachineOptions::default())
    }

    /// Create a machine
    ///
    /// The machine is registered only after the provider created it. Unless
    /// `options.skip_startup_wait` is set, this also waits for the machine to
    /// become reachable and destroys it if it does not.
    ///
    /// # Arguments
    /// * `userdata` - Opaque boot payload handed to the provider
    /// * `options` - Creation toggles
    ///
    /// # Returns
    /// AsyncTask that resolves to the registered machine
    pub fn new_machine_with_options(
        &self,
        userdata: UserData,
        options: MachineOptions,
    ) -> AsyncTask<HarnessResult<Machine>> {
        let cluster = self.clone();

        AsyncTaskBuilder::new(async move {
            if cluster.is_closed() {
                return Err(HarnessError::provisioning(
                    cluster.name(),
                    "cluster is already destroyed",
                ));
            }

            let name = cluster.vm_name();
            let spec = InstanceSpec::new(name.clone(), userdata, options.clone());

            debug!("Creating instance {} in cluster {}", name, cluster.name());
            let instance = cluster.inner.provider.create_instance(spec).await??;

            let machine = match cluster.prepare_machine(&name, instance, &options) {
                Ok(machine) => machine,
                Err(e) => {
                    cluster.discard_instance(&name).await;
                    return Err(e);
                }
            };

            cluster.add_mach(machine.clone());

            // Destroy raced with creation; the teardown snapshot may have missed us.
            if cluster.is_closed() {
                let report = machine.teardown().await;
                log_discarded_teardown(machine.id(), "cluster closed during creation", &report);
                return Err(HarnessError::provisioning(
                    cluster.name(),
                    "cluster was destroyed while the machine was created",
                ));
            }

            info!("Created machine {} in cluster {}", machine.id(), cluster.name());

            if !options.skip_startup_wait
                && let Err(e) = machine.boot().await
            {
                error!("Machine {} failed to start: {}", machine.id(), e);
                let report = machine.teardown().await;
                log_discarded_teardown(machine.id(), &e.to_string(), &report);
                return Err(e);
            }

            Ok(machine)
        })
        .spawn()
    }

    fn prepare_machine(
        &self,
        name: &str,
        instance: crate::provider::Instance,
        options: &MachineOptions,
    ) -> HarnessResult<Machine> {
        let dir = self.inner.runtime.output_dir.join(name);
        fs::create_dir_all(&dir).map_err(|e| {
            HarnessError::internal(format!(
                "Failed to create machine directory {}: {e}",
                dir.display()
            ))
        })?;

        let journal = if options.record_journal {
            Some(Journal::create(&dir)?)
        } else {
            None
        };

        Ok(Machine::new(
            name.to_string(),
            instance,
            dir,
            &self.inner,
            journal,
        ))
    }

    /// Terminate an instance that never became a registered machine
    async fn discard_instance(&self, name: &str) {
        match self.inner.provider.terminate_instance(name).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Error terminating unregistered instance {}: {}", name, e),
            Err(e) => error!("Terminate task for unregistered instance {} failed: {}", name, e),
        }
    }

    fn add_mach(&self, machine: Machine) {
        self.inner
            .machines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(machine.id().to_string(), machine);
    }

    /// Remove a machine from the live set; no-op if it is absent
    pub fn del_mach(&self, machine: &Machine) {
        let removed = self
            .inner
            .machines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(machine.id());

        if removed.is_some() {
            debug!("Removed machine {} from cluster {}", machine.id(), self.name());
        }
    }

    /// Live machines
    pub fn machines(&self) -> Vec<Machine> {
        self.inner
            .machines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Sorted ids of live machines
    pub fn machine_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .machines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Open an SSH client to `address` with the flight's credentials
    pub fn ssh_client(&self, address: &str) -> AsyncTask<HarnessResult<SshClient>> {
        self.inner.shell.connect(address)
    }

    /// Open an SSH client to `address` with explicit credentials
    pub fn password_ssh_client(
        &self,
        address: &str,
        user: &str,
        password: &str,
    ) -> AsyncTask<HarnessResult<SshClient>> {
        self.inner.shell.connect_with_password(address, user, password)
    }

    /// Run `command` on `machine`
    pub fn ssh(&self, machine: &Machine, command: &str) -> AsyncTask<HarnessResult<CommandOutput>> {
        self.inner.shell.exec(machine.ssh_address(), command)
    }

    /// Destroy every live machine, then leave the flight
    ///
    /// Never fails and is safe to call more than once; later calls return an
    /// empty report.
    pub fn destroy(&self) -> AsyncTask<TeardownReport> {
        let cluster = self.clone();

        AsyncTaskBuilder::new(async move {
            let mut done = cluster.inner.teardown.lock().await;
            let mut report = TeardownReport::new();
            if *done {
                debug!("Cluster {} already destroyed", cluster.name());
                return report;
            }

            cluster.inner.closed.store(true, Ordering::SeqCst);

            let tasks: Vec<_> = cluster
                .machines()
                .iter()
                .map(|machine| (machine.id().to_string(), machine.destroy()))
                .collect();

            for (id, task) in tasks {
                match task.await {
                    Ok(machine_report) => report.merge(machine_report),
                    Err(e) => error!("Teardown task for machine {} failed: {}", id, e),
                }
            }

            let leftover = cluster.machine_ids();
            if !leftover.is_empty() {
                warn!(
                    "Cluster {} still tracks machines after teardown: {:?}",
                    cluster.name(),
                    leftover
                );
            }

            if let Some(flight) = cluster.inner.flight.upgrade() {
                flight.remove_cluster(cluster.name());
            }

            *done = true;
            info!(
                "Destroyed cluster {} ({} machines, {} teardown failures)",
                cluster.name(),
                report.destroyed.len(),
                report.failures.len()
            );
            report
        })
        .spawn()
    }
}

/// Log failures of a teardown whose report is not handed to the caller
fn log_discarded_teardown(machine: &str, cause: &str, report: &TeardownReport) {
    for failure in &report.failures {
        error!(
            "Teardown of machine {} after \"{}\" failed at {}: {}",
            machine, cause, failure.stage, failure.message
        );
    }
}

/// Build a machine name from a cluster name and fresh random bytes
///
/// Random bytes come from the thread-local CSPRNG; names of concurrent
/// clusters sharing a namespace must not collide.
pub(crate) fn generate_vm_name(cluster_name: &str) -> String {
    let prefix: String = cluster_name.chars().take(VM_NAME_PREFIX_LEN).collect();
    let prefix = match prefix.trim_end_matches('-') {
        "" => "kola",
        trimmed => trimmed,
    };

    let mut bytes = [0u8; VM_NAME_RANDOM_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    let suffix: String = bytes.iter().map(|b| format!("{b:02x}")).collect();

    format!("{prefix}-{suffix}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn vm_name_format() {
        let name = generate_vm_name("kola-2b7f1c9e4d0a4f7e8a1b2c3d4e5f6a7b");
        let (prefix, suffix) = name.rsplit_once('-').expect("name has a suffix");

        assert_eq!(prefix, "kola-2b7f1c9e");
        assert_eq!(suffix.len(), VM_NAME_RANDOM_BYTES * 2);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn vm_name_handles_short_and_dashed_prefixes() {
        assert!(generate_vm_name("ci").starts_with("ci-"));
        assert!(generate_vm_name("kola-test----xyz").starts_with("kola-test-"));
        assert!(!generate_vm_name("kola-test----xyz").starts_with("kola-test--"));
        assert!(generate_vm_name("").starts_with("kola-"));
    }

    #[test]
    fn vm_names_do_not_collide() {
        let count = 10_000;
        let names: HashSet<String> = (0..count).map(|_| generate_vm_name("kola-unique")).collect();
        assert_eq!(names.len(), count);
    }
}
