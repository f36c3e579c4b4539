// ============================================================================
// File: src/platform/flight.rs
// ----------------------------------------------------------------------------
// Test session owning the provider, the remote shell and the live clusters.
// ============================================================================

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, error, info, warn};

use crate::async_task::{AsyncTask, AsyncTaskBuilder};
use crate::error::{HarnessError, HarnessResult};
use crate::provider::ProviderCapability;
use crate::ssh::{RemoteShell, SshTransport};

use super::cluster::Cluster;
use super::config::{FlightConfig, RuntimeConfig};
use super::teardown::TeardownReport;

/// Handle to a test session
///
/// Clones share the same session. Dropping the last handle while clusters
/// are still live logs them as leaked.
#[derive(Debug, Clone)]
pub struct Flight {
    inner: Arc<FlightInner>,
}

#[derive(Debug)]
pub(crate) struct FlightInner {
    config: FlightConfig,
    provider: Arc<dyn ProviderCapability>,
    shell: Arc<dyn RemoteShell>,
    clusters: RwLock<HashMap<String, Cluster>>,
    /// Set once destroy or abandon starts
    closed: AtomicBool,
    teardown: tokio::sync::Mutex<bool>,
}

impl FlightInner {
    /// Remove a cluster from the live set; no-op if it is absent
    pub(crate) fn remove_cluster(&self, name: &str) {
        let removed = self
            .clusters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);

        if removed.is_some() {
            debug!("Removed cluster {} from flight {}", name, self.config.name);
        }
    }

    /// Mark the flight closed and snapshot its clusters under one write lock
    fn close_and_snapshot(&self) -> Vec<Cluster> {
        let clusters = self
            .clusters
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        self.closed.store(true, Ordering::SeqCst);
        clusters.values().cloned().collect()
    }

    fn live_clusters(&self) -> Vec<Cluster> {
        self.clusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl Drop for FlightInner {
    fn drop(&mut self) {
        let clusters = self
            .clusters
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);

        for (name, cluster) in clusters.drain() {
            warn!(
                "Flight {} dropped with live cluster {}; leaked machines: {:?}",
                self.config.name,
                name,
                cluster.machine_ids()
            );
        }
    }
}

impl Flight {
    /// Create a flight
    ///
    /// # Arguments
    /// * `config` - Session name, runtime and SSH configuration
    /// * `provider` - Provider capability shared by every cluster
    /// * `shell` - Remote shell shared by every cluster
    pub fn new(
        config: FlightConfig,
        provider: Arc<dyn ProviderCapability>,
        shell: Arc<dyn RemoteShell>,
    ) -> Self {
        info!(
            "Starting flight {} on provider {}",
            config.name,
            provider.provider_type()
        );

        Self {
            inner: Arc::new(FlightInner {
                config,
                provider,
                shell,
                clusters: RwLock::new(HashMap::new()),
                closed: AtomicBool::new(false),
                teardown: tokio::sync::Mutex::new(false),
            }),
        }
    }

    /// Create a flight using the ssh2 transport built from `config.ssh`
    pub fn with_ssh(config: FlightConfig, provider: Arc<dyn ProviderCapability>) -> Self {
        let shell: Arc<dyn RemoteShell> = Arc::new(SshTransport::new(config.ssh.clone()));
        Self::new(config, provider, shell)
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &FlightConfig {
        &self.inner.config
    }

    pub fn provider(&self) -> &Arc<dyn ProviderCapability> {
        &self.inner.provider
    }

    /// Whether destroy or abandon has started
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Create and register a cluster for one test
    ///
    /// # Arguments
    /// * `name` - Test name; also names the cluster's output directory
    ///
    /// # Returns
    /// The registered cluster, or `HarnessError::Provisioning` when the
    /// provider has no namespace, the output directory cannot be created, or
    /// the flight is already closed
    pub fn new_cluster(&self, name: &str) -> HarnessResult<Cluster> {
        if self.is_closed() {
            return Err(HarnessError::provisioning(
                name,
                format!("flight {} is already destroyed", self.name()),
            ));
        }

        let namespace = self
            .inner
            .provider
            .namespace()
            .filter(|ns| !ns.is_empty())
            .ok_or_else(|| {
                HarnessError::provisioning(
                    name,
                    format!(
                        "provider {} has no namespace resolved",
                        self.inner.provider.provider_type()
                    ),
                )
            })?;

        let cluster_name = format!("{}-{}", self.name(), uuid::Uuid::new_v4().simple());
        let output_dir = self
            .inner
            .config
            .runtime
            .output_dir
            .join(output_dir_name(name, &cluster_name));

        fs::create_dir_all(&output_dir).map_err(|e| {
            HarnessError::provisioning(
                name,
                format!("cannot create output directory {}: {e}", output_dir.display()),
            )
        })?;

        let runtime = RuntimeConfig {
            output_dir,
            ..self.inner.config.runtime.clone()
        };

        let cluster = Cluster::new(
            cluster_name.clone(),
            name.to_string(),
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.provider),
            Arc::clone(&self.inner.shell),
            runtime,
        );

        {
            // Closed is only set under this lock, so destroy either sees the
            // cluster in its snapshot or we see it closed here.
            let mut clusters = self
                .inner
                .clusters
                .write()
                .map_err(|e| HarnessError::internal(format!("Failed to acquire write lock: {e}")))?;
            if self.is_closed() {
                return Err(HarnessError::provisioning(
                    name,
                    format!("flight {} was destroyed while the cluster was created", self.name()),
                ));
            }
            clusters.insert(cluster_name.clone(), cluster.clone());
        }

        info!(
            "Created cluster {} for test {} in namespace {}",
            cluster_name, name, namespace
        );
        Ok(cluster)
    }

    /// Remove a cluster from the live set; no-op if it is absent
    pub fn del_cluster(&self, cluster: &Cluster) {
        self.inner.remove_cluster(cluster.name());
    }

    /// Live clusters
    pub fn clusters(&self) -> Vec<Cluster> {
        self.inner.live_clusters()
    }

    /// Sorted names of live clusters
    pub fn cluster_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .clusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Destroy every live cluster and close the flight
    ///
    /// Never fails and is safe to call more than once; later calls return an
    /// empty report. No clusters can be created afterwards.
    pub fn destroy(&self) -> AsyncTask<TeardownReport> {
        let flight = self.clone();

        AsyncTaskBuilder::new(async move {
            let mut done = flight.inner.teardown.lock().await;
            let mut report = TeardownReport::new();
            if *done {
                return report;
            }

            let snapshot = flight.inner.close_and_snapshot();

            let tasks: Vec<_> = snapshot
                .iter()
                .map(|cluster| (cluster.name().to_string(), cluster.destroy()))
                .collect();

            for (name, task) in tasks {
                match task.await {
                    Ok(cluster_report) => report.merge(cluster_report),
                    Err(e) => error!("Teardown task for cluster {} failed: {}", name, e),
                }
            }

            *done = true;
            info!(
                "Destroyed flight {} ({} machines, {} teardown failures)",
                flight.name(),
                report.destroyed.len(),
                report.failures.len()
            );
            report
        })
        .spawn()
    }

    /// Forced shutdown: forget live clusters without calling the provider
    ///
    /// # Returns
    /// Leaked cluster names mapped to the ids of their live machines
    pub fn abandon(&self) -> BTreeMap<String, Vec<String>> {
        let drained: Vec<(String, Cluster)> = {
            let mut clusters = self
                .inner
                .clusters
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            self.inner.closed.store(true, Ordering::SeqCst);
            clusters.drain().collect()
        };

        drained
            .into_iter()
            .map(|(name, cluster)| {
                let machines = cluster.machine_ids();
                warn!(
                    "Flight {} abandoned cluster {}; leaked machines: {:?}",
                    self.name(),
                    name,
                    machines
                );
                (name, machines)
            })
            .collect()
    }
}

/// Directory name for a test's artifacts
fn output_dir_name(test_name: &str, cluster_name: &str) -> String {
    let sanitized: String = test_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();

    match sanitized.trim_matches('.') {
        "" => cluster_name.to_string(),
        trimmed => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_dir_name_is_a_single_component() {
        assert_eq!(output_dir_name("coreos.basic", "c"), "coreos.basic");
        assert_eq!(output_dir_name("ext/rpm-ostree", "c"), "ext_rpm-ostree");
        assert_eq!(output_dir_name("..", "kola-abc"), "kola-abc");
        assert_eq!(output_dir_name("", "kola-abc"), "kola-abc");
    }
}
