// ============================================================================
// File: src/provider/kubevirt/config.rs
// ----------------------------------------------------------------------------
// KubeVirt adapter configuration
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_KUBECONFIG: &str = "~/.kube/config";

/// KubeVirt connection and guest sizing options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubeVirtOptions {
    /// Kubeconfig file; `~/.kube/config` when unset
    pub config_path: Option<PathBuf>,

    /// Namespace override; the kubeconfig context namespace when unset
    pub namespace: Option<String>,

    /// Container disk image booted by every instance
    pub container_disk: String,

    /// Guest memory request as a Kubernetes quantity
    pub memory: String,

    /// Guest vCPU count
    pub cpus: u32,

    /// Deadline for an instance to report Running with an address
    pub ready_timeout: Duration,

    /// Delay between instance status reads
    pub poll_interval: Duration,
}

impl Default for KubeVirtOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            namespace: None,
            container_disk: "quay.io/fedora/fedora-coreos-kubevirt:stable".to_string(),
            memory: "2Gi".to_string(),
            cpus: 2,
            ready_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl KubeVirtOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_namespace<N: Into<String>>(mut self, namespace: N) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_container_disk<I: Into<String>>(mut self, image: I) -> Self {
        self.container_disk = image.into();
        self
    }

    pub fn with_memory<M: Into<String>>(mut self, memory: M) -> Self {
        self.memory = memory.into();
        self
    }

    pub fn with_cpus(mut self, cpus: u32) -> Self {
        self.cpus = cpus;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Kubeconfig path with a leading `~` expanded against `home`
    pub(crate) fn resolved_config_path(&self, home: Option<&Path>) -> PathBuf {
        let raw = self
            .config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_KUBECONFIG));

        match (raw.strip_prefix("~"), home) {
            (Ok(rest), Some(home)) => home.join(rest),
            _ => raw,
        }
    }

    /// Explicit namespace, ignoring empty strings
    pub(crate) fn namespace_override(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_expands_home() {
        let options = KubeVirtOptions::default();
        let path = options.resolved_config_path(Some(Path::new("/home/core")));
        assert_eq!(path, PathBuf::from("/home/core/.kube/config"));
    }

    #[test]
    fn explicit_path_is_kept() {
        let options = KubeVirtOptions::new().with_config_path("/etc/kola/kubeconfig");
        let path = options.resolved_config_path(Some(Path::new("/home/core")));
        assert_eq!(path, PathBuf::from("/etc/kola/kubeconfig"));
    }

    #[test]
    fn tilde_without_home_is_left_alone() {
        let options = KubeVirtOptions::default();
        assert_eq!(options.resolved_config_path(None), PathBuf::from("~/.kube/config"));
    }

    #[test]
    fn empty_namespace_is_no_override() {
        assert_eq!(KubeVirtOptions::new().with_namespace("").namespace_override(), None);
        assert_eq!(
            KubeVirtOptions::new().with_namespace("ci").namespace_override(),
            Some("ci")
        );
    }
}
