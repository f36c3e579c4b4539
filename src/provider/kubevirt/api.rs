// ============================================================================
// File: src/provider/kubevirt/api.rs
// ----------------------------------------------------------------------------
// KubeVirt API client and ProviderCapability implementation.
//
// Instances are VirtualMachineInstances addressed through DynamicObject, so
// no KubeVirt type crate is needed. Console text is read from the launcher
// pod's serial console log container.
// ============================================================================

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, LogParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config, ResourceExt};
use log::{debug, info, warn};

use crate::async_task::{AsyncTask, AsyncTaskBuilder};
use crate::provider::{
    Instance, InstanceSpec, ProviderCapability, ProviderError, ProviderResult,
};

use super::config::KubeVirtOptions;
use super::manifest::{
    CONSOLE_CONTAINER, VMI_API_VERSION, VMI_GROUP, VMI_KIND, VMI_NAME_LABEL, VMI_PLURAL,
    VMI_VERSION, VmiState, vmi_manifest, vmi_state,
};

/// KubeVirt provider bound to one namespace
#[derive(Clone)]
pub struct KubeVirtApi {
    client: Client,
    namespace: String,
    options: KubeVirtOptions,
}

impl std::fmt::Debug for KubeVirtApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeVirtApi")
            .field("namespace", &self.namespace)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn vmi_resource() -> ApiResource {
    ApiResource {
        group: VMI_GROUP.to_string(),
        version: VMI_VERSION.to_string(),
        api_version: VMI_API_VERSION.to_string(),
        kind: VMI_KIND.to_string(),
        plural: VMI_PLURAL.to_string(),
    }
}

fn request_error(e: kube::Error) -> ProviderError {
    ProviderError::Request {
        details: e.to_string(),
    }
}

fn is_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(ae) if ae.code == 404)
}

impl KubeVirtApi {
    /// Load the kubeconfig and build a client
    ///
    /// The namespace is `options.namespace` when set, otherwise the current
    /// context's namespace.
    ///
    /// # Arguments
    /// * `options` - Kubeconfig location, namespace and guest sizing
    ///
    /// # Returns
    /// AsyncTask that resolves to a connected API, or
    /// `ProviderError::InvalidConfig` when the kubeconfig cannot be used
    pub fn connect(options: KubeVirtOptions) -> AsyncTask<ProviderResult<Self>> {
        AsyncTaskBuilder::new(async move {
            let home = dirs::home_dir();
            let path = options.resolved_config_path(home.as_deref());
            info!("Loading kubeconfig from {}", path.display());

            let kubeconfig = Kubeconfig::read_from(&path).map_err(|e| ProviderError::InvalidConfig {
                details: format!("cannot read kubeconfig {}: {e}", path.display()),
            })?;

            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| ProviderError::InvalidConfig {
                    details: format!("cannot load kubeconfig {}: {e}", path.display()),
                })?;

            let namespace = options
                .namespace_override()
                .map(str::to_string)
                .unwrap_or_else(|| config.default_namespace.clone());

            let client = Client::try_from(config).map_err(|e| ProviderError::InvalidConfig {
                details: format!("cannot build Kubernetes client: {e}"),
            })?;

            debug!("KubeVirt provider using namespace {}", namespace);
            Ok(Self {
                client,
                namespace,
                options,
            })
        })
        .spawn()
    }

    pub fn options(&self) -> &KubeVirtOptions {
        &self.options
    }

    fn vmis(&self) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, &vmi_resource())
    }

    /// List the namespace's VMIs to prove the API is reachable
    ///
    /// # Returns
    /// AsyncTask that resolves to `(name, phase)` for every VMI
    pub fn preflight_check(&self) -> AsyncTask<ProviderResult<Vec<(String, String)>>> {
        let api = self.vmis();
        let namespace = self.namespace.clone();

        AsyncTaskBuilder::new(async move {
            let list = api.list(&ListParams::default()).await.map_err(request_error)?;

            let summary: Vec<(String, String)> = list
                .items
                .iter()
                .map(|vmi| {
                    let phase = vmi
                        .data
                        .get("status")
                        .and_then(|status| status.get("phase"))
                        .and_then(|phase| phase.as_str())
                        .unwrap_or("Unknown")
                        .to_string();
                    (vmi.name_any(), phase)
                })
                .collect();

            info!("Namespace {} has {} VMIs", namespace, summary.len());
            for (name, phase) in &summary {
                debug!("{}\t{}\t{}\t{}", VMI_KIND, name, namespace, phase);
            }
            Ok(summary)
        })
        .spawn()
    }
}

/// Poll until the VMI is Running with an address, bounded by `ready_timeout`
async fn wait_ready(api: &Api<DynamicObject>, name: &str, options: &KubeVirtOptions) -> ProviderResult<String> {
    tokio::time::timeout(options.ready_timeout, poll_ready(api, name, options))
        .await
        .map_err(|_| ProviderError::CreateFailed {
            name: name.to_string(),
            details: format!(
                "instance not running after {}s",
                options.ready_timeout.as_secs()
            ),
        })?
}

async fn poll_ready(api: &Api<DynamicObject>, name: &str, options: &KubeVirtOptions) -> ProviderResult<String> {
    loop {
        let vmi = api.get(name).await.map_err(request_error)?;
        match vmi_state(vmi.data.get("status")) {
            VmiState::Ready(ip) => return Ok(ip),
            VmiState::Failed(phase) => {
                return Err(ProviderError::CreateFailed {
                    name: name.to_string(),
                    details: format!("instance reached phase {phase}"),
                });
            }
            VmiState::Pending(phase) => {
                debug!(
                    "Instance {} not ready (phase {})",
                    name,
                    phase.as_deref().unwrap_or("unset")
                );
            }
        }
        tokio::time::sleep(options.poll_interval).await;
    }
}

impl ProviderCapability for KubeVirtApi {
    fn create_instance(&self, spec: InstanceSpec) -> AsyncTask<ProviderResult<Instance>> {
        let api = self.vmis();
        let namespace = self.namespace.clone();
        let options = self.options.clone();

        AsyncTaskBuilder::new(async move {
            let manifest = vmi_manifest(&spec.name, &namespace, &spec.userdata, &options, &spec.options);
            let vmi: DynamicObject =
                serde_json::from_value(manifest).map_err(|e| ProviderError::CreateFailed {
                    name: spec.name.clone(),
                    details: format!("invalid manifest: {e}"),
                })?;

            api.create(&PostParams::default(), &vmi)
                .await
                .map_err(|e| ProviderError::CreateFailed {
                    name: spec.name.clone(),
                    details: e.to_string(),
                })?;
            info!("Created VMI {} in namespace {}", spec.name, namespace);

            match wait_ready(&api, &spec.name, &options).await {
                Ok(ip) => {
                    debug!("VMI {} running at {}", spec.name, ip);
                    Ok(Instance::new(ip.clone(), ip))
                }
                Err(e) => {
                    if let Err(delete) = api.delete(&spec.name, &DeleteParams::default()).await {
                        warn!("Failed to delete unready VMI {}: {}", spec.name, delete);
                    }
                    Err(e)
                }
            }
        })
        .spawn()
    }

    fn terminate_instance(&self, name: &str) -> AsyncTask<ProviderResult<()>> {
        let api = self.vmis();
        let name = name.to_string();

        AsyncTaskBuilder::new(async move {
            debug!("Terminating instance {}", name);
            match api.delete(&name, &DeleteParams::default()).await {
                Ok(_) => Ok(()),
                Err(e) if is_not_found(&e) => Err(ProviderError::NotFound { name }),
                Err(e) => Err(ProviderError::TerminateFailed {
                    name,
                    details: e.to_string(),
                }),
            }
        })
        .spawn()
    }

    fn get_console_output(&self, name: &str) -> AsyncTask<ProviderResult<String>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let name = name.to_string();

        AsyncTaskBuilder::new(async move {
            let unavailable = |details: String| ProviderError::ConsoleUnavailable {
                name: name.clone(),
                details,
            };

            let selector = format!("{VMI_NAME_LABEL}={name}");
            let launchers = pods
                .list(&ListParams::default().labels(&selector))
                .await
                .map_err(|e| unavailable(e.to_string()))?;

            let pod = launchers
                .items
                .first()
                .ok_or_else(|| unavailable("no launcher pod".to_string()))?;

            let params = LogParams {
                container: Some(CONSOLE_CONTAINER.to_string()),
                ..LogParams::default()
            };

            pods.logs(&pod.name_any(), &params)
                .await
                .map_err(|e| unavailable(e.to_string()))
        })
        .spawn()
    }

    fn namespace(&self) -> Option<&str> {
        Some(self.namespace.as_str()).filter(|ns| !ns.is_empty())
    }

    fn provider_type(&self) -> &'static str {
        "kubevirt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vmi_resource_addresses_kubevirt_v1() {
        let ar = vmi_resource();
        assert_eq!(ar.api_version, "kubevirt.io/v1");
        assert_eq!(ar.plural, "virtualmachineinstances");
        assert_eq!(ar.kind, "VirtualMachineInstance");
    }

    #[tokio::test]
    async fn connect_reports_missing_kubeconfig() {
        let dir = assert_fs::TempDir::new().expect("temp dir");
        let options = KubeVirtOptions::new().with_config_path(dir.path().join("absent"));

        let result = KubeVirtApi::connect(options).await.expect("join");

        match result {
            Err(ProviderError::InvalidConfig { details }) => assert!(details.contains("absent")),
            other => panic!("Expected invalid config error, got {other:?}"),
        }
    }
}
