// ============================================================================
// File: src/provider/kubevirt/mod.rs
// ----------------------------------------------------------------------------
// KubeVirt provider adapter.
//
// Machines are VirtualMachineInstances created in one namespace:
// - config: kubeconfig location, namespace and guest sizing
// - manifest: pure VMI manifest construction and status parsing
// - api: Kubernetes client, readiness polling and ProviderCapability impl
// ============================================================================

mod api;
mod config;
mod manifest;

pub use api::KubeVirtApi;
pub use config::KubeVirtOptions;
pub use manifest::{VMI_API_VERSION, VMI_KIND};
