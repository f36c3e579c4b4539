// ============================================================================
// File: src/provider/mod.rs
// ----------------------------------------------------------------------------
// Provider capability contract and concrete backends.
//
// The harness core only ever calls create, terminate and console fetch.
// Everything provider-specific (instance kinds, clients, namespaces) stays
// behind the ProviderCapability trait.
// ============================================================================

mod errors;
mod trait_def;
mod types;

pub use errors::{ProviderError, ProviderResult};
pub use trait_def::ProviderCapability;
pub use types::{Instance, InstanceSpec, MachineOptions, UserData};

#[cfg(feature = "kubevirt")]
pub mod kubevirt;
#[cfg(feature = "kubevirt")]
pub use kubevirt::{KubeVirtApi, KubeVirtOptions};
