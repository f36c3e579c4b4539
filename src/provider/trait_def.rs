// ============================================================================
// File: src/provider/trait_def.rs
// ----------------------------------------------------------------------------
// ProviderCapability trait definition
// ============================================================================

use crate::async_task::AsyncTask;
use crate::provider::errors::ProviderResult;
use crate::provider::types::{Instance, InstanceSpec};

/// Instance creation/termination contract implemented by VM backends
///
/// Instances are addressed by the name the harness requested them with,
/// which is also the owning Machine's id. Implementations must be safe for
/// concurrent use; the harness issues calls from many tasks at once and
/// never retries a failed call.
pub trait ProviderCapability: Send + Sync + std::fmt::Debug {
    /// Create an instance
    ///
    /// # Arguments
    /// * `spec` - Instance name, opaque boot payload and machine options
    ///
    /// # Returns
    /// AsyncTask that resolves to the created instance's addresses
    fn create_instance(&self, spec: InstanceSpec) -> AsyncTask<ProviderResult<Instance>>;

    /// Terminate the named instance
    ///
    /// # Arguments
    /// * `name` - Name the instance was created with
    fn terminate_instance(&self, name: &str) -> AsyncTask<ProviderResult<()>>;

    /// Fetch the raw console text of the named instance
    ///
    /// # Arguments
    /// * `name` - Name the instance was created with
    fn get_console_output(&self, name: &str) -> AsyncTask<ProviderResult<String>>;

    /// Namespace or project instances are created in, if one was resolved
    fn namespace(&self) -> Option<&str>;

    /// Get the provider type identifier
    fn provider_type(&self) -> &'static str;
}
