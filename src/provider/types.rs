// ============================================================================
// File: src/provider/types.rs
// ----------------------------------------------------------------------------
// Instance request and result types
// ============================================================================

use serde::{Deserialize, Serialize};

/// Opaque boot payload (Ignition or cloud-init content)
///
/// The harness never parses the payload; it is handed to the provider as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    content: String,
}

impl UserData {
    /// Wrap rendered boot payload content
    pub fn new<C: Into<String>>(content: C) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Payload that carries no configuration
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Recognized machine creation toggles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineOptions {
    /// Return as soon as the instance is created, without waiting for it to
    /// become reachable. The caller must not assume the machine is up.
    pub skip_startup_wait: bool,

    /// Attach a journal that records boot observations for the machine
    pub record_journal: bool,

    /// Minimum guest memory in MiB, if the test needs more than the default
    pub min_memory_mib: Option<u32>,
}

impl MachineOptions {
    /// Create options with every toggle off
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip waiting for the machine to become reachable
    pub fn with_skip_startup_wait(mut self, skip: bool) -> Self {
        self.skip_startup_wait = skip;
        self
    }

    /// Record a journal for the machine
    pub fn with_journal(mut self, record: bool) -> Self {
        self.record_journal = record;
        self
    }

    /// Require at least `mib` MiB of guest memory
    pub fn with_min_memory_mib(mut self, mib: u32) -> Self {
        self.min_memory_mib = Some(mib);
        self
    }
}

/// Instance creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSpec {
    /// Instance name; becomes the Machine id
    pub name: String,

    /// Boot payload
    pub userdata: UserData,

    /// Creation options
    pub options: MachineOptions,
}

impl InstanceSpec {
    pub fn new<N: Into<String>>(name: N, userdata: UserData, options: MachineOptions) -> Self {
        Self {
            name: name.into(),
            userdata,
            options,
        }
    }
}

/// Addresses of a created instance
///
/// Both addresses may be empty when the caller skipped the startup wait and
/// the provider had not assigned them yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Address reachable from inside the provider's network
    pub internal_ip: String,

    /// Address reachable from the test runner
    pub external_ip: String,
}

impl Instance {
    pub fn new<I: Into<String>, E: Into<String>>(internal_ip: I, external_ip: E) -> Self {
        Self {
            internal_ip: internal_ip.into(),
            external_ip: external_ip.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_options_builder() {
        let options = MachineOptions::new()
            .with_skip_startup_wait(true)
            .with_journal(true)
            .with_min_memory_mib(4096);

        assert!(options.skip_startup_wait);
        assert!(options.record_journal);
        assert_eq!(options.min_memory_mib, Some(4096));
        assert_eq!(MachineOptions::default(), MachineOptions::new());
    }

    #[test]
    fn userdata_is_opaque() {
        let payload = UserData::new("{\"ignition\":{\"version\":\"3.4.0\"}}");
        assert_eq!(payload.as_str(), "{\"ignition\":{\"version\":\"3.4.0\"}}");
        assert!(!payload.is_empty());
        assert!(UserData::empty().is_empty());
    }
}
