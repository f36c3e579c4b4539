// ============================================================================
// File: src/platform/mod.rs
// ----------------------------------------------------------------------------
// Machine, Cluster and Flight lifecycle.
//
// Ownership runs strictly downward: a Flight owns its Clusters and a Cluster
// owns its Machines, each through a map keyed by name. Upward references
// are weak and used only for delegation and teardown notification.
// ============================================================================

mod boot;
mod cluster;
mod config;
mod flight;
mod journal;
mod machine;
mod teardown;

#[cfg(test)]
mod testing;

pub use boot::{get_boot_id, reboot_machine, start_machine, wait_for_machine_reboot};
pub use cluster::Cluster;
pub use config::{FlightConfig, NetworkMode, RuntimeConfig};
pub use flight::Flight;
pub use journal::Journal;
pub use machine::Machine;
pub use teardown::{TeardownFailure, TeardownReport, TeardownStage};
