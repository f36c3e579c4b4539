//! Boot lifecycle helpers shared by every machine
//!
//! Reachability and reboot detection both work by reading the kernel boot
//! id over the remote shell: a machine is up once the id can be read, and it
//! has rebooted once a different id appears.

use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};

use super::journal::Journal;
use super::machine::Machine;

const BOOT_ID_COMMAND: &str = "cat /proc/sys/kernel/random/boot_id";

// Queued through systemd so the command returns before the connection drops.
const REBOOT_COMMAND: &str = "sudo systemd-run --no-block systemctl reboot";

/// Read the current boot id of `machine`
pub async fn get_boot_id(machine: &Machine) -> HarnessResult<String> {
    let output = machine
        .run(BOOT_ID_COMMAND)
        .await?
        .into_success(machine.id(), BOOT_ID_COMMAND)?;

    let boot_id = output.stdout_trimmed();
    if boot_id.is_empty() {
        return Err(HarnessError::Command {
            machine: machine.id().to_string(),
            command: BOOT_ID_COMMAND.to_string(),
            exit_status: output.exit_status,
            stderr: "empty boot id".to_string(),
        });
    }
    Ok(boot_id)
}

/// Wait until `machine` answers over the remote shell
///
/// # Arguments
/// * `machine` - Machine to probe
/// * `journal` - Journal that records the observed boot, if attached
/// * `timeout` - Deadline for the first successful probe
pub async fn start_machine(
    machine: &Machine,
    journal: Option<&Journal>,
    timeout: Duration,
) -> HarnessResult<()> {
    let boot_id = poll_boot_id(machine, None, timeout, "startup").await?;
    info!("Machine {} is up (boot {})", machine.id(), boot_id);
    record(machine, journal, "boot", &format!("boot_id={boot_id}"));
    Ok(())
}

/// Reboot `machine` and wait for it to come back with a new boot id
pub async fn reboot_machine(
    machine: &Machine,
    journal: Option<&Journal>,
    timeout: Duration,
) -> HarnessResult<()> {
    let prior_boot_id = get_boot_id(machine).await?;

    match machine.run(REBOOT_COMMAND).await {
        Ok(output) => {
            output.into_success(machine.id(), REBOOT_COMMAND)?;
        }
        Err(HarnessError::Connectivity { details, .. }) => {
            debug!("Connection to {} dropped during reboot: {}", machine.id(), details);
        }
        Err(e) => return Err(e),
    }

    wait_for_machine_reboot(machine, journal, timeout, &prior_boot_id).await
}

/// Wait until `machine` reports a boot id other than `prior_boot_id`
///
/// Returns `HarnessError::Timeout` if no new boot is observed within
/// `timeout`; the machine is left as it is.
pub async fn wait_for_machine_reboot(
    machine: &Machine,
    journal: Option<&Journal>,
    timeout: Duration,
    prior_boot_id: &str,
) -> HarnessResult<()> {
    let boot_id = poll_boot_id(machine, Some(prior_boot_id), timeout, "reboot").await?;
    info!(
        "Machine {} rebooted (boot {} -> {})",
        machine.id(),
        prior_boot_id,
        boot_id
    );
    record(
        machine,
        journal,
        "reboot",
        &format!("boot_id={prior_boot_id} -> boot_id={boot_id}"),
    );
    Ok(())
}

async fn poll_boot_id(
    machine: &Machine,
    prior_boot_id: Option<&str>,
    timeout: Duration,
    operation: &'static str,
) -> HarnessResult<String> {
    let interval = machine.runtime_conf().ssh_retry_interval;

    let poll = async {
        loop {
            match get_boot_id(machine).await {
                Ok(boot_id) if prior_boot_id == Some(boot_id.as_str()) => {
                    debug!("Machine {} still on boot {}", machine.id(), boot_id);
                }
                Ok(boot_id) => return boot_id,
                Err(e) => debug!("Machine {} not reachable yet: {}", machine.id(), e),
            }
            tokio::time::sleep(interval).await;
        }
    };

    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| HarnessError::timeout(machine.id(), operation, timeout))
}

fn record(machine: &Machine, journal: Option<&Journal>, label: &str, text: &str) {
    if let Some(journal) = journal
        && let Err(e) = journal.record(label, text)
    {
        warn!("Failed to record {} for machine {}: {}", label, machine.id(), e);
    }
}
