// ============================================================================
// File: src/provider/kubevirt/manifest.rs
// ----------------------------------------------------------------------------
// VirtualMachineInstance manifest construction and status parsing
// ============================================================================

use log::warn;
use serde_json::{Value, json};

use crate::provider::{MachineOptions, UserData};

use super::config::KubeVirtOptions;

pub const VMI_GROUP: &str = "kubevirt.io";
pub const VMI_VERSION: &str = "v1";
pub const VMI_API_VERSION: &str = "kubevirt.io/v1";
pub const VMI_KIND: &str = "VirtualMachineInstance";
pub const VMI_PLURAL: &str = "virtualmachineinstances";

/// Label KubeVirt puts on the launcher pod of a VMI
pub const VMI_NAME_LABEL: &str = "vm.kubevirt.io/name";

/// Launcher pod container streaming the guest serial console
pub const CONSOLE_CONTAINER: &str = "guest-console-log";

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY: &str = "kola";

/// Build the VMI object for one machine
///
/// # Arguments
/// * `name` - Instance name
/// * `namespace` - Target namespace
/// * `userdata` - Passed through verbatim as config-drive user data
/// * `kubevirt` - Image and default sizing
/// * `options` - Per-machine toggles; only the memory floor applies here
pub fn vmi_manifest(
    name: &str,
    namespace: &str,
    userdata: &UserData,
    kubevirt: &KubeVirtOptions,
    options: &MachineOptions,
) -> Value {
    let memory = guest_memory(&kubevirt.memory, options.min_memory_mib);

    let mut volumes = vec![json!({
        "name": "containerdisk",
        "containerDisk": { "image": kubevirt.container_disk },
    })];
    let mut disks = vec![json!({
        "name": "containerdisk",
        "disk": { "bus": "virtio" },
    })];

    if !userdata.is_empty() {
        volumes.push(json!({
            "name": "cloudinitdisk",
            "cloudInitConfigDrive": { "userData": userdata.as_str() },
        }));
        disks.push(json!({
            "name": "cloudinitdisk",
            "disk": { "bus": "virtio" },
        }));
    }

    json!({
        "apiVersion": VMI_API_VERSION,
        "kind": VMI_KIND,
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": { MANAGED_BY_LABEL: MANAGED_BY },
        },
        "spec": {
            "domain": {
                "cpu": { "cores": kubevirt.cpus },
                "resources": { "requests": { "memory": memory } },
                "devices": {
                    "disks": disks,
                    "interfaces": [{ "name": "default", "masquerade": {} }],
                    "logSerialConsole": true,
                },
            },
            "networks": [{ "name": "default", "pod": {} }],
            "terminationGracePeriodSeconds": 0,
            "volumes": volumes,
        },
    })
}

/// Memory request honoring a per-machine floor in MiB
///
/// The floor only ever raises the request. A configured quantity that cannot
/// be parsed is kept as is.
fn guest_memory(default: &str, min_mib: Option<u32>) -> String {
    let Some(min) = min_mib else {
        return default.to_string();
    };

    match quantity_mib(default) {
        Some(current) if u64::from(min) > current => format!("{min}Mi"),
        Some(_) => default.to_string(),
        None => {
            warn!(
                "Cannot parse memory quantity {:?}; ignoring {}Mi floor",
                default, min
            );
            default.to_string()
        }
    }
}

/// Kubernetes memory quantity rounded up to whole MiB
///
/// Accepts decimal numbers with binary (Ki..Ei) or decimal (k/K..E) suffixes,
/// or no suffix for bytes. Returns `None` for anything else, including
/// values that do not fit in u64 MiB.
fn quantity_mib(quantity: &str) -> Option<u64> {
    const SUFFIXES: [(&str, f64); 12] = [
        ("Ki", 1024.0),
        ("Mi", 1_048_576.0),
        ("Gi", 1_073_741_824.0),
        ("Ti", 1_099_511_627_776.0),
        ("Pi", 1_125_899_906_842_624.0),
        ("Ei", 1_152_921_504_606_846_976.0),
        ("k", 1e3),
        ("K", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
    ];

    let quantity = quantity.trim();
    let (digits, scale) = SUFFIXES
        .iter()
        .find_map(|(suffix, scale)| quantity.strip_suffix(suffix).map(|n| (n, *scale)))
        .or_else(|| quantity.strip_suffix('E').map(|n| (n, 1e18)))
        .unwrap_or((quantity, 1.0));

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let mib = (digits.parse::<f64>().ok()? * scale / 1_048_576.0).ceil();
    (mib.is_finite() && mib < u64::MAX as f64).then_some(mib as u64)
}

/// Observed state of a VMI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmiState {
    /// Not running yet, or running without an address
    Pending(Option<String>),
    /// Running with an address on the first interface
    Ready(String),
    /// Reached a terminal phase
    Failed(String),
}

/// Classify a VMI from its `status` object
pub fn vmi_state(status: Option<&Value>) -> VmiState {
    let Some(status) = status else {
        return VmiState::Pending(None);
    };

    let phase = status.get("phase").and_then(Value::as_str);
    match phase {
        Some(terminal @ ("Failed" | "Succeeded")) => VmiState::Failed(terminal.to_string()),
        Some("Running") => {
            let address = status
                .get("interfaces")
                .and_then(Value::as_array)
                .and_then(|interfaces| interfaces.first())
                .and_then(|interface| interface.get("ipAddress"))
                .and_then(Value::as_str)
                .filter(|ip| !ip.is_empty());

            match address {
                Some(ip) => VmiState::Ready(ip.to_string()),
                None => VmiState::Pending(Some("Running".to_string())),
            }
        }
        other => VmiState::Pending(other.map(str::to_string)),
    }
}
