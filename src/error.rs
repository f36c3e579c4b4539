// ============================================================================
// File: src/error.rs
// ----------------------------------------------------------------------------
// Harness error taxonomy.
//
// Creation-path failures surface as HarnessError. Teardown-path failures are
// never returned; they are logged and collected into a TeardownReport.
// ============================================================================

use std::time::Duration;

use crate::provider::ProviderError;

/// Errors surfaced by Flight, Cluster and Machine operations
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Cluster creation could not resolve the configuration it needs
    #[error("Cannot provision cluster {cluster}: {reason}")]
    Provisioning { cluster: String, reason: String },

    /// The provider rejected or failed an instance operation
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Remote shell setup or transport failed; the machine is unaffected
    #[error("Cannot reach {address}: {details}")]
    Connectivity { address: String, details: String },

    /// A reachability or reboot wait exceeded its deadline
    #[error("Timed out after {}s waiting for {operation} on {machine}", timeout.as_secs())]
    Timeout {
        machine: String,
        operation: &'static str,
        timeout: Duration,
    },

    /// A remote command exited unsuccessfully where success was required
    #[error("Command `{command}` on {machine} exited with status {exit_status}: {stderr}")]
    Command {
        machine: String,
        command: String,
        exit_status: i32,
        stderr: String,
    },

    /// Internal harness error (poisoned lock, panicked task)
    #[error("Internal harness error: {message}")]
    Internal { message: String },
}

impl HarnessError {
    pub fn provisioning<C: Into<String>, R: Into<String>>(cluster: C, reason: R) -> Self {
        Self::Provisioning {
            cluster: cluster.into(),
            reason: reason.into(),
        }
    }

    pub fn connectivity<A: Into<String>, D: Into<String>>(address: A, details: D) -> Self {
        Self::Connectivity {
            address: address.into(),
            details: details.into(),
        }
    }

    pub fn timeout<M: Into<String>>(machine: M, operation: &'static str, timeout: Duration) -> Self {
        Self::Timeout {
            machine: machine.into(),
            operation,
            timeout,
        }
    }

    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying against the same machine may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::Timeout { .. })
    }
}

impl From<tokio::task::JoinError> for HarnessError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(format!("Harness task failed: {err}"))
    }
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_convert_transparently() {
        let err: HarnessError = ProviderError::NotFound {
            name: "kola-1234".to_string(),
        }
        .into();

        assert!(matches!(err, HarnessError::Provider(_)));
        assert_eq!(err.to_string(), "Instance kola-1234 not found");
    }

    #[test]
    fn timeout_message_names_machine_and_operation() {
        let err = HarnessError::timeout("kola-abc", "reboot", Duration::from_secs(90));
        assert_eq!(
            err.to_string(),
            "Timed out after 90s waiting for reboot on kola-abc"
        );
        assert!(err.is_retryable());
        assert!(!HarnessError::provisioning("c", "no namespace").is_retryable());
    }
}
