// ============================================================================
// File: src/provider/errors.rs
// ----------------------------------------------------------------------------
// Provider-boundary error types
// ============================================================================

/// Errors raised at the provider boundary
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Instance creation failed
    #[error("Failed to create instance {name}: {details}")]
    CreateFailed { name: String, details: String },

    /// Instance termination failed
    #[error("Failed to terminate instance {name}: {details}")]
    TerminateFailed { name: String, details: String },

    /// Console output could not be retrieved
    #[error("Failed to retrieve console output for {name}: {details}")]
    ConsoleUnavailable { name: String, details: String },

    /// The addressed instance does not exist
    #[error("Instance {name} not found")]
    NotFound { name: String },

    /// Provider configuration could not be loaded or resolved
    #[error("Invalid provider configuration: {details}")]
    InvalidConfig { details: String },

    /// A provider API request failed outside a specific instance operation
    #[error("Provider request failed: {details}")]
    Request { details: String },
}

impl ProviderError {
    /// Instance name the error refers to, if any
    pub fn instance(&self) -> Option<&str> {
        match self {
            Self::CreateFailed { name, .. }
            | Self::TerminateFailed { name, .. }
            | Self::ConsoleUnavailable { name, .. }
            | Self::NotFound { name } => Some(name),
            Self::InvalidConfig { .. } | Self::Request { .. } => None,
        }
    }
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;
