//! Controller-specific error types.

use thiserror::Error;

/// Errors that can occur while reconciling a `PhysicalHost`.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error.
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A BMC operation failed.
    #[error("BMC error: {0}")]
    Bmc(#[from] bmc::BmcError),

    /// Environment/spec configuration was invalid.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The credentials Secret referenced by `spec.bmc.credentialsSecretRef` is missing
    /// or missing a required key.
    #[error("secret not found or incomplete: {0}")]
    SecretNotFound(String),

    /// The reconcile's bounded context (, default 60s) elapsed.
    #[error("reconcile timed out")]
    Timeout,
}
