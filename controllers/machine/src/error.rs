//! Controller-specific error types.

use thiserror::Error;

/// Errors that can occur while reconciling a `Beskar7Machine`.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error.
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A BMC operation failed while applying boot configuration.
    #[error("BMC error: {0}")]
    Bmc(#[from] bmc::BmcError),

    /// The claim coordinator could not bind a host (transient, .
    #[error("claim error: {0}")]
    Claim(#[from] claim_coordinator::ClaimError),

    /// `spec.provisioningMode`/`spec.osFamily`/`spec.remoteConfigUrl` are
    /// mutually inconsistent (, permanent until
    /// spec is corrected).
    #[error("invalid machine spec: {0}")]
    InvalidSpec(String),
}
