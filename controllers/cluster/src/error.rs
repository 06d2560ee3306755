//! Controller-specific error types.

use thiserror::Error;

/// Errors that can occur while reconciling a `Beskar7Cluster`.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error.
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}
