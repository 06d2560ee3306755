//! Errors surfaced by the claim coordinator.

use thiserror::Error;

/// Errors from `claim` and `release`.
#[derive(Debug, Error)]
pub enum ClaimError {
    /// No available host satisfied the candidate predicate this attempt.
    /// Callers should requeue (5-60s).
    #[error("no physical host available to claim")]
    NoHostAvailable,

    /// The Kubernetes API returned an error unrelated to optimistic
    /// concurrency (already retried where applicable).
    #[error("kube API error: {0}")]
    Kube(#[from] kube::Error),
}
