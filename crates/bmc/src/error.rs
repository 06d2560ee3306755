//! Errors surfaced by the BMC client abstraction.

use thiserror::Error;

/// Errors that can occur when interacting with a BMC over Redfish.
#[derive(Debug, Error)]
pub enum BmcError {
    /// HTTP request/response error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The BMC returned a non-2xx response.
    #[error("BMC API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credentials were rejected or missing.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The requested resource does not exist on the BMC (e.g. no such boot option).
    #[error("not found: {0}")]
    NotFound(String),

    /// A capability was invoked that this implementation declines to perform
    /// (the Boot Options mechanism is declared but unimplemented).
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The BMC connection or an in-flight operation exceeded its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),
}
