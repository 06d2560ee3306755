//! Errors surfaced by the inspection sink, mapped onto the HTTP status codes
//! of 's inspection callback contract.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors handling an inspection report.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Required identity fields (`namespace`/`hostName`) were missing.
    #[error("missing required identity field: {0}")]
    MissingIdentity(&'static str),

    /// No `PhysicalHost` matches the reported namespace/name.
    #[error("unknown host {0}/{1}")]
    UnknownHost(String, String),

    /// The status-subresource patch failed.
    #[error("failed to record inspection report: {0}")]
    Kube(#[from] kube::Error),
}

impl IntoResponse for SinkError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::MissingIdentity(_) => StatusCode::BAD_REQUEST,
            Self::UnknownHost(_, _) => StatusCode::NOT_FOUND,
            Self::Kube(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
