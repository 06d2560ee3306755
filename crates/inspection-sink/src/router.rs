//! Router construction for the inspection sink's HTTP surface.

use crate::handlers::{healthz, receive_inspection, SinkState};
use axum::routing::{get, post};
use axum::Router;
use crds::physical_host::PhysicalHost;
use kube::Api;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the inspection sink's axum router over the given `PhysicalHost` API handle.
#[must_use]
pub fn router(hosts: Api<PhysicalHost>) -> Router {
    let state = SinkState {
        hosts: Arc::new(hosts),
    };
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/inspection", post(receive_inspection))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
