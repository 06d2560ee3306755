//! HTTP handlers for the inspection callback.

use crate::error::SinkError;
use crate::payload::InspectionReportPayload;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use crds::physical_host::{HostPhase, PhysicalHost};
use kube::api::{Patch, PatchParams};
use kube::Api;
use serde_json::json;
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct SinkState {
    pub hosts: Arc<Api<PhysicalHost>>,
}

/// `GET /healthz` — liveness probe for the inspection sink's own pod.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// `POST /api/v1/inspection` — record a firmware inspection report.
///
/// Only `status.inspectionPhase`/`status.inspectionReport`/`status.hardware`
/// are touched here; the phase transition out of `Inspecting` happens on the
/// reconciler's next tick, once it evaluates the report against the bound
/// consumer's hardware requirements.
pub async fn receive_inspection(
    State(state): State<SinkState>,
    Json(payload): Json<InspectionReportPayload>,
) -> Result<StatusCode, SinkError> {
    payload.validate_identity()?;

    let current = state
        .hosts
        .get(&payload.host_name)
        .await
        .map_err(|err| match err {
            kube::Error::Api(api_err) if api_err.code == 404 => {
                SinkError::UnknownHost(payload.namespace.clone(), payload.host_name.clone())
            }
            other => SinkError::Kube(other),
        })?;

    let state_was_inspecting = current
        .status
        .as_ref()
        .is_some_and(|s| s.state == HostPhase::Inspecting);
    if state_was_inspecting {
        tracing::info!(
            host = %payload.host_name,
            namespace = %payload.namespace,
            "inspection report recorded, awaiting reconciler evaluation"
        );
    }

    let patch = json!({
        "status": {
            "hardware": payload.hardware_details(),
            "inspectionReport": payload.to_inspection_report(),
            "inspectionPhase": "Complete",
        }
    });
    state
        .hosts
        .patch_status(&payload.host_name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;

    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use crds::physical_host::{InspectionPhase, PhysicalHostStatus};

    #[test]
    fn default_status_has_pending_inspection() {
        assert_eq!(PhysicalHostStatus::default().inspection_phase, InspectionPhase::Pending);
    }
}
