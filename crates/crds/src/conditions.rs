//! Condition type shared by all four CRDs' status, and the reason constants
//! referenced by the reconcilers.
//!
//! Modeled on the Cluster-API convention (type/status/severity/reason/message/
//! lastTransitionTime) rather than the bare Kubernetes `meta/v1.Condition`,
//! since severity is load-bearing here: it splits transient-warning
//! conditions from terminal-error ones.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Top-level summary condition on a `Beskar7Machine`.
pub const INFRASTRUCTURE_READY_CONDITION: &str = "InfrastructureReady";
/// Reports whether a machine has successfully claimed a host.
pub const PHYSICAL_HOST_ASSOCIATED_CONDITION: &str = "PhysicalHostAssociated";
/// Top-level summary condition on a `Beskar7Cluster`.
pub const CONTROL_PLANE_ENDPOINT_READY_CONDITION: &str = "ControlPlaneEndpointReady";
/// Composite readiness condition on a `PhysicalHost`.
pub const HOST_READY_CONDITION: &str = "Ready";
/// Reports BMC reachability specifically, independent of overall host readiness.
pub const BMC_CONNECTED_CONDITION: &str = "BMCConnected";

/// No candidate host satisfied the claim predicate this attempt.
pub const REASON_WAITING_FOR_PHYSICAL_HOST: &str = "WaitingForPhysicalHost";
/// The BMC secret does not exist.
pub const REASON_SECRET_NOT_FOUND: &str = "SecretNotFound";
/// The BMC could not be reached or a session could not be established.
pub const REASON_CONNECTION_FAILED: &str = "ConnectionFailed";
/// Inspection did not complete within the configured timeout.
pub const REASON_INSPECTION_TIMEOUT: &str = "InspectionTimeout";
/// No control-plane machine yet exposes a usable address.
pub const REASON_NOT_SET: &str = "NotSet";

/// `True`/`False`/`Unknown`, mirroring `corev1.ConditionStatus`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    #[default]
    False,
    /// The condition could not be evaluated.
    Unknown,
}

/// Severity of a non-`True` condition, used to distinguish transient retries
/// from terminal, user-actionable failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionSeverity {
    /// Terminal until the user corrects the spec.
    Error,
    /// Transient; the reconciler will keep retrying.
    Warning,
    /// Informational only.
    Info,
}

/// A single observed condition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. "InfrastructureReady".
    #[serde(rename = "type")]
    pub type_: String,

    /// Current status of the condition.
    pub status: ConditionStatus,

    /// Severity when status is not `True`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<ConditionSeverity>,

    /// Machine-readable reason for the current status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Timestamp of the last status transition (not merely the last observation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Construct a `status: True` condition.
    #[must_use]
    pub fn ready(type_: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            type_: type_.into(),
            status: ConditionStatus::True,
            severity: None,
            reason: None,
            message: None,
            last_transition_time: Some(now),
        }
    }

    /// Construct a `status: False` condition with reason/message/severity.
    #[must_use]
    pub fn not_ready(
        type_: impl Into<String>,
        severity: ConditionSeverity,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status: ConditionStatus::False,
            severity: Some(severity),
            reason: Some(reason.into()),
            message: Some(message.into()),
            last_transition_time: Some(now),
        }
    }
}

/// Insert or replace the condition of the same `type_`, preserving
/// `last_transition_time` when status is unchanged so that condition-age
/// reporting stays meaningful across no-op reconciles.
pub fn upsert_condition(conditions: &mut Vec<Condition>, new: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == new.type_) {
        if existing.status == new.status {
            let preserved_transition = existing.last_transition_time;
            *existing = new;
            existing.last_transition_time = preserved_transition;
        } else {
            *existing = new;
        }
    } else {
        conditions.push(new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_inserts_new_condition() {
        let mut conditions = Vec::new();
        upsert_condition(
            &mut conditions,
            Condition::ready(HOST_READY_CONDITION, Utc::now()),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].type_, HOST_READY_CONDITION);
    }

    #[test]
    fn upsert_preserves_transition_time_when_status_unchanged() {
        let t0 = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let t1 = DateTime::parse_from_rfc3339("2026-01-01T01:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut conditions = vec![Condition::ready(HOST_READY_CONDITION, t0)];
        upsert_condition(&mut conditions, Condition::ready(HOST_READY_CONDITION, t1));

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, Some(t0));
    }

    #[test]
    fn upsert_updates_transition_time_when_status_changes() {
        let t0 = Utc::now();
        let mut conditions = vec![Condition::ready(HOST_READY_CONDITION, t0)];
        let new = Condition::not_ready(
            HOST_READY_CONDITION,
            ConditionSeverity::Warning,
            REASON_CONNECTION_FAILED,
            "bmc unreachable",
            t0,
        );
        upsert_condition(&mut conditions, new.clone());
        assert_eq!(conditions[0], new);
    }
}
