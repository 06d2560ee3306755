//! `Beskar7Cluster` — the Cluster-API infrastructure cluster, responsible for
//! the control-plane endpoint and failure-domain set.

use crate::conditions::Condition;
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Finalizer stamped on every `Beskar7Cluster`.
pub const CLUSTER_FINALIZER: &str = "beskar7cluster.infrastructure.cluster.x-k8s.io";

/// Topology label consulted for failure-domain aggregation when
/// `spec.topologyLabelKey` is unset.
pub const DEFAULT_TOPOLOGY_LABEL_KEY: &str = "topology.kubernetes.io/zone";

/// Default control-plane endpoint port when none is discovered
/// ("default port 6443").
pub const DEFAULT_CONTROL_PLANE_PORT: u16 = 6443;

/// Label copied down from the owning Cluster-API `Machine`/`Cluster` objects
/// identifying which logical cluster a `Beskar7Machine`/`PhysicalHost`
/// belongs to. Mirrors the upstream `cluster.x-k8s.io/cluster-name` label.
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Label present on a `Beskar7Machine` when the owning `Machine` is a
/// control-plane member. Mirrors the upstream
/// `cluster.x-k8s.io/control-plane` label (presence-only, value ignored).
pub const CONTROL_PLANE_LABEL: &str = "cluster.x-k8s.io/control-plane";

/// Desired state of a `Beskar7Cluster`.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha1",
    kind = "Beskar7Cluster",
    plural = "beskar7clusters",
    namespaced,
    status = "Beskar7ClusterStatus",
    shortname = "b7c"
)]
#[serde(rename_all = "camelCase")]
pub struct Beskar7ClusterSpec {
    /// User-supplied control-plane endpoint; when set, discovery is skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,

    /// Topology label key read off each `PhysicalHost` for failure-domain
    /// aggregation. Defaults to `DEFAULT_TOPOLOGY_LABEL_KEY` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology_label_key: Option<String>,
}

impl Beskar7ClusterSpec {
    /// The effective topology label key, honoring the spec override.
    #[must_use]
    pub fn topology_label_key(&self) -> &str {
        self.topology_label_key
            .as_deref()
            .unwrap_or(DEFAULT_TOPOLOGY_LABEL_KEY)
    }
}

/// A reachable API server endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    pub host: String,
    pub port: u16,
}

/// One failure domain contributed by a control-plane `PhysicalHost`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct FailureDomain {
    /// Domain identifier, e.g. a rack or BMC-reported chassis name.
    pub name: String,
    /// Whether control-plane machines should be spread across this domain.
    pub control_plane: bool,
}

/// Observed state of a `Beskar7Cluster`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Beskar7ClusterStatus {
    #[serde(default)]
    pub ready: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,

    /// Failure domains, keyed by name, in the shape Cluster-API's core
    /// controller expects (`status.failureDomains` is a map, not a list).
    #[serde(default)]
    pub failure_domains: BTreeMap<String, FailureDomainSpec>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<DateTime<Utc>>,
}

/// Value type of the `status.failureDomains` map.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FailureDomainSpec {
    #[serde(default)]
    pub control_plane: bool,
}

/// Aggregate a set of per-host failure domains into the cluster-status map.
///
/// Commutative and idempotent in the input ordering:
/// the result depends only on the set of `(name, control_plane)` pairs, not
/// the order domains were observed in.
#[must_use]
pub fn aggregate_failure_domains(domains: &[FailureDomain]) -> BTreeMap<String, FailureDomainSpec> {
    let mut out: BTreeMap<String, FailureDomainSpec> = BTreeMap::new();
    for domain in domains {
        let entry = out.entry(domain.name.clone()).or_default();
        entry.control_plane |= domain.control_plane;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_label_key_defaults_when_unset() {
        let spec = Beskar7ClusterSpec {
            control_plane_endpoint: None,
            topology_label_key: None,
        };
        assert_eq!(spec.topology_label_key(), DEFAULT_TOPOLOGY_LABEL_KEY);
    }

    #[test]
    fn topology_label_key_honors_override() {
        let spec = Beskar7ClusterSpec {
            control_plane_endpoint: None,
            topology_label_key: Some("rack".to_string()),
        };
        assert_eq!(spec.topology_label_key(), "rack");
    }

    #[test]
    fn aggregation_is_commutative() {
        let a = vec![
            FailureDomain {
                name: "rack-a".to_string(),
                control_plane: true,
            },
            FailureDomain {
                name: "rack-b".to_string(),
                control_plane: false,
            },
        ];
        let mut b = a.clone();
        b.reverse();

        assert_eq!(aggregate_failure_domains(&a), aggregate_failure_domains(&b));
    }

    #[test]
    fn aggregation_merges_duplicate_domain_names() {
        let domains = vec![
            FailureDomain {
                name: "rack-a".to_string(),
                control_plane: false,
            },
            FailureDomain {
                name: "rack-a".to_string(),
                control_plane: true,
            },
        ];
        let result = aggregate_failure_domains(&domains);
        assert_eq!(result.len(), 1);
        assert!(result["rack-a"].control_plane);
    }
}
