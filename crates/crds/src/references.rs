//! Cross-resource references shared by the CRDs.
//!
//! Follows the Kubernetes convention of a small typed reference struct rather
//! than a bare string, so the referenced kind/apiVersion travels with the
//! name instead of being inferred from context.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the Secret holding BMC `username`/`password` keys.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Name of the Secret.
    pub name: String,

    /// Namespace of the Secret (defaults to the same namespace as the referencing object).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Back-link from a `PhysicalHost` to the machine that claimed it.
///
/// Mirrors Kubernetes' `ObjectReference` shape (kind/apiVersion/name/namespace/uid)
/// so the claim can be validated against the exact object that set it, not just
/// by name.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerRef {
    /// API version of the referent (e.g. "infrastructure.cluster.x-k8s.io/v1alpha1").
    pub api_version: String,

    /// Kind of the referent (e.g. "Beskar7Machine").
    pub kind: String,

    /// Name of the referent.
    pub name: String,

    /// Namespace of the referent.
    pub namespace: String,

    /// UID of the referent, captured at claim time.
    pub uid: String,
}

impl ConsumerRef {
    /// True if this reference names the given namespaced object.
    #[must_use]
    pub fn matches(&self, namespace: &str, name: &str) -> bool {
        self.namespace == namespace && self.name == name
    }
}
