//! `Beskar7MachineTemplate` — the Cluster-API infrastructure machine template
//! consumed by MachineSet/MachineDeployment/KubeadmControlPlane.

use crate::machine::Beskar7MachineSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer stamped on a `Beskar7MachineTemplate`.
pub const MACHINE_TEMPLATE_FINALIZER: &str =
    "beskar7machinetemplate.infrastructure.cluster.x-k8s.io";

/// Desired state of a `Beskar7MachineTemplate`.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha1",
    kind = "Beskar7MachineTemplate",
    plural = "beskar7machinetemplates",
    namespaced,
    shortname = "b7mt"
)]
#[serde(rename_all = "camelCase")]
pub struct Beskar7MachineTemplateSpec {
    /// Template for the `Beskar7Machine`s this template stamps out.
    pub template: Beskar7MachineTemplateResource,
}

/// The templated object embedded in a `Beskar7MachineTemplate`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Beskar7MachineTemplateResource {
    pub spec: Beskar7MachineSpec,
}
