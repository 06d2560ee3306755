//! Pure control-plane endpoint selection, isolated from `kube::Api` so the
//! permutation-invariance law can be exercised directly.

use crds::cluster::{ApiEndpoint, DEFAULT_CONTROL_PLANE_PORT};
use crds::machine::Beskar7Machine;

/// Returns true if `machine` is a control-plane member of `cluster_name`,
/// i.e. carries both the cluster-association and control-plane labels
/// (`crds::cluster::CLUSTER_NAME_LABEL`/`CONTROL_PLANE_LABEL`).
#[must_use]
pub fn is_control_plane_member(machine: &Beskar7Machine, cluster_name: &str) -> bool {
    let Some(labels) = &machine.metadata.labels else {
        return false;
    };
    labels.get(crds::cluster::CLUSTER_NAME_LABEL).map(String::as_str) == Some(cluster_name)
        && labels.contains_key(crds::cluster::CONTROL_PLANE_LABEL)
}

/// Select the control-plane endpoint from `machines` belonging to
/// `cluster_name`: the first control-plane machine with
/// `status.ready = true` and at least one address, preferring an internal
/// address over an external one, on the default port.
///
/// Deterministic regardless of input order: candidates are sorted by name
/// before selection.
#[must_use]
pub fn select_control_plane_endpoint(machines: &[Beskar7Machine], cluster_name: &str) -> Option<ApiEndpoint> {
    let mut candidates: Vec<&Beskar7Machine> = machines
        .iter()
        .filter(|m| is_control_plane_member(m, cluster_name))
        .filter(|m| m.status.as_ref().is_some_and(|s| s.ready))
        .filter(|m| m.status.as_ref().is_some_and(|s| !s.addresses.is_empty()))
        .collect();
    candidates.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

    let machine = candidates.into_iter().next()?;
    let addresses = &machine.status.as_ref()?.addresses;
    let address = addresses
        .iter()
        .find(|a| a.is_internal)
        .or_else(|| addresses.first())?;

    Some(ApiEndpoint {
        host: address.address.clone(),
        port: DEFAULT_CONTROL_PLANE_PORT,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::machine::{Beskar7MachineSpec, Beskar7MachineStatus, MachinePhase, OsFamily, ProvisioningMode};
    use crds::physical_host::{AddressFamily, HardwareRequirements, NetworkAddress};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn control_plane_machine(name: &str, ready: bool, addresses: Vec<NetworkAddress>) -> Beskar7Machine {
        let mut labels = BTreeMap::new();
        labels.insert(crds::cluster::CLUSTER_NAME_LABEL.to_string(), "demo".to_string());
        labels.insert(crds::cluster::CONTROL_PLANE_LABEL.to_string(), "true".to_string());
        Beskar7Machine {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Beskar7MachineSpec {
                image_url: "http://x/image.iso".to_string(),
                os_family: OsFamily::Talos,
                provisioning_mode: ProvisioningMode::PreBakedISO,
                remote_config_url: None,
                hardware_requirements: HardwareRequirements::default(),
            },
            status: Some(Beskar7MachineStatus {
                ready,
                phase: if ready { MachinePhase::Provisioned } else { MachinePhase::Provisioning },
                addresses,
                ..Default::default()
            }),
        }
    }

    fn address(ip: &str, internal: bool) -> NetworkAddress {
        NetworkAddress {
            family: AddressFamily::V4,
            address: ip.to_string(),
            gateway: None,
            interface: None,
            mac_address: None,
            is_internal: internal,
        }
    }

    #[test]
    fn selects_ready_control_plane_machine_with_address() {
        let machines = vec![control_plane_machine("cp-1", true, vec![address("10.0.0.5", true)])];
        let endpoint = select_control_plane_endpoint(&machines, "demo").unwrap();
        assert_eq!(endpoint.host, "10.0.0.5");
        assert_eq!(endpoint.port, DEFAULT_CONTROL_PLANE_PORT);
    }

    #[test]
    fn prefers_internal_address_over_external() {
        let machines = vec![control_plane_machine(
            "cp-1",
            true,
            vec![address("203.0.113.9", false), address("10.0.0.5", true)],
        )];
        let endpoint = select_control_plane_endpoint(&machines, "demo").unwrap();
        assert_eq!(endpoint.host, "10.0.0.5");
    }

    #[test]
    fn ignores_not_ready_machines() {
        let machines = vec![control_plane_machine("cp-1", false, vec![address("10.0.0.5", true)])];
        assert!(select_control_plane_endpoint(&machines, "demo").is_none());
    }

    #[test]
    fn ignores_machines_of_other_clusters() {
        let mut other = control_plane_machine("cp-1", true, vec![address("10.0.0.5", true)]);
        other
            .metadata
            .labels
            .as_mut()
            .unwrap()
            .insert(crds::cluster::CLUSTER_NAME_LABEL.to_string(), "other".to_string());
        assert!(select_control_plane_endpoint(&[other], "demo").is_none());
    }

    #[test]
    fn selection_is_order_independent() {
        let a = control_plane_machine("a-cp", true, vec![address("10.0.0.1", true)]);
        let b = control_plane_machine("b-cp", true, vec![address("10.0.0.2", true)]);
        let forward = select_control_plane_endpoint(&[a.clone(), b.clone()], "demo");
        let reversed = select_control_plane_endpoint(&[b, a], "demo");
        assert_eq!(forward, reversed);
    }
}
