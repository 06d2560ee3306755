//! Pure failure-domain extraction from a `PhysicalHost` list, isolated so
//! the commutativity-under-permutation law can be exercised directly.

use crds::cluster::FailureDomain;
use crds::physical_host::PhysicalHost;

/// Collect the unique non-empty values of `topology_label_key` across
/// `hosts`, each marked available for control-plane placement. For zones
/// `{a, b, a, ∅}` this yields `{a:{controlPlane:true}, b:{controlPlane:true}}`.
#[must_use]
pub fn extract_failure_domains(hosts: &[PhysicalHost], topology_label_key: &str) -> Vec<FailureDomain> {
    hosts
        .iter()
        .filter_map(|host| host.metadata.labels.as_ref()?.get(topology_label_key))
        .filter(|zone| !zone.is_empty())
        .map(|zone| FailureDomain {
            name: zone.clone(),
            control_plane: true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn host_with_zone(name: &str, zone: Option<&str>) -> PhysicalHost {
        let labels = zone.map(|z| {
            let mut m = BTreeMap::new();
            m.insert("topology.kubernetes.io/zone".to_string(), z.to_string());
            m
        });
        PhysicalHost {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels,
                ..Default::default()
            },
            spec: crds::physical_host::PhysicalHostSpec {
                bmc: crds::physical_host::BmcDetails {
                    address: "https://bmc".to_string(),
                    credentials_secret_ref: crds::references::SecretReference {
                        name: "creds".to_string(),
                        namespace: None,
                    },
                    insecure_skip_tls_verify: false,
                },
                consumer_ref: None,
                boot_image_url: None,
            },
            status: None,
        }
    }

    #[test]
    fn extracts_unique_non_empty_zones() {
        let hosts = vec![
            host_with_zone("h1", Some("a")),
            host_with_zone("h2", Some("b")),
            host_with_zone("h3", Some("a")),
            host_with_zone("h4", None),
        ];
        let domains = extract_failure_domains(&hosts, "topology.kubernetes.io/zone");
        let aggregated = crds::cluster::aggregate_failure_domains(&domains);
        assert_eq!(aggregated.len(), 2);
        assert!(aggregated["a"].control_plane);
        assert!(aggregated["b"].control_plane);
    }

    #[test]
    fn empty_zone_label_value_is_ignored() {
        let hosts = vec![host_with_zone("h1", Some(""))];
        assert!(extract_failure_domains(&hosts, "topology.kubernetes.io/zone").is_empty());
    }
}
