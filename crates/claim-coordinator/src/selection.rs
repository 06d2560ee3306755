//! Pure candidate-selection logic, isolated from `kube::Api` so it can be
//! exercised without a cluster ( testable properties).

use chrono::NaiveDate;
use crds::physical_host::{
    HardwareRequirements, HostPhase, PhysicalHost, PhysicalHostStatus,
};

/// Filters `hosts` down to those a machine with `requirements` may claim:
/// unclaimed, `Available`, `ready`, and hardware-sufficient.
///
/// Returned in lexicographic order by host name,.
#[must_use]
pub fn select_candidates<'a>(
    hosts: &'a [PhysicalHost],
    requirements: &HardwareRequirements,
) -> Vec<&'a PhysicalHost> {
    let mut candidates: Vec<&PhysicalHost> = hosts
        .iter()
        .filter(|host| {
            let Some(status) = &host.status else {
                return false;
            };
            host.spec.consumer_ref.is_none()
                && status.state == HostPhase::Available
                && status.ready
                && hardware_ready_for(status, requirements)
        })
        .collect();

    candidates.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    candidates
}

pub(crate) fn hardware_ready_for(
    status: &PhysicalHostStatus,
    requirements: &HardwareRequirements,
) -> bool {
    match &status.inspection_report {
        Some(report) => report.satisfies(requirements),
        None => is_requirements_trivial(requirements),
    }
}

fn is_requirements_trivial(requirements: &HardwareRequirements) -> bool {
    requirements.min_cores.is_none()
        && requirements.min_memory_mib.is_none()
        && requirements.min_disk_gib.is_none()
}

/// FNV-1a, 64-bit. Deterministic across processes and Rust versions, unlike
/// `std::collections::hash_map::DefaultHasher` (explicitly documented as
/// unstable across releases), which the claim coordinator cannot use since
/// the starting index must be stable for a machine's retries within a day.
#[must_use]
pub fn fnv1a_hash(input: &str) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET_BASIS;
    for byte in input.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Deterministic starting index into a candidate list of length `candidate_count`,
/// derived from `hash(namespace || name || date) mod candidate_count`.
///
/// Returns `None` when there are no candidates to index into.
#[must_use]
pub fn deterministic_start_index(
    namespace: &str,
    name: &str,
    date: NaiveDate,
    candidate_count: usize,
) -> Option<usize> {
    if candidate_count == 0 {
        return None;
    }
    let key = format!("{namespace}{name}{date}");
    let hash = fnv1a_hash(&key);
    Some((hash % candidate_count as u64) as usize)
}

/// Round-robin order of candidate indices starting at `start`, covering every
/// candidate exactly once.
#[must_use]
pub fn round_robin_order(start: usize, candidate_count: usize) -> Vec<usize> {
    (0..candidate_count).map(|offset| (start + offset) % candidate_count).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crds::physical_host::{HostPhase, PhysicalHostSpec, PhysicalHostStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn host(name: &str, claimed: bool, available: bool, ready: bool) -> PhysicalHost {
        PhysicalHost {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: PhysicalHostSpec {
                bmc: crds::physical_host::BmcDetails {
                    address: "https://bmc".to_string(),
                    credentials_secret_ref: crds::references::SecretReference {
                        name: "creds".to_string(),
                        namespace: None,
                    },
                    insecure_skip_tls_verify: false,
                },
                consumer_ref: if claimed {
                    Some(crds::references::ConsumerRef {
                        api_version: "infrastructure.cluster.x-k8s.io/v1alpha1".to_string(),
                        kind: "Beskar7Machine".to_string(),
                        name: "m".to_string(),
                        namespace: "default".to_string(),
                        uid: "uid".to_string(),
                    })
                } else {
                    None
                },
                boot_image_url: None,
            },
            status: Some(PhysicalHostStatus {
                state: if available {
                    HostPhase::Available
                } else {
                    HostPhase::Enrolling
                },
                ready,
                ..Default::default()
            }),
        }
    }

    #[test]
    fn selects_only_unclaimed_available_ready_hosts() {
        let hosts = vec![
            host("z-host", false, true, true),
            host("a-host", false, true, true),
            host("claimed-host", true, true, true),
            host("not-ready", false, true, false),
            host("not-available", false, false, true),
        ];
        let candidates = select_candidates(&hosts, &HardwareRequirements::default());
        let names: Vec<&str> = candidates
            .iter()
            .map(|h| h.metadata.name.as_deref().unwrap())
            .collect();
        assert_eq!(names, vec!["a-host", "z-host"]);
    }

    #[test]
    fn starting_index_is_stable_for_same_inputs() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let a = deterministic_start_index("default", "machine-1", date, 5);
        let b = deterministic_start_index("default", "machine-1", date, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn starting_index_spreads_across_distinct_machines() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let one = deterministic_start_index("default", "machine-1", date, 1000);
        let two = deterministic_start_index("default", "machine-2", date, 1000);
        assert_ne!(one, two);
    }

    #[test]
    fn round_robin_covers_every_candidate_exactly_once() {
        let order = round_robin_order(3, 5);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
        assert_eq!(order[0], 3);
    }

    #[test]
    fn no_candidates_yields_no_starting_index() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        assert_eq!(deterministic_start_index("default", "m", date, 0), None);
    }
}
