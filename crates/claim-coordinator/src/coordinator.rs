//! Atomic claim/release of a `PhysicalHost` on behalf of a `Beskar7Machine`.

use crate::backoff::{conflict_backoff, MAX_ATTEMPTS_PER_CANDIDATE};
use crate::error::ClaimError;
use crate::selection::{
    deterministic_start_index, hardware_ready_for, round_robin_order, select_candidates,
};
use chrono::Utc;
use crds::physical_host::{HardwareRequirements, HostPhase, PhysicalHost, PhysicalHostStatus};
use crds::references::ConsumerRef;
use kube::api::{Api, ListParams, Patch, PatchParams};
use serde_json::json;
use tracing::{debug, info, warn};

/// Coordinates claims against the `PhysicalHost`s of one namespace.
pub struct ClaimCoordinator {
    hosts: Api<PhysicalHost>,
}

impl ClaimCoordinator {
    /// Build a coordinator scoped to `namespace`.
    #[must_use]
    pub fn new(client: kube::Client, namespace: &str) -> Self {
        Self {
            hosts: Api::namespaced(client, namespace),
        }
    }

    /// Claim a host for `consumer`, or return `ClaimError::NoHostAvailable`
    /// if none currently qualify.
    ///
    /// Callers are expected to have already checked whether `consumer`
    /// already holds a host (step 1 of the algorithm) before calling this —
    /// that check requires the machine's own status, which this crate does
    /// not have visibility into.
    pub async fn claim(
        &self,
        consumer: &ConsumerRef,
        requirements: &HardwareRequirements,
        boot_image_url: Option<&str>,
    ) -> Result<PhysicalHost, ClaimError> {
        let hosts = self.hosts.list(&ListParams::default()).await?;
        let candidates = select_candidates(&hosts.items, requirements);
        if candidates.is_empty() {
            return Err(ClaimError::NoHostAvailable);
        }

        let today = Utc::now().date_naive();
        let start = deterministic_start_index(
            &consumer.namespace,
            &consumer.name,
            today,
            candidates.len(),
        )
        .expect("candidates is non-empty");

        for index in round_robin_order(start, candidates.len()) {
            let name = candidates[index]
                .metadata
                .name
                .clone()
                .expect("listed host always has a name");

            match self
                .try_claim_one(&name, consumer, requirements, boot_image_url)
                .await
            {
                Ok(Some(claimed)) => return Ok(claimed),
                Ok(None) => continue,
                Err(err) => return Err(err),
            }
        }

        Err(ClaimError::NoHostAvailable)
    }

    /// Attempt the atomic claim sequence against a single named candidate.
    /// Returns `Ok(None)` when the candidate was reclaimed by someone else or
    /// exhausted its retry budget, so the caller moves to the next candidate.
    async fn try_claim_one(
        &self,
        name: &str,
        consumer: &ConsumerRef,
        requirements: &HardwareRequirements,
        boot_image_url: Option<&str>,
    ) -> Result<Option<PhysicalHost>, ClaimError> {
        for attempt in 1..=MAX_ATTEMPTS_PER_CANDIDATE {
            let current = self.hosts.get(name).await?;

            if !is_still_available(&current, requirements) {
                debug!(host = name, "candidate no longer available, skipping");
                return Ok(None);
            }

            let now = Utc::now();
            let patch = json!({
                "spec": {
                    "consumerRef": {
                        "apiVersion": consumer.api_version,
                        "kind": consumer.kind,
                        "name": consumer.name,
                        "namespace": consumer.namespace,
                        "uid": consumer.uid,
                    },
                    "bootImageUrl": boot_image_url,
                },
                "metadata": {
                    "annotations": {
                        "claimed-at": now.to_rfc3339(),
                        "claimed-by": format!("{}/{}", consumer.namespace, consumer.name),
                    }
                }
            });

            match self
                .hosts
                .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
            {
                Ok(claimed) => {
                    self.mark_claimed_best_effort(name).await;
                    info!(host = name, consumer = %consumer.name, "claimed physical host");
                    return Ok(Some(claimed));
                }
                Err(kube::Error::Api(err)) if err.code == 409 => {
                    warn!(host = name, attempt, "claim conflict, retrying");
                    tokio::time::sleep(conflict_backoff(attempt)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(None)
    }

    /// Best-effort status transition to `Claimed`; failure here does not
    /// undo the spec-level claim (: "best-effort status update").
    async fn mark_claimed_best_effort(&self, name: &str) {
        let patch = json!({ "status": { "state": "Claimed" } });
        if let Err(err) = self
            .hosts
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            warn!(host = name, error = %err, "failed to best-effort mark host Claimed");
        }
    }

    /// Release a host back to the pool if `consumer` is still its owner
    /// ("If ownership does not match, do nothing").
    pub async fn release(&self, host_name: &str, consumer: &ConsumerRef) -> Result<(), ClaimError> {
        let current = self.hosts.get(host_name).await?;
        let Some(existing) = &current.spec.consumer_ref else {
            return Ok(());
        };
        if !existing.matches(&consumer.namespace, &consumer.name) {
            debug!(host = host_name, "release skipped: ownership mismatch");
            return Ok(());
        }

        let now = Utc::now();
        let spec_patch = json!({
            "spec": { "consumerRef": null, "bootImageUrl": null },
            "metadata": { "annotations": { "released-at": now.to_rfc3339() } },
        });
        self.hosts
            .patch(host_name, &PatchParams::default(), &Patch::Merge(&spec_patch))
            .await?;

        let status_patch = json!({ "status": { "state": "Available" } });
        self.hosts
            .patch_status(host_name, &PatchParams::default(), &Patch::Merge(&status_patch))
            .await?;

        info!(host = host_name, "released physical host");
        Ok(())
    }
}

fn is_still_available(host: &PhysicalHost, requirements: &HardwareRequirements) -> bool {
    if host.spec.consumer_ref.is_some() {
        return false;
    }
    let Some(status) = &host.status else {
        return false;
    };
    status.state == HostPhase::Available && status.ready && hardware_ready_for(status, requirements)
}

/// Re-exported for callers that need to branch on the observed status shape
/// without depending on `crds` directly.
pub type HostStatus = PhysicalHostStatus;
