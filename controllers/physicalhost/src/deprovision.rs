//! Best-effort BMC teardown shared by the deletion path and the
//! `Deprovisioning` state ("Deprovision sequence").

use bmc::bmc_trait::BmcClient;
use bmc::models::{PowerAction, PowerState};
use tracing::{debug, warn};

/// Eject virtual media and power off only if the host was previously on
/// ("power off if previously on"). `known_power_state` is the reconciler's
/// last-observed `status.power_state`; when it is `None` or `Unknown` the
/// current state is read fresh from the BMC before deciding. Every step is
/// attempted even if an earlier one fails, since finalizer removal must
/// never wedge on an unreachable BMC ("Each step is best-effort on delete").
pub async fn release_bmc_resources(
    host_name: &str,
    bmc: &dyn BmcClient,
    known_power_state: Option<PowerState>,
) {
    if let Err(err) = bmc.eject_virtual_media().await {
        warn!(host = host_name, error = %err, "failed to eject virtual media during deprovision");
    }

    let power_state = match known_power_state {
        Some(state) if state != PowerState::Unknown => state,
        _ => match bmc.get_system_info().await {
            Ok(info) => info.power_state,
            Err(err) => {
                warn!(host = host_name, error = %err, "failed to read power state during deprovision, forcing off anyway");
                PowerState::Unknown
            }
        },
    };

    if power_state == PowerState::Off {
        debug!(host = host_name, "host already off, skipping force-off during deprovision");
        return;
    }

    if let Err(err) = bmc.set_power_state(PowerAction::ForceOff).await {
        warn!(host = host_name, error = %err, "failed to power off host during deprovision");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmc::mock::MockBmcClient;
    use bmc::models::SystemInfo;

    #[tokio::test]
    async fn skips_force_off_when_known_power_state_is_already_off() {
        let mock = MockBmcClient::new(
            "https://bmc.example",
            SystemInfo {
                power_state: PowerState::On,
                ..Default::default()
            },
        );
        release_bmc_resources("host-1", &mock, Some(PowerState::Off)).await;
        assert!(mock.power_set_calls().is_empty());
    }

    #[tokio::test]
    async fn forces_off_when_known_power_state_is_on() {
        let mock = MockBmcClient::new(
            "https://bmc.example",
            SystemInfo {
                power_state: PowerState::On,
                ..Default::default()
            },
        );
        release_bmc_resources("host-1", &mock, Some(PowerState::On)).await;
        assert_eq!(mock.power_set_calls(), vec![PowerAction::ForceOff]);
    }

    #[tokio::test]
    async fn falls_back_to_live_query_when_power_state_unknown() {
        let mock = MockBmcClient::new(
            "https://bmc.example",
            SystemInfo {
                power_state: PowerState::Off,
                ..Default::default()
            },
        );
        release_bmc_resources("host-1", &mock, None).await;
        assert!(mock.power_set_calls().is_empty());
    }
}
