//! Redfish BMC client.
//!
//! Implements the subset of the Redfish `ComputerSystem` and `Manager` schema
//! operations the reconcilers need: system info, power, boot source override,
//! boot options, virtual media, BIOS attributes, and ethernet interfaces.

use crate::bmc_trait::BmcClient;
use crate::error::BmcError;
use crate::models::*;
use base64::Engine;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Concrete Redfish client, talking to one system resource over HTTPS.
pub struct RedfishBmcClient {
    client: Client,
    base_url: String,
    system_id: String,
    auth_header: String,
}

impl RedfishBmcClient {
    /// Create a new client against `base_url` (the Redfish service root,
    /// e.g. `https://10.0.0.5`), authenticating with basic auth.
    ///
    /// `insecure_skip_tls_verify` mirrors the per-host flag in
    /// `PhysicalHost.spec.bmc` ("Default to secure TLS; per-host
    /// flag allows skipping verification").
    pub fn new(
        base_url: String,
        system_id: String,
        username: &str,
        password: &str,
        insecure_skip_tls_verify: bool,
    ) -> Result<Self, BmcError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .danger_accept_invalid_certs(insecure_skip_tls_verify)
            .build()?;

        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{username}:{password}"));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            system_id,
            auth_header: format!("Basic {credentials}"),
        })
    }

    fn systems_url(&self) -> String {
        format!("{}/redfish/v1/Systems/{}", self.base_url, self.system_id)
    }

    async fn get_json(&self, url: &str) -> Result<Value, BmcError> {
        debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await?;
        Self::check_status(&response)?;
        Ok(response.json().await?)
    }

    async fn patch_json(&self, url: &str, body: Value) -> Result<(), BmcError> {
        debug!(%url, "PATCH");
        let response = self
            .client
            .patch(url)
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;
        Self::check_status_owned(response).await
    }

    async fn post_json(&self, url: &str, body: Value) -> Result<(), BmcError> {
        debug!(%url, "POST");
        let response = self
            .client
            .post(url)
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;
        Self::check_status_owned(response).await
    }

    fn check_status(response: &reqwest::Response) -> Result<(), BmcError> {
        let status = response.status();
        if status == 401 || status == 403 {
            return Err(BmcError::Authentication(format!(
                "BMC rejected credentials: {status}"
            )));
        }
        if status == 404 {
            return Err(BmcError::NotFound(format!("{}", response.url())));
        }
        if !status.is_success() {
            return Err(BmcError::Api {
                status: status.as_u16(),
                body: String::new(),
            });
        }
        Ok(())
    }

    async fn check_status_owned(response: reqwest::Response) -> Result<(), BmcError> {
        let status = response.status();
        if status == 401 || status == 403 {
            return Err(BmcError::Authentication(format!(
                "BMC rejected credentials: {status}"
            )));
        }
        if status == 404 {
            return Err(BmcError::NotFound(format!("{}", response.url())));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BmcError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BmcClient for RedfishBmcClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_system_info(&self) -> Result<SystemInfo, BmcError> {
        let body = self.get_json(&self.systems_url()).await?;
        let power_state = match body.get("PowerState").and_then(Value::as_str) {
            Some("On") => PowerState::On,
            Some("Off") => PowerState::Off,
            _ => PowerState::Unknown,
        };
        Ok(SystemInfo {
            manufacturer: body
                .get("Manufacturer")
                .and_then(Value::as_str)
                .map(str::to_string),
            model: body.get("Model").and_then(Value::as_str).map(str::to_string),
            serial_number: body
                .get("SerialNumber")
                .and_then(Value::as_str)
                .map(str::to_string),
            health: body
                .pointer("/Status/Health")
                .and_then(Value::as_str)
                .map(str::to_string),
            power_state,
        })
    }

    async fn get_power_state(&self) -> Result<PowerState, BmcError> {
        Ok(self.get_system_info().await?.power_state)
    }

    async fn set_power_state(&self, action: PowerAction) -> Result<(), BmcError> {
        let reset_type = match action {
            PowerAction::On => "On",
            PowerAction::ForceOff => "ForceOff",
            PowerAction::ForceRestart => "ForceRestart",
        };
        let url = format!(
            "{}/Actions/ComputerSystem.Reset",
            self.systems_url()
        );
        self.post_json(&url, json!({ "ResetType": reset_type })).await
    }

    async fn set_boot_source(&self, source: BootSource) -> Result<(), BmcError> {
        let body = match source {
            BootSource::Pxe => json!({
                "Boot": { "BootSourceOverrideEnabled": "Once", "BootSourceOverrideTarget": "Pxe" }
            }),
            BootSource::CdDvd => json!({
                "Boot": { "BootSourceOverrideEnabled": "Once", "BootSourceOverrideTarget": "Cd" }
            }),
            BootSource::UefiTarget(target) => json!({
                "Boot": {
                    "BootSourceOverrideEnabled": "Once",
                    "BootSourceOverrideTarget": "UefiTarget",
                    "UefiTargetBootSourceOverride": target,
                }
            }),
            BootSource::None => json!({
                "Boot": { "BootSourceOverrideEnabled": "Disabled", "BootSourceOverrideTarget": "None" }
            }),
        };
        self.patch_json(&self.systems_url(), body).await
    }

    async fn list_boot_options(&self) -> Result<Vec<BootOption>, BmcError> {
        let url = format!("{}/BootOptions", self.systems_url());
        let collection = self.get_json(&url).await?;
        let members = collection
            .get("Members")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut options = Vec::with_capacity(members.len());
        for member in members {
            let Some(member_url) = member.get("@odata.id").and_then(Value::as_str) else {
                continue;
            };
            let full_url = format!("{}{}", self.base_url, member_url);
            let detail = self.get_json(&full_url).await?;
            options.push(BootOption {
                id: detail
                    .get("Id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                display_name: detail
                    .get("DisplayName")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        Ok(options)
    }

    async fn insert_virtual_media(&self, image_url: &str) -> Result<(), BmcError> {
        let url = format!(
            "{}/VirtualMedia/Cd/Actions/VirtualMedia.InsertMedia",
            self.systems_url()
        );
        self.post_json(
            &url,
            json!({ "Image": image_url, "Inserted": true, "WriteProtected": true }),
        )
        .await
    }

    async fn eject_virtual_media(&self) -> Result<(), BmcError> {
        let url = format!(
            "{}/VirtualMedia/Cd/Actions/VirtualMedia.EjectMedia",
            self.systems_url()
        );
        self.post_json(&url, json!({})).await
    }

    async fn get_bios_attribute(&self, name: &str) -> Result<Option<String>, BmcError> {
        let url = format!("{}/Bios", self.systems_url());
        let body = self.get_json(&url).await?;
        Ok(body
            .pointer(&format!("/Attributes/{name}"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn set_bios_attribute(
        &self,
        name: &str,
        value: &str,
        apply_time: ApplyTime,
    ) -> Result<(), BmcError> {
        let url = format!("{}/Bios/Settings", self.systems_url());
        let body = match apply_time {
            ApplyTime::Immediate => json!({ "Attributes": { name: value } }),
            ApplyTime::OnReset => json!({
                "Attributes": { name: value },
                "@Redfish.SettingsApplyTime": { "ApplyTime": "OnReset" },
            }),
        };
        self.patch_json(&url, body).await
    }

    async fn list_ethernet_interfaces(&self) -> Result<Vec<EthernetInterface>, BmcError> {
        let url = format!("{}/EthernetInterfaces", self.systems_url());
        let collection = self.get_json(&url).await?;
        let members = collection
            .get("Members")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut interfaces = Vec::with_capacity(members.len());
        for member in &members {
            let Some(member_url) = member.get("@odata.id").and_then(Value::as_str) else {
                continue;
            };
            let full_url = format!("{}{}", self.base_url, member_url);
            let detail = self.get_json(&full_url).await?;
            interfaces.push(parse_ethernet_interface(&detail));
        }

        if interfaces.is_empty() {
            return self.list_network_device_functions().await;
        }
        Ok(interfaces)
    }

    async fn close(&self) -> Result<(), BmcError> {
        Ok(())
    }
}

impl RedfishBmcClient {
    /// Fallback path when `EthernetInterfaces` is empty: some platforms only
    /// populate `NetworkInterfaces/.../NetworkDeviceFunctions`.
    async fn list_network_device_functions(&self) -> Result<Vec<EthernetInterface>, BmcError> {
        let url = format!("{}/NetworkInterfaces", self.systems_url());
        let collection = match self.get_json(&url).await {
            Ok(body) => body,
            Err(BmcError::NotFound(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let members = collection
            .get("Members")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut interfaces = Vec::new();
        for member in &members {
            let Some(member_url) = member.get("@odata.id").and_then(Value::as_str) else {
                continue;
            };
            let functions_url = format!(
                "{}{}/NetworkDeviceFunctions",
                self.base_url, member_url
            );
            let functions = match self.get_json(&functions_url).await {
                Ok(body) => body,
                Err(BmcError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            let function_members = functions
                .get("Members")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for function_member in &function_members {
                let Some(function_url) = function_member.get("@odata.id").and_then(Value::as_str)
                else {
                    continue;
                };
                let full_url = format!("{}{}", self.base_url, function_url);
                let detail = self.get_json(&full_url).await?;
                interfaces.push(parse_ethernet_interface(&detail));
            }
        }
        Ok(interfaces)
    }
}

fn parse_ethernet_interface(detail: &Value) -> EthernetInterface {
    let ipv4_addresses = detail
        .pointer("/IPv4Addresses")
        .and_then(Value::as_array)
        .map(|addrs| {
            addrs
                .iter()
                .filter_map(|a| a.get("Address").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let ipv6_addresses = detail
        .pointer("/IPv6Addresses")
        .and_then(Value::as_array)
        .map(|addrs| {
            addrs
                .iter()
                .filter_map(|a| a.get("Address").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    EthernetInterface {
        id: detail
            .get("Id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        mac_address: detail
            .get("MACAddress")
            .and_then(Value::as_str)
            .map(str::to_string),
        ipv4_addresses,
        ipv6_addresses,
    }
}
