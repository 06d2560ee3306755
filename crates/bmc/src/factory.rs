//! Pluggable factory for constructing `BmcClient`s ("Pluggable
//! factory for test doubles").

use crate::bmc_trait::BmcClient;
use crate::client::RedfishBmcClient;
use crate::error::BmcError;
use std::sync::Arc;

/// Connection parameters resolved from a `PhysicalHost`'s spec and its
/// credentials Secret.
pub struct BmcConnectionParams<'a> {
    pub address: &'a str,
    pub system_id: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub insecure_skip_tls_verify: bool,
}

/// Constructs a `BmcClient` for a given host. Reconcilers depend on this
/// trait rather than `RedfishBmcClient` directly so tests can substitute a
/// factory that returns `MockBmcClient`.
pub trait BmcClientFactory: Send + Sync {
    /// Build and connect a client. Errors map to `HostPhase::Error` with
    /// reason `ConnectionFailed`.
    fn connect(&self, params: BmcConnectionParams<'_>) -> Result<Arc<dyn BmcClient>, BmcError>;
}

/// Production factory: builds a `RedfishBmcClient` per call.
pub struct RedfishBmcClientFactory;

impl BmcClientFactory for RedfishBmcClientFactory {
    fn connect(&self, params: BmcConnectionParams<'_>) -> Result<Arc<dyn BmcClient>, BmcError> {
        let client = RedfishBmcClient::new(
            params.address.to_string(),
            params.system_id.to_string(),
            params.username,
            params.password,
            params.insecure_skip_tls_verify,
        )?;
        Ok(Arc::new(client))
    }
}
