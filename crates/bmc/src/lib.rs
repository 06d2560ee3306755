//! Redfish BMC client abstraction and vendor-aware boot parameter policy.
//!
//! This crate has no knowledge of Kubernetes; reconcilers hold a
//! `BmcClientFactory` and a `dyn BmcClient` per reconcile, always closing the
//! latter before returning ("Close must be guaranteed on all
//! exit paths").

pub mod address;
pub mod bmc_trait;
pub mod boot_params;
pub mod client;
pub mod error;
pub mod factory;
pub mod mock;
pub mod models;
pub mod vendor;

pub use bmc_trait::BmcClient;
pub use boot_params::apply_boot_parameters;
pub use client::RedfishBmcClient;
pub use error::BmcError;
pub use factory::{BmcClientFactory, BmcConnectionParams, RedfishBmcClientFactory};
pub use mock::MockBmcClient;
