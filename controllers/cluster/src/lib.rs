//! `Beskar7Cluster` reconciler: derives the control-plane endpoint and
//! aggregates failure domains.

pub mod controller;
pub mod endpoint;
pub mod error;
pub mod failure_domains;
pub mod reconciler;

pub use controller::{run, ControllerConfig};
pub use error::ControllerError;
