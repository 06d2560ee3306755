//! Atomic `PhysicalHost` claim coordinator.
//!
//! Selection and hashing are pure and unit-tested directly; `ClaimCoordinator`
//! wraps them with the `kube::Api` calls needed for the actual optimistic-
//! concurrency claim loop.

pub mod backoff;
pub mod coordinator;
pub mod error;
pub mod selection;

pub use coordinator::ClaimCoordinator;
pub use error::ClaimError;
