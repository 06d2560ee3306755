//! HTTP receiver that turns firmware inspection reports into `PhysicalHost`
//! status updates, closing the loop the `PhysicalHost` reconciler opens when
//! it boots a host into its inspection image.

pub mod error;
pub mod handlers;
pub mod payload;
pub mod router;

pub use error::SinkError;
pub use payload::InspectionReportPayload;
pub use router::router;
