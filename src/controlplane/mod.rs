//! Provisioning Control Plane
//!
//! Drives a SAN provisioning run: storage controller adapters on one side,
//! host agents on the other, and the orchestrator sequencing the phases.

pub mod orchestrator;
pub mod backends;
pub mod platform;

pub use orchestrator::*;
pub use backends::*;
pub use platform::*;
