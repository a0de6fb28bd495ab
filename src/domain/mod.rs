//! Domain layer - Core port definitions
//!
//! This module defines the collaborator traits (ports) that storage controller
//! and host adapters implement, following hexagonal architecture principles.

pub mod ports;

pub use ports::*;
