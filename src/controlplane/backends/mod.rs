//! Storage Controller Adapters
//!
//! Provides adapters for SAN storage controllers:
//! - Generic: controllers exposing the common management REST API

pub mod generic;

pub use generic::*;

use crate::config::Config;
use crate::domain::ports::StorageControllerRef;
use crate::error::Result;
use tracing::warn;

type ControllerBuilder = fn(&Config) -> Result<StorageControllerRef>;

/// Vendor key to adapter constructor
const VENDORS: &[(&str, ControllerBuilder)] = &[("generic", build_generic)];

/// Vendor used when the configured one is unknown
const FALLBACK_VENDOR: &str = "generic";

fn build_generic(config: &Config) -> Result<StorageControllerRef> {
    Ok(Box::new(GenericRestController::new(GenericRestConfig::from(
        config,
    ))))
}

/// Factory for creating storage controller adapters
pub struct ControllerFactory;

impl ControllerFactory {
    /// Create a controller adapter by vendor key (case-insensitive)
    ///
    /// Unknown vendors get the generic REST adapter.
    pub fn create(vendor_type: &str, config: &Config) -> Result<StorageControllerRef> {
        let key = vendor_type.to_lowercase();
        let builder = match Self::lookup(&key) {
            Some(builder) => builder,
            None => {
                warn!(
                    "Unknown vendor type '{}', falling back to {}",
                    vendor_type, FALLBACK_VENDOR
                );
                Self::lookup(FALLBACK_VENDOR).unwrap_or(build_generic)
            }
        };
        builder(config)
    }

    /// Registered vendor keys
    pub fn vendors() -> Vec<&'static str> {
        VENDORS.iter().map(|(name, _)| *name).collect()
    }

    fn lookup(key: &str) -> Option<ControllerBuilder> {
        VENDORS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, builder)| *builder)
    }
}
