//! Host Agents
//!
//! Provides host agents for the machines that consume SAN volumes:
//! - Linux: SSH transport with standard block-device tooling

pub mod linux;
pub mod shell;

pub use linux::*;
pub use shell::*;

use crate::config::Config;
use crate::domain::ports::HostAgentRef;
use crate::error::Result;
use tracing::warn;

type HostBuilder = fn(&Config) -> Result<HostAgentRef>;

/// Host key to agent constructor
const HOSTS: &[(&str, HostBuilder)] = &[("linux", build_linux)];

const FALLBACK_HOST: &str = "linux";

fn build_linux(config: &Config) -> Result<HostAgentRef> {
    Ok(Box::new(LinuxHost::over_ssh(config)))
}

/// Factory for creating host agents
pub struct HostFactory;

impl HostFactory {
    /// Create a host agent by host key (case-insensitive)
    ///
    /// Unknown keys get the Linux agent.
    pub fn create(host_type: &str, config: &Config) -> Result<HostAgentRef> {
        let key = host_type.to_lowercase();
        let builder = match Self::lookup(&key) {
            Some(builder) => builder,
            None => {
                warn!(
                    "Unknown host type '{}', falling back to {}",
                    host_type, FALLBACK_HOST
                );
                Self::lookup(FALLBACK_HOST).unwrap_or(build_linux)
            }
        };
        builder(config)
    }

    /// Registered host keys
    pub fn hosts() -> Vec<&'static str> {
        HOSTS.iter().map(|(name, _)| *name).collect()
    }

    fn lookup(key: &str) -> Option<HostBuilder> {
        HOSTS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, builder)| *builder)
    }
}
