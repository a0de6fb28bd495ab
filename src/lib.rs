//! SAN Provisioner
//!
//! Provisions block storage end to end: builds a RAID array on a SAN
//! controller, carves and maps a volume, brings it up on a host and
//! benchmarks it.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                   Automation Orchestrator                      │
//! │   connect ─► RAID/volume/map ─► rescan/format/mount ─► fio    │
//! ├───────────────────────────────┬───────────────────────────────┤
//! │     Storage Controllers       │         Host Agents           │
//! │  ┌─────────────────────────┐  │  ┌─────────────────────────┐  │
//! │  │   Generic REST (HTTPS)  │  │  │   Linux (SSH + shell)   │  │
//! │  └─────────────────────────┘  │  └─────────────────────────┘  │
//! ├───────────────────────────────┴───────────────────────────────┤
//! │            Configuration (JSON/YAML, schema checks)            │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: Orchestrator, controller adapters and host agents
//! - [`config`]: Configuration loading, validation and persistence
//! - [`domain`]: Collaborator traits and shared types
//! - [`retry`]: Retry and timeout wrappers for remote calls
//! - [`error`]: Error types and handling

pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod retry;

// Re-export commonly used types
pub use controlplane::{
    AutomationOrchestrator, OrchestratorConfig, OperationStatus, Phase, StatusReport,
    ControllerFactory, GenericRestConfig, GenericRestController,
    HostFactory, LinuxHost, LinuxHostConfig, RemoteShell, SshConfig, SshShell,
};

pub use config::{Config, ConfigManager, ConfigOverrides, ConfigSchema};

pub use domain::ports::{
    Disk, FilesystemType, PerfTestResult, Protocol, RaidLevel,
    HostAgent, HostAgentRef, StorageController, StorageControllerRef,
};

pub use error::{Error, ErrorKind, Result};

pub use retry::RetryPolicy;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
