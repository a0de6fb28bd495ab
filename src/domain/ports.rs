//! Domain Ports - Collaborator trait definitions for the provisioner
//!
//! These traits define the boundaries between the orchestration core and the
//! two remote systems it drives. Adapters implement these traits to provide
//! concrete functionality for a given vendor or host operating system.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// =============================================================================
// Provisioning Parameters
// =============================================================================

/// RAID levels accepted by storage controllers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RaidLevel {
    Raid0,
    Raid1,
    Raid5,
    Raid6,
    Raid10,
}

impl RaidLevel {
    /// All supported levels, in ascending order
    pub const ALL: [RaidLevel; 5] = [
        RaidLevel::Raid0,
        RaidLevel::Raid1,
        RaidLevel::Raid5,
        RaidLevel::Raid6,
        RaidLevel::Raid10,
    ];

    /// Level as the bare number controllers expect ("0", "5", "10", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            RaidLevel::Raid0 => "0",
            RaidLevel::Raid1 => "1",
            RaidLevel::Raid5 => "5",
            RaidLevel::Raid6 => "6",
            RaidLevel::Raid10 => "10",
        }
    }
}

impl std::fmt::Display for RaidLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RaidLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RaidLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s.trim())
            .ok_or_else(|| Error::Validation {
                field: "raid_level".into(),
                reason: format!("'{}' is not one of 0, 1, 5, 6, 10", s),
            })
    }
}

impl TryFrom<String> for RaidLevel {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RaidLevel> for String {
    fn from(level: RaidLevel) -> Self {
        level.as_str().to_string()
    }
}

/// Transport used to present the volume to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Iscsi,
    Fc,
    Nfs,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Iscsi => write!(f, "iscsi"),
            Protocol::Fc => write!(f, "fc"),
            Protocol::Nfs => write!(f, "nfs"),
        }
    }
}

/// Filesystems the host agents know how to create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemType {
    #[default]
    Ext4,
    Xfs,
    Btrfs,
}

impl std::fmt::Display for FilesystemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilesystemType::Ext4 => write!(f, "ext4"),
            FilesystemType::Xfs => write!(f, "xfs"),
            FilesystemType::Btrfs => write!(f, "btrfs"),
        }
    }
}

impl FromStr for FilesystemType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ext4" => Ok(FilesystemType::Ext4),
            "xfs" => Ok(FilesystemType::Xfs),
            "btrfs" => Ok(FilesystemType::Btrfs),
            other => Err(Error::Validation {
                field: "filesystem".into(),
                reason: format!("unsupported filesystem '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Controller Types
// =============================================================================

/// A physical disk as reported by the storage controller
///
/// Only `id` is interpreted; anything else the controller sends is kept
/// verbatim in `attributes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disk {
    pub id: String,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Disk {
    /// Create a disk with no extra attributes
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: serde_json::Map::new(),
        }
    }
}

// =============================================================================
// Host Types
// =============================================================================

/// Outcome of a host-side performance test
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfTestResult {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
}

impl PerfTestResult {
    /// A failed result carrying only an error message
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.into(),
        }
    }
}

// =============================================================================
// Storage Controller Port
// =============================================================================

/// Port for SAN storage controller operations
///
/// `Ok(false)` / `Ok(None)` report a refused or empty result; `Err` reports
/// that the call itself failed. The orchestrator treats both as phase failure.
#[async_trait]
pub trait StorageController: Send {
    /// Open a management session with the controller
    async fn connect(&mut self) -> Result<bool>;

    /// Close the management session
    async fn disconnect(&mut self) -> Result<bool>;

    /// List disks available for array creation
    async fn list_disks(&mut self) -> Result<Vec<Disk>>;

    /// Create a RAID array, returning its handle
    async fn create_raid(&mut self, disk_ids: &[String], level: RaidLevel)
        -> Result<Option<String>>;

    /// Carve a volume from an array, returning its handle
    async fn create_volume(
        &mut self,
        array_id: &str,
        name: &str,
        size_gb: u64,
    ) -> Result<Option<String>>;

    /// Make a volume visible to a host
    async fn map_volume(&mut self, volume_id: &str, host_identifier: &str) -> Result<bool>;

    /// Adapter name for logging
    fn vendor_name(&self) -> &str;
}

// =============================================================================
// Host Agent Port
// =============================================================================

/// Port for host-side storage operations
#[async_trait]
pub trait HostAgent: Send {
    /// Open a shell session with the host
    async fn connect(&mut self) -> Result<bool>;

    /// Close the shell session
    async fn disconnect(&mut self) -> Result<bool>;

    /// Ask the host to rescan its storage buses
    async fn rescan_storage(&mut self) -> Result<bool>;

    /// Find the block device that appeared after mapping
    async fn detect_new_device(&mut self) -> Result<Option<String>>;

    /// Create a filesystem on a device
    async fn format_device(&mut self, device: &str, filesystem: FilesystemType) -> Result<bool>;

    /// Mount a device, creating the mount point if needed
    async fn mount_device(&mut self, device: &str, mount_point: &str) -> Result<bool>;

    /// Run an I/O benchmark against a mounted path
    async fn run_performance_test(
        &mut self,
        mount_point: &str,
        duration_secs: u64,
    ) -> Result<PerfTestResult>;

    /// Adapter name for logging
    fn host_kind(&self) -> &str;
}

// =============================================================================
// Type Aliases for Boxed Traits
// =============================================================================

pub type StorageControllerRef = Box<dyn StorageController>;
pub type HostAgentRef = Box<dyn HostAgent>;
