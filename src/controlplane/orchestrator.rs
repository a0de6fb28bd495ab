//! Automation Orchestrator
//!
//! Sequences one provisioning run across the storage controller and the host:
//! - Connect to both systems
//! - Create RAID array, carve a volume and map it to the host
//! - Rescan, detect, format and mount the new device on the host
//! - Run a performance test against the mounted path
//!
//! Each phase stops at its first failing step and reports `false`; errors
//! never escape a phase method. Flags in [`OperationStatus`] are only ever set,
//! in phase order, and never reset during a run.

use crate::config::Config;
use crate::domain::ports::{FilesystemType, HostAgentRef, RaidLevel, StorageControllerRef};
use crate::error::{Error, Result};
use chrono::Local;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Default wait between RAID creation and volume creation
///
/// The controller is never polled for array readiness; slow arrays may need
/// a longer value.
pub const DEFAULT_RAID_SETTLE: Duration = Duration::from_secs(30);

/// Number of disks handed to `create_raid`
pub const DISKS_PER_ARRAY: usize = 3;

// =============================================================================
// Phases
// =============================================================================

/// Orchestration phases, in the only order they may complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    SanConnection,
    HostConnection,
    RaidCreated,
    VolumeCreated,
    VolumeMapped,
    VolumeMounted,
    TestCompleted,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::SanConnection,
        Phase::HostConnection,
        Phase::RaidCreated,
        Phase::VolumeCreated,
        Phase::VolumeMapped,
        Phase::VolumeMounted,
        Phase::TestCompleted,
    ];

    /// Key used in status reports
    pub fn key(&self) -> &'static str {
        match self {
            Phase::SanConnection => "san_connection",
            Phase::HostConnection => "host_connection",
            Phase::RaidCreated => "raid_created",
            Phase::VolumeCreated => "volume_created",
            Phase::VolumeMapped => "volume_mapped",
            Phase::VolumeMounted => "volume_mounted",
            Phase::TestCompleted => "test_completed",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

// =============================================================================
// Operation Status
// =============================================================================

/// Completion flag per phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationStatus {
    flags: [bool; 7],
}

impl OperationStatus {
    pub fn is_complete(&self, phase: Phase) -> bool {
        self.flags[phase.index()]
    }

    /// True iff every phase completed
    pub fn all_complete(&self) -> bool {
        self.flags.iter().all(|&done| done)
    }

    /// Phases with their flags, in phase order
    pub fn iter(&self) -> impl Iterator<Item = (Phase, bool)> + '_ {
        Phase::ALL.iter().map(move |&p| (p, self.is_complete(p)))
    }

    /// Number of leading phases that completed
    pub fn completed_prefix(&self) -> usize {
        self.flags.iter().take_while(|&&done| done).count()
    }

    fn mark(&mut self, phase: Phase) {
        debug!("Phase {} complete", phase);
        self.flags[phase.index()] = true;
    }

    fn to_map(self) -> IndexMap<String, bool> {
        self.iter().map(|(p, done)| (p.key().to_string(), done)).collect()
    }
}

// =============================================================================
// Status Report
// =============================================================================

/// Point-in-time snapshot of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Local time the snapshot was taken, `%Y-%m-%d %H:%M:%S`
    pub timestamp: String,
    /// Phase key to completion flag, in phase order
    pub operations: IndexMap<String, bool>,
    /// True iff every phase completed
    pub success: bool,
}

impl StatusReport {
    fn capture(status: OperationStatus) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            operations: status.to_map(),
            success: status.all_complete(),
        }
    }
}

// =============================================================================
// Orchestrator Configuration
// =============================================================================

/// Provisioning parameters the orchestrator reads during a run
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub raid_level: RaidLevel,
    pub volume_name: String,
    pub volume_size_gb: u64,
    pub filesystem: FilesystemType,
    pub mount_point: String,
    /// How the controller identifies the host when mapping
    pub host_identifier: String,
    pub test_duration_secs: u64,
    /// Blocking wait after RAID creation
    pub raid_settle: Duration,
    /// Upper bound on disks passed to `create_raid`
    pub disks_per_array: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            raid_level: config.raid_level,
            volume_name: config.volume_name.clone(),
            volume_size_gb: config.volume_size_gb,
            filesystem: config.filesystem,
            mount_point: config.mount_point.clone(),
            host_identifier: config.host_ip.clone(),
            test_duration_secs: config.test_duration,
            raid_settle: config.raid_settle(),
            disks_per_array: DISKS_PER_ARRAY,
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives one provisioning run over an exclusively owned controller and host
///
/// Phase methods are meant to be called in declaration order. Ordering is the
/// caller's responsibility; [`AutomationOrchestrator::run`] does it for you.
pub struct AutomationOrchestrator {
    controller: StorageControllerRef,
    host: HostAgentRef,
    config: OrchestratorConfig,
    status: OperationStatus,
    span: Span,
}

impl AutomationOrchestrator {
    /// Create an orchestrator; neither collaborator is contacted yet
    pub fn new(
        controller: StorageControllerRef,
        host: HostAgentRef,
        config: OrchestratorConfig,
    ) -> Self {
        let span = info_span!(
            "provisioning",
            run_id = %Uuid::new_v4(),
            vendor = controller.vendor_name(),
            host = host.host_kind()
        );

        Self {
            controller,
            host,
            config,
            status: OperationStatus::default(),
            span,
        }
    }

    /// Log every phase under `span` instead of the default run span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn status(&self) -> &OperationStatus {
        &self.status
    }

    /// Connect to the storage controller, then the host
    pub async fn initialize_connections(&mut self) -> bool {
        let span = self.span.clone();
        let result = self.connect_all().instrument(span.clone()).await;
        span.in_scope(|| settle("Connection initialization", result))
    }

    /// Create the RAID array and volume, then map the volume to the host
    pub async fn create_storage_infrastructure(&mut self) -> bool {
        let span = self.span.clone();
        let result = self.build_storage().instrument(span.clone()).await;
        span.in_scope(|| settle("Storage infrastructure creation", result))
    }

    /// Bring the mapped volume up on the host and mount it
    pub async fn configure_host_storage(&mut self) -> bool {
        let span = self.span.clone();
        let result = self.prepare_host().instrument(span.clone()).await;
        span.in_scope(|| settle("Host storage configuration", result))
    }

    /// Benchmark the mounted volume
    pub async fn run_performance_test(&mut self) -> bool {
        let span = self.span.clone();
        let result = self.benchmark().instrument(span.clone()).await;
        span.in_scope(|| settle("Performance test", result))
    }

    /// Disconnect from both systems
    ///
    /// Both disconnects are always attempted. Returns true only if both
    /// succeeded.
    pub async fn cleanup(&mut self) -> bool {
        let span = self.span.clone();
        async {
            info!("Cleaning up resources...");

            let san_ok = match self.controller.disconnect().await {
                Ok(true) => true,
                Ok(false) => {
                    warn!("Failed to disconnect from storage controller");
                    false
                }
                Err(e) => {
                    warn!("Failed to disconnect from storage controller: {}", e);
                    false
                }
            };

            let host_ok = match self.host.disconnect().await {
                Ok(true) => true,
                Ok(false) => {
                    warn!("Failed to disconnect from host");
                    false
                }
                Err(e) => {
                    warn!("Failed to disconnect from host: {}", e);
                    false
                }
            };

            san_ok && host_ok
        }
        .instrument(span)
        .await
    }

    /// Snapshot of phase flags; safe to call at any point in a run
    pub fn get_status_report(&self) -> StatusReport {
        StatusReport::capture(self.status)
    }

    /// Run every phase in order, stopping at the first failure
    ///
    /// `cleanup` runs on every path. The returned report reflects how far the
    /// run got.
    pub async fn run(&mut self) -> StatusReport {
        if self.initialize_connections().await
            && self.create_storage_infrastructure().await
            && self.configure_host_storage().await
        {
            self.run_performance_test().await;
        }

        let report = self.get_status_report();

        if !self.cleanup().await {
            self.span
                .in_scope(|| warn!("Cleanup did not complete cleanly"));
        }

        report
    }

    // =========================================================================
    // Phase bodies
    // =========================================================================

    async fn connect_all(&mut self) -> Result<()> {
        info!("Initializing connections...");

        if !self.controller.connect().await? {
            return Err(Error::connection(
                self.controller.vendor_name(),
                "storage controller refused the connection",
            ));
        }
        self.status.mark(Phase::SanConnection);
        info!("SAN connection established");

        if !self.host.connect().await? {
            return Err(Error::connection(
                self.config.host_identifier.as_str(),
                "host refused the connection",
            ));
        }
        self.status.mark(Phase::HostConnection);
        info!("Host connection established");

        Ok(())
    }

    async fn build_storage(&mut self) -> Result<()> {
        info!("Creating storage infrastructure...");

        let disks = self.controller.list_disks().await?;
        if disks.is_empty() {
            return Err(Error::Precondition("No disks available".into()));
        }

        let disk_ids: Vec<String> = disks
            .iter()
            .take(self.config.disks_per_array)
            .map(|d| d.id.clone())
            .collect();
        info!(
            "Selected disks for RAID {}: {:?}",
            self.config.raid_level, disk_ids
        );

        let array_id = present(
            self.controller
                .create_raid(&disk_ids, self.config.raid_level)
                .await?,
        )
        .ok_or_else(|| Error::operation("create_raid", "controller returned no array id"))?;
        self.status.mark(Phase::RaidCreated);
        info!("Created RAID array {}", array_id);

        info!(
            "Waiting {:?} for RAID initialization...",
            self.config.raid_settle
        );
        tokio::time::sleep(self.config.raid_settle).await;

        let volume_id = present(
            self.controller
                .create_volume(
                    &array_id,
                    &self.config.volume_name,
                    self.config.volume_size_gb,
                )
                .await?,
        )
        .ok_or_else(|| Error::operation("create_volume", "controller returned no volume id"))?;
        self.status.mark(Phase::VolumeCreated);
        info!(
            "Created volume {} ({} GB) on array {}",
            volume_id, self.config.volume_size_gb, array_id
        );

        if !self
            .controller
            .map_volume(&volume_id, &self.config.host_identifier)
            .await?
        {
            return Err(Error::operation(
                "map_volume",
                format!(
                    "controller refused to map {} to {}",
                    volume_id, self.config.host_identifier
                ),
            ));
        }
        self.status.mark(Phase::VolumeMapped);
        info!("Volume mapped to host successfully");

        Ok(())
    }

    async fn prepare_host(&mut self) -> Result<()> {
        info!("Configuring host storage...");

        if !self.host.rescan_storage().await? {
            return Err(Error::operation("rescan_storage", "host rescan failed"));
        }

        let device = present(self.host.detect_new_device().await?)
            .ok_or_else(|| Error::Precondition("No new storage device detected".into()))?;
        info!("Detected new device: {}", device);

        if !self
            .host
            .format_device(&device, self.config.filesystem)
            .await?
        {
            return Err(Error::operation(
                "format_device",
                format!("could not create {} on {}", self.config.filesystem, device),
            ));
        }

        if !self
            .host
            .mount_device(&device, &self.config.mount_point)
            .await?
        {
            return Err(Error::operation(
                "mount_device",
                format!("could not mount {} at {}", device, self.config.mount_point),
            ));
        }
        self.status.mark(Phase::VolumeMounted);
        info!("Mounted {} at {}", device, self.config.mount_point);

        Ok(())
    }

    async fn benchmark(&mut self) -> Result<()> {
        info!("Running performance test...");

        let result = self
            .host
            .run_performance_test(&self.config.mount_point, self.config.test_duration_secs)
            .await?;

        if !result.success {
            let reason = if result.error.is_empty() {
                "test reported failure".to_string()
            } else {
                result.error
            };
            return Err(Error::operation("run_performance_test", reason));
        }
        self.status.mark(Phase::TestCompleted);
        info!("Performance test completed successfully");
        debug!("Performance test output: {}", result.output);

        Ok(())
    }
}

/// Treat an empty handle the same as no handle
fn present(handle: Option<String>) -> Option<String> {
    handle.filter(|h| !h.is_empty())
}

/// Log a phase failure and collapse the outcome to a flag
fn settle(phase: &str, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!(kind = ?e.kind(), "{} failed: {}", phase, e);
            false
        }
    }
}
