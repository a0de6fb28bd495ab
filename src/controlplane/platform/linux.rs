//! Linux Host Agent
//!
//! Translates host verbs into Linux shell commands: SCSI/FC/iSCSI rescans,
//! `lsblk` device detection, `mkfs`, `mount` and `fio` benchmarks.

use super::shell::{shell_quote, CommandOutput, RemoteShell, SshConfig, SshShell};
use crate::config::Config;
use crate::domain::ports::{FilesystemType, HostAgent, PerfTestResult, Protocol};
use crate::error::{Error, Result};
use crate::retry::{retry, RetryPolicy};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// `mkfs` can take a while on large LUNs
const FORMAT_TIMEOUT: Duration = Duration::from_secs(120);

/// Slack added on top of the fio runtime
const PERF_TEST_GRACE: Duration = Duration::from_secs(60);

const FIO_JOB_FILE: &str = "fio_config.ini";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Linux host agent
#[derive(Debug, Clone)]
pub struct LinuxHostConfig {
    /// Timeout for ordinary commands
    pub command_timeout: Duration,
    /// Retry applied to the connection probe
    pub connect_retry: RetryPolicy,
    /// Storage protocol the volume arrives over
    pub protocol: Protocol,
}

impl Default for LinuxHostConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for LinuxHostConfig {
    fn from(config: &Config) -> Self {
        Self {
            command_timeout: config.command_timeout(),
            connect_retry: RetryPolicy::default(),
            protocol: config.protocol,
        }
    }
}

// =============================================================================
// Linux Host
// =============================================================================

/// Host agent for Linux hosts reached over a [`RemoteShell`]
pub struct LinuxHost<S = SshShell> {
    config: LinuxHostConfig,
    shell: S,
    connected: bool,
}

impl LinuxHost<SshShell> {
    /// Linux host over SSH, configured from the application config
    pub fn over_ssh(config: &Config) -> Self {
        Self::new(
            LinuxHostConfig::from(config),
            SshShell::new(SshConfig::from(config)),
        )
    }
}

impl<S: RemoteShell> LinuxHost<S> {
    pub fn new(config: LinuxHostConfig, shell: S) -> Self {
        Self {
            config,
            shell,
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.exec_with_timeout(command, self.config.command_timeout)
            .await
    }

    async fn exec_with_timeout(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        if !self.connected {
            return Err(Error::connection(self.shell.target(), "not connected to host"));
        }
        let output = self.shell.execute(command, timeout).await?;
        if !output.success() {
            debug!(
                "`{}` exited with {}: {}",
                command, output.exit_code, output.stderr
            );
        }
        Ok(output)
    }

    fn rescan_commands(&self) -> Vec<&'static str> {
        let mut commands = vec![
            "for host in /sys/class/scsi_host/host*/scan; do echo '- - -' > $host; done",
            "for lip in /sys/class/fc_host/host*/issue_lip; do echo 1 > $lip; done",
        ];
        if self.config.protocol == Protocol::Iscsi {
            commands.push("iscsiadm -m session --rescan");
        }
        commands.push("rescan-scsi-bus.sh");
        commands
    }
}

#[async_trait]
impl<S: RemoteShell> HostAgent for LinuxHost<S> {
    #[instrument(skip(self), fields(target = %self.shell.target()))]
    async fn connect(&mut self) -> Result<bool> {
        let probe = retry(self.config.connect_retry, "ssh connect", || {
            self.shell.execute("true", self.config.command_timeout)
        })
        .await?;

        self.connected = probe.success();
        if self.connected {
            info!("Connected to host");
        } else {
            warn!("Host probe exited with {}", probe.exit_code);
        }
        Ok(self.connected)
    }

    async fn disconnect(&mut self) -> Result<bool> {
        self.connected = false;
        Ok(true)
    }

    /// Best effort: individual rescan mechanisms may be absent on a host
    async fn rescan_storage(&mut self) -> Result<bool> {
        if !self.connected {
            return Err(Error::connection(self.shell.target(), "not connected to host"));
        }
        for command in self.rescan_commands() {
            match self.exec(command).await {
                Ok(output) if output.success() => {}
                Ok(_) => debug!("Rescan step skipped: {}", command),
                Err(e) => warn!("Rescan step `{}` failed: {}", command, e),
            }
        }
        Ok(true)
    }

    async fn detect_new_device(&mut self) -> Result<Option<String>> {
        let listing = self
            .exec("lsblk -d -o NAME,SIZE,MODEL,TYPE | grep -E '^(sd|nvme)'")
            .await?;
        if let Some(device) = device_from_lsblk(&listing.stdout) {
            return Ok(Some(device));
        }

        let fallback = self.exec("ls /dev/sd* | grep -E '/dev/sd[b-z]'").await?;
        if fallback.success() {
            if let Some(device) = fallback.stdout.split_whitespace().next() {
                return Ok(Some(device.to_string()));
            }
        }

        Ok(None)
    }

    async fn format_device(&mut self, device: &str, filesystem: FilesystemType) -> Result<bool> {
        let device = shell_quote(device);

        // Ignore failure: the device is usually not mounted
        if let Err(e) = self.exec(&format!("umount {} 2>/dev/null", device)).await {
            debug!("umount {} failed: {}", device, e);
        }

        let output = self
            .exec_with_timeout(&mkfs_command(filesystem, &device), FORMAT_TIMEOUT)
            .await?;
        if !output.success() {
            warn!("mkfs.{} on {} failed: {}", filesystem, device, output.stderr);
        }
        Ok(output.success())
    }

    async fn mount_device(&mut self, device: &str, mount_point: &str) -> Result<bool> {
        let mount_point = shell_quote(mount_point);
        self.exec(&format!("mkdir -p {}", mount_point)).await?;

        let output = self
            .exec(&format!("mount {} {}", shell_quote(device), mount_point))
            .await?;
        if !output.success() {
            warn!("mount {} failed: {}", device, output.stderr);
        }
        Ok(output.success())
    }

    async fn run_performance_test(
        &mut self,
        mount_point: &str,
        duration_secs: u64,
    ) -> Result<PerfTestResult> {
        let job_path = shell_quote(&format!(
            "{}/{}",
            mount_point.trim_end_matches('/'),
            FIO_JOB_FILE
        ));

        let write = self
            .exec(&format!(
                "cat > {} <<'FIO_JOB'\n{}FIO_JOB",
                job_path,
                fio_job(mount_point, duration_secs)
            ))
            .await?;
        if !write.success() {
            return Ok(PerfTestResult::failed(format!(
                "could not write fio job: {}",
                write.stderr
            )));
        }

        info!("Running fio for {}s against {}", duration_secs, mount_point);
        let output = self
            .exec_with_timeout(
                &format!("fio {} --output-format=json", job_path),
                Duration::from_secs(duration_secs).saturating_add(PERF_TEST_GRACE),
            )
            .await?;

        Ok(PerfTestResult {
            success: output.success(),
            output: output.stdout,
            error: output.stderr,
        })
    }

    fn host_kind(&self) -> &str {
        "linux"
    }
}

// =============================================================================
// Command Builders
// =============================================================================

/// First `lsblk` row whose model marks it as a SAN LUN
fn device_from_lsblk(listing: &str) -> Option<String> {
    listing
        .lines()
        .filter(|line| line.contains("LUN") || line.contains("VOLUME"))
        .find_map(|line| line.split_whitespace().next())
        .map(|name| format!("/dev/{}", name))
}

/// Non-interactive mkfs invocation; `device` must already be quoted
fn mkfs_command(filesystem: FilesystemType, device: &str) -> String {
    let force = match filesystem {
        FilesystemType::Ext4 => "-F",
        FilesystemType::Xfs | FilesystemType::Btrfs => "-f",
    };
    format!("mkfs.{} {} {}", filesystem, force, device)
}

/// fio job with a random-read and a random-write section
fn fio_job(mount_point: &str, duration_secs: u64) -> String {
    format!(
        "[global]\n\
         ioengine=libaio\n\
         direct=1\n\
         runtime={duration}\n\
         time_based\n\
         group_reporting\n\
         \n\
         [read_test]\n\
         rw=randread\n\
         bs=4k\n\
         iodepth=32\n\
         size=1G\n\
         directory={dir}\n\
         \n\
         [write_test]\n\
         rw=randwrite\n\
         bs=4k\n\
         iodepth=32\n\
         size=1G\n\
         directory={dir}\n",
        duration = duration_secs,
        dir = mount_point,
    )
}
