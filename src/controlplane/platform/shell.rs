//! Remote Shell Transport
//!
//! Runs commands on the managed host through the system OpenSSH client.
//! Password logins go through `sshpass`, which reads the password from the
//! `SSHPASS` environment variable rather than the command line.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::retry::with_timeout;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// ssh exits with this status when the connection itself failed, but so
/// may the remote command
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Diagnostics ssh itself prints when it never ran the remote command
static SSH_DIAGNOSTIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^(ssh: |kex_exchange_identification: |Connection (closed|reset) by |Connection timed out during banner|Host key verification failed|.*Permission denied \()",
    )
    .expect("static pattern compiles")
});

// =============================================================================
// Command Output
// =============================================================================

/// Captured result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// =============================================================================
// Remote Shell Port
// =============================================================================

/// Executes shell commands on a remote host
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run `command` through the remote shell, bounded by `timeout`
    ///
    /// A non-zero exit is reported in [`CommandOutput`]; only transport
    /// failures are errors.
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput>;

    /// `user@host` style description for logs
    fn target(&self) -> String;
}

// =============================================================================
// SSH Shell
// =============================================================================

/// Connection settings for [`SshShell`]
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// When set, logins use `sshpass`; otherwise key-based auth in batch mode
    pub password: Option<String>,
    pub connect_timeout: Duration,
}

impl From<&Config> for SshConfig {
    fn from(config: &Config) -> Self {
        Self {
            host: config.host_ip.clone(),
            port: config.ssh_port,
            username: config.host_username.clone(),
            password: Some(config.host_password.clone()).filter(|p| !p.is_empty()),
            connect_timeout: config.command_timeout(),
        }
    }
}

/// [`RemoteShell`] backed by the `ssh` binary
pub struct SshShell {
    config: SshConfig,
}

impl SshShell {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Build the local process that runs `remote` on the host
    fn command(&self, remote: &str) -> Command {
        let mut cmd = match &self.config.password {
            Some(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg("ssh").env("SSHPASS", password);
                cmd
            }
            None => {
                let mut cmd = Command::new("ssh");
                cmd.args(["-o", "BatchMode=yes"]);
                cmd
            }
        };

        cmd.arg("-p")
            .arg(self.config.port.to_string())
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.config.connect_timeout.as_secs().max(1)
            ))
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .arg(self.target())
            .arg("--")
            .arg(remote)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        debug!("[{}] $ {}", self.target(), command);
        let mut child = self.command(command);

        let output = with_timeout(timeout, command, async {
            child.output().await.map_err(Error::from)
        })
        .await?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        match transport_failure(&result) {
            Some(Transport::Rejected) => Err(Error::Authentication {
                target: self.target(),
            }),
            Some(Transport::Unreachable) => {
                Err(Error::connection(self.target(), &result.stderr))
            }
            None => Ok(result),
        }
    }

    fn target(&self) -> String {
        format!("{}@{}", self.config.username, self.config.host)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Rejected,
    Unreachable,
}

/// Whether the ssh client failed before the remote command ran
///
/// A remote command exiting 255 on its own is a normal result.
fn transport_failure(output: &CommandOutput) -> Option<Transport> {
    if output.exit_code != SSH_CONNECTION_FAILURE {
        return None;
    }
    let diagnostic = SSH_DIAGNOSTIC.find(&output.stderr)?;
    if diagnostic.as_str().contains("Permission denied") {
        Some(Transport::Rejected)
    } else {
        Some(Transport::Unreachable)
    }
}

/// Quote a value for safe interpolation into a POSIX shell command
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:=@,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
