//! Configuration Module
//!
//! Loads, validates and persists the provisioning configuration. A
//! configuration is validated once when it is loaded; everything downstream
//! trusts it.

pub mod schema;

pub use schema::*;

use crate::domain::ports::{FilesystemType, Protocol, RaidLevel};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// Connection details and provisioning parameters for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Storage controller management address
    pub san_ip: String,
    /// Host address, also used as the mapping identifier
    pub host_ip: String,
    pub san_username: String,
    pub san_password: String,
    pub host_username: String,
    pub host_password: String,
    #[serde(default = "default_raid_level")]
    pub raid_level: RaidLevel,
    #[serde(default = "default_volume_size_gb")]
    pub volume_size_gb: u64,
    #[serde(default = "default_volume_name")]
    pub volume_name: String,
    #[serde(default = "default_mount_point")]
    pub mount_point: String,
    /// Performance test duration in seconds
    #[serde(default = "default_test_duration")]
    pub test_duration: u64,
    /// Storage controller adapter key
    #[serde(default = "default_vendor_type")]
    pub vendor_type: String,
    /// Host agent adapter key
    #[serde(default = "default_host_type")]
    pub host_type: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub filesystem: FilesystemType,
    /// Wait after RAID creation before carving the volume
    #[serde(default = "default_raid_settle_secs")]
    pub raid_settle_secs: u64,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_raid_level() -> RaidLevel {
    RaidLevel::Raid5
}

fn default_volume_size_gb() -> u64 {
    100
}

fn default_volume_name() -> String {
    "test_volume".to_string()
}

fn default_mount_point() -> String {
    "/mnt/san_volume".to_string()
}

fn default_test_duration() -> u64 {
    300
}

fn default_vendor_type() -> String {
    "generic".to_string()
}

fn default_host_type() -> String {
    "linux".to_string()
}

fn default_raid_settle_secs() -> u64 {
    30
}

fn default_ssh_port() -> u16 {
    22
}

fn default_api_timeout_secs() -> u64 {
    10
}

fn default_command_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            san_ip: "10.196.172.88".to_string(),
            host_ip: "10.196.172.90".to_string(),
            san_username: "admin".to_string(),
            san_password: "password".to_string(),
            host_username: "root".to_string(),
            host_password: "password".to_string(),
            raid_level: default_raid_level(),
            volume_size_gb: default_volume_size_gb(),
            volume_name: default_volume_name(),
            mount_point: default_mount_point(),
            test_duration: default_test_duration(),
            vendor_type: default_vendor_type(),
            host_type: default_host_type(),
            protocol: Protocol::default(),
            filesystem: FilesystemType::default(),
            raid_settle_secs: default_raid_settle_secs(),
            ssh_port: default_ssh_port(),
            api_timeout_secs: default_api_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl Config {
    pub fn raid_settle(&self) -> Duration {
        Duration::from_secs(self.raid_settle_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Apply the set fields of `overrides` on top of this configuration
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(v) = &overrides.san_ip {
            self.san_ip = v.clone();
        }
        if let Some(v) = &overrides.host_ip {
            self.host_ip = v.clone();
        }
        if let Some(v) = overrides.raid_level {
            self.raid_level = v;
        }
        if let Some(v) = overrides.volume_size_gb {
            self.volume_size_gb = v;
        }
        if let Some(v) = &overrides.volume_name {
            self.volume_name = v.clone();
        }
        if let Some(v) = &overrides.mount_point {
            self.mount_point = v.clone();
        }
        if let Some(v) = overrides.test_duration {
            self.test_duration = v;
        }
        if let Some(v) = overrides.filesystem {
            self.filesystem = v;
        }
    }
}

/// Field overrides layered on top of a loaded configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub san_ip: Option<String>,
    pub host_ip: Option<String>,
    pub raid_level: Option<RaidLevel>,
    pub volume_size_gb: Option<u64>,
    pub volume_name: Option<String>,
    pub mount_point: Option<String>,
    pub test_duration: Option<u64>,
    pub filesystem: Option<FilesystemType>,
}

// =============================================================================
// Config Manager
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Format::Yaml,
            _ => Format::Json,
        }
    }
}

/// Loads, validates and saves configuration files
///
/// JSON is the default; files ending in `.yaml`/`.yml` are read and written
/// as YAML.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
    schema: ConfigSchema,
}

impl ConfigManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            schema: ConfigSchema,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the configuration file
    ///
    /// A missing file yields the built-in defaults.
    pub fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            info!("No configuration at {}, using defaults", self.path.display());
            return Ok(Config::default());
        }

        let raw = fs::read_to_string(&self.path)?;
        let config: Config = match Format::for_path(&self.path) {
            Format::Json => serde_json::from_str(&raw)?,
            Format::Yaml => serde_yaml::from_str(&raw)?,
        };

        self.schema.validate(&config).map_err(|e| {
            Error::Configuration(format!(
                "Failed to load configuration from {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!("Loaded configuration from {}", self.path.display());
        Ok(config)
    }

    /// Validate and write a configuration to the managed path
    pub fn save(&self, config: &Config) -> Result<()> {
        self.schema.validate(config)?;

        let serialized = match Format::for_path(&self.path) {
            Format::Json => serde_json::to_string_pretty(config)?,
            Format::Yaml => serde_yaml::to_string(config)?,
        };
        fs::write(&self.path, serialized)?;

        info!("Saved configuration to {}", self.path.display());
        Ok(())
    }

    /// Load the configuration and apply overrides, re-validating the result
    pub fn update(&self, overrides: &ConfigOverrides) -> Result<Config> {
        let mut config = self.load()?;
        config.apply(overrides);
        self.schema.validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn minimal_json() -> &'static str {
        r#"{
            "san_ip": "192.168.10.5",
            "host_ip": "192.168.10.20",
            "san_username": "admin",
            "san_password": "secret123",
            "host_username": "root",
            "host_password": "secret456"
        }"#
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(dir.path().join("absent.json"));

        let config = manager.load().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.san_ip, "10.196.172.88");
        assert_eq!(config.raid_level, RaidLevel::Raid5);
    }

    #[test]
    fn test_load_json_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, minimal_json()).unwrap();

        let config = ConfigManager::new(&path).load().unwrap();
        assert_eq!(config.san_ip, "192.168.10.5");
        assert_eq!(config.volume_size_gb, 100);
        assert_eq!(config.volume_name, "test_volume");
        assert_eq!(config.mount_point, "/mnt/san_volume");
        assert_eq!(config.test_duration, 300);
        assert_eq!(config.protocol, Protocol::Iscsi);
        assert_eq!(config.filesystem, FilesystemType::Ext4);
        assert_eq!(config.raid_settle(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "san_ip: 10.0.0.1\nhost_ip: 10.0.0.2\nsan_username: admin\nsan_password: secret123\n\
             host_username: root\nhost_password: secret456\nraid_level: \"10\"\nprotocol: fc\n",
        )
        .unwrap();

        let config = ConfigManager::new(&path).load().unwrap();
        assert_eq!(config.raid_level, RaidLevel::Raid10);
        assert_eq!(config.protocol, Protocol::Fc);
    }

    #[test]
    fn test_load_rejects_invalid_raid_level() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let json = minimal_json().replace(
            "\"san_ip\"",
            "\"raid_level\": \"3\", \"san_ip\"",
        );
        fs::write(&path, json).unwrap();

        assert_matches!(ConfigManager::new(&path).load(), Err(Error::JsonParse(_)));
    }

    #[test]
    fn test_load_rejects_invalid_ip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, minimal_json().replace("192.168.10.5", "300.1.1.1")).unwrap();

        assert_matches!(ConfigManager::new(&path).load(), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(dir.path().join("saved.json"));

        let mut config = Config::default();
        config.volume_name = "bench_vol".into();
        config.raid_level = RaidLevel::Raid6;
        manager.save(&config).unwrap();

        assert_eq!(manager.load().unwrap(), config);
    }

    #[test]
    fn test_save_refuses_invalid_config() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(dir.path().join("saved.json"));

        let mut config = Config::default();
        config.volume_size_gb = 0;

        assert_matches!(manager.save(&config), Err(Error::Validation { .. }));
        assert!(!manager.path().exists());
    }

    #[test]
    fn test_update_applies_overrides() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(dir.path().join("absent.json"));

        let overrides = ConfigOverrides {
            raid_level: Some(RaidLevel::Raid1),
            volume_size_gb: Some(250),
            mount_point: Some("/srv/bench".into()),
            ..Default::default()
        };

        let config = manager.update(&overrides).unwrap();
        assert_eq!(config.raid_level, RaidLevel::Raid1);
        assert_eq!(config.volume_size_gb, 250);
        assert_eq!(config.mount_point, "/srv/bench");
        assert_eq!(config.volume_name, "test_volume");
    }

    #[test]
    fn test_update_revalidates() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(dir.path().join("absent.json"));

        let overrides = ConfigOverrides {
            test_duration: Some(0),
            ..Default::default()
        };

        assert_matches!(manager.update(&overrides), Err(Error::Validation { .. }));
    }
}
