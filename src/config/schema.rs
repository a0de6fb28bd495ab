//! Configuration validation rules

use super::Config;
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static IPV4_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").expect("static pattern compiles")
});

/// Dotted-quad IPv4 check with each octet in 0..=255
pub fn validate_ip(ip_address: &str) -> bool {
    match IPV4_PATTERN.captures(ip_address) {
        Some(caps) => caps
            .iter()
            .skip(1)
            .flatten()
            .all(|octet| octet.as_str().parse::<u16>().map_or(false, |v| v <= 255)),
        None => false,
    }
}

/// Check credentials meet minimum length requirements
///
/// Returns the reason when they do not. Used for warnings only; controllers
/// and hosts are the authority on what they accept.
pub fn validate_credentials(username: &str, password: &str) -> std::result::Result<(), String> {
    if username.is_empty() || password.is_empty() {
        return Err("Username and password cannot be empty".into());
    }
    if username.chars().count() < 3 {
        return Err("Username must be at least 3 characters".into());
    }
    if password.chars().count() < 6 {
        return Err("Password must be at least 6 characters".into());
    }
    Ok(())
}

/// Validation schema applied once when a configuration is loaded or saved
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigSchema;

impl ConfigSchema {
    /// Validate a configuration, reporting the first offending field
    pub fn validate(&self, config: &Config) -> Result<()> {
        if !validate_ip(&config.san_ip) {
            return Err(invalid("san_ip", format!("'{}' is not an IPv4 address", config.san_ip)));
        }
        if !validate_ip(&config.host_ip) {
            return Err(invalid("host_ip", format!("'{}' is not an IPv4 address", config.host_ip)));
        }
        if config.volume_size_gb == 0 {
            return Err(invalid("volume_size_gb", "must be positive"));
        }
        if config.test_duration == 0 {
            return Err(invalid("test_duration", "must be positive"));
        }
        if config.volume_name.trim().is_empty() {
            return Err(invalid("volume_name", "cannot be empty"));
        }
        if !config.mount_point.starts_with('/') {
            return Err(invalid("mount_point", "must be an absolute path"));
        }
        if config.ssh_port == 0 {
            return Err(invalid("ssh_port", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> Error {
    Error::Validation {
        field: field.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_validate_ip() {
        assert!(validate_ip("10.196.172.88"));
        assert!(validate_ip("0.0.0.0"));
        assert!(validate_ip("255.255.255.255"));
        assert!(!validate_ip("256.1.1.1"));
        assert!(!validate_ip("10.0.0"));
        assert!(!validate_ip("10.0.0.1.5"));
        assert!(!validate_ip("san.example.com"));
        assert!(!validate_ip(""));
    }

    #[test]
    fn test_validate_credentials() {
        assert!(validate_credentials("admin", "password").is_ok());
        assert!(validate_credentials("", "password").is_err());
        assert!(validate_credentials("ad", "password").is_err());
        assert_eq!(
            validate_credentials("root", "pass").unwrap_err(),
            "Password must be at least 6 characters"
        );
    }

    #[test]
    fn test_schema_accepts_defaults() {
        assert!(ConfigSchema.validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_schema_rejects_bad_fields() {
        let mut config = Config::default();
        config.san_ip = "999.1.1.1".into();
        assert_matches!(
            ConfigSchema.validate(&config),
            Err(Error::Validation { field, .. }) if field == "san_ip"
        );

        let mut config = Config::default();
        config.host_ip = "host-a".into();
        assert_matches!(
            ConfigSchema.validate(&config),
            Err(Error::Validation { field, .. }) if field == "host_ip"
        );

        let mut config = Config::default();
        config.volume_size_gb = 0;
        assert_matches!(
            ConfigSchema.validate(&config),
            Err(Error::Validation { field, .. }) if field == "volume_size_gb"
        );

        let mut config = Config::default();
        config.test_duration = 0;
        assert_matches!(
            ConfigSchema.validate(&config),
            Err(Error::Validation { field, .. }) if field == "test_duration"
        );

        let mut config = Config::default();
        config.mount_point = "mnt/san".into();
        assert_matches!(
            ConfigSchema.validate(&config),
            Err(Error::Validation { field, .. }) if field == "mount_point"
        );
    }
}
