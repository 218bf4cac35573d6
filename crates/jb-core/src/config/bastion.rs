//! Bastion server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::RelaySettings;
use crate::error::ConfigError;
use crate::types::Asset;

/// Configuration for the bastion daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BastionConfig {
    /// Address to bind the SSH server to
    pub bind_address: String,

    /// Path to the host key file (generated on first start)
    pub host_key_path: PathBuf,

    /// Password users allowed to log in
    pub users: Vec<UserEntry>,

    /// authorized_keys files accepted for public-key login
    pub authorized_keys: Vec<PathBuf>,

    /// Asset directory
    pub assets: Vec<Asset>,

    /// Relay tunables
    pub relay: RelaySettings,

    /// Audit log settings
    pub audit: AuditConfig,

    /// Maximum number of concurrent client sessions
    pub max_sessions: Option<u32>,
}

impl Default for BastionConfig {
    fn default() -> Self {
        let config_dir = super::default_config_dir();

        Self {
            bind_address: "0.0.0.0:2222".to_string(),
            host_key_path: config_dir.join("host_key"),
            users: vec![],
            authorized_keys: vec![],
            assets: vec![],
            relay: RelaySettings::default(),
            audit: AuditConfig::default(),
            max_sessions: None,
        }
    }
}

impl BastionConfig {
    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.users.is_empty() && self.authorized_keys.is_empty() {
            return Err(ConfigError::Invalid(
                "no users or authorized_keys configured; nobody can log in".to_string(),
            ));
        }
        for user in &self.users {
            if user.name.is_empty() {
                return Err(ConfigError::MissingField("users.name".to_string()));
            }
            if user.password_sha256.len() != 64
                || !user.password_sha256.chars().all(|c| c.is_ascii_hexdigit())
            {
                return Err(ConfigError::Invalid(format!(
                    "user '{}': password_sha256 must be 64 hex characters",
                    user.name
                )));
            }
        }
        if self.audit.workers == 0 {
            return Err(ConfigError::Invalid("audit.workers must be at least 1".to_string()));
        }
        if self.audit.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "audit.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A password-authenticated bastion user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    /// Login name
    pub name: String,
    /// Lowercase hex SHA-256 of the password
    pub password_sha256: String,
}

/// Audit log settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Append-only log file
    pub path: PathBuf,
    /// Writer tasks draining the queue
    pub workers: usize,
    /// Records buffered before new ones are dropped
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: super::default_config_dir().join("audit.log"),
            workers: 1,
            queue_capacity: 1024,
        }
    }
}
