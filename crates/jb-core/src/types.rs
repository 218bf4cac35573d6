//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an asset in the directory, as typed at the bastion menu
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub String);

impl AssetId {
    /// Create a new asset ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AssetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Broad category of an asset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// A host reachable over SSH with an interactive shell
    #[default]
    Host,
    /// A database server
    Database,
    /// A web application
    Webapp,
}

impl AssetKind {
    /// Whether sessions to this kind of asset can be relayed as a terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssetKind::Host)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Host => write!(f, "host"),
            AssetKind::Database => write!(f, "database"),
            AssetKind::Webapp => write!(f, "webapp"),
        }
    }
}

/// A directory entry describing one target reachable through the bastion
#[derive(Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Menu identifier
    pub id: AssetId,
    /// Display name
    pub name: String,
    /// Network address (hostname or IP)
    pub address: String,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Platform label (e.g. "Linux")
    #[serde(default)]
    pub platform: String,
    /// Organisational group
    #[serde(default)]
    pub group: String,
    /// Free-form remark
    #[serde(default)]
    pub remark: String,
    /// Asset category
    #[serde(default)]
    pub kind: AssetKind,
    /// Sub-category (e.g. "linux", "mysql")
    #[serde(default)]
    pub sub_kind: String,
    /// Account used to log in to the asset
    pub username: String,
    /// Secret for `username`
    pub secret: String,
    /// Pinned host key fingerprint; any key is accepted when unset
    #[serde(default)]
    pub host_key: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl Asset {
    /// `address:port` string for connecting
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

// Hand-written so the secret never reaches a log line.
impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("kind", &self.kind)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_debug_hides_secret() {
        let asset = Asset {
            id: AssetId::new("1"),
            name: "centos7".into(),
            address: "10.0.0.1".into(),
            port: 22,
            platform: "Linux".into(),
            group: "DEFAULT".into(),
            remark: String::new(),
            kind: AssetKind::Host,
            sub_kind: "linux".into(),
            username: "root".into(),
            secret: "hunter2".into(),
            host_key: None,
        };
        let debug = format!("{:?}", asset);
        assert!(debug.contains("centos7"));
        assert!(!debug.contains("hunter2"));
        assert_eq!(asset.socket_address(), "10.0.0.1:22");
    }

    #[test]
    fn test_asset_kind_terminal() {
        assert!(AssetKind::Host.is_terminal());
        assert!(!AssetKind::Database.is_terminal());
        assert_eq!(format!("{}", AssetKind::Webapp), "webapp");
    }
}
