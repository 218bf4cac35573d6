//! Asset directory
//!
//! The relay only ever reads from the directory; lookups hand out shared
//! references so session state never copies credentials around.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::types::{Asset, AssetId};

/// Read-only lookup of assets by id
pub trait AssetDirectory: Send + Sync {
    /// Look up a single asset
    fn lookup(&self, id: &str) -> Option<Arc<Asset>>;

    /// All assets in menu order
    fn list(&self) -> Vec<Arc<Asset>>;
}

/// Directory backed by a fixed table loaded at startup
#[derive(Debug, Default)]
pub struct StaticDirectory {
    assets: BTreeMap<AssetId, Arc<Asset>>,
}

impl StaticDirectory {
    /// Build a directory, rejecting duplicate ids
    pub fn new(assets: impl IntoIterator<Item = Asset>) -> Result<Self, ConfigError> {
        let mut table = BTreeMap::new();
        for asset in assets {
            if asset.id.as_str().trim().is_empty() {
                return Err(ConfigError::MissingField("assets.id".to_string()));
            }
            let id = asset.id.clone();
            if table.insert(id.clone(), Arc::new(asset)).is_some() {
                return Err(ConfigError::Invalid(format!("duplicate asset id '{}'", id)));
            }
        }
        tracing::debug!("Asset directory loaded with {} entries", table.len());
        Ok(Self { assets: table })
    }

    /// Number of assets
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Check if the directory is empty
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl AssetDirectory for StaticDirectory {
    fn lookup(&self, id: &str) -> Option<Arc<Asset>> {
        self.assets.get(&AssetId::from(id)).map(Arc::clone)
    }

    fn list(&self) -> Vec<Arc<Asset>> {
        self.assets.values().map(Arc::clone).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AssetKind;

    fn asset(id: &str, name: &str) -> Asset {
        Asset {
            id: AssetId::new(id),
            name: name.into(),
            address: "192.168.71.101".into(),
            port: 22,
            platform: "Linux".into(),
            group: "DEFAULT".into(),
            remark: String::new(),
            kind: AssetKind::Host,
            sub_kind: "linux".into(),
            username: "root".into(),
            secret: "secret".into(),
            host_key: None,
        }
    }

    #[test]
    fn test_lookup_and_list_order() {
        let dir = StaticDirectory::new(vec![asset("2", "b"), asset("1", "a")]).unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.lookup("2").unwrap().name, "b");
        assert!(dir.lookup("99").is_none());

        let names: Vec<_> = dir.list().iter().map(|a| a.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = StaticDirectory::new(vec![asset("1", "a"), asset("1", "b")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_lookup_shares_instance() {
        let dir = StaticDirectory::new(vec![asset("1", "a")]).unwrap();
        let first = dir.lookup("1").unwrap();
        let second = dir.lookup("1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
