//! jb-core: Core abstractions and configuration for jumpbox
//!
//! This crate provides the shared asset model, the asset directory,
//! error types and configuration structures used by the relay engine
//! and the SSH server.

pub mod config;
pub mod directory;
pub mod error;
pub mod types;

pub use directory::{AssetDirectory, StaticDirectory};
pub use error::{ConfigError, ConnectionError, JbError, TargetError};
pub use types::{Asset, AssetId, AssetKind};
