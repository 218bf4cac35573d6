//! Core error types for jumpbox

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the jumpbox crates
#[derive(Error, Debug)]
pub enum JbError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Target channel error
    #[error("Target error: {0}")]
    Target(#[from] TargetError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while establishing the outbound session to an asset
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Authentication against the asset failed
    #[error("Authentication failed for {user}@{address}")]
    AuthenticationFailed { user: String, address: String },

    /// TCP/SSH connection could not be established
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// Connection setup exceeded the configured timeout
    #[error("Connection to {0} timed out")]
    Timeout(String),

    /// The asset presented a host key other than the pinned one
    #[error("Host key verification failed for {0}")]
    HostKeyVerificationFailed(String),

    /// Opening or configuring the shell channel failed
    #[error("Channel setup failed: {0}")]
    Channel(String),

    /// The pseudo-terminal name of the remote shell could not be determined
    #[error("Could not resolve remote tty from reply {0:?}")]
    TtyUnresolved(String),

    /// The asset kind cannot be relayed as an interactive terminal
    #[error("Asset kind '{0}' is not supported by the terminal relay")]
    UnsupportedAsset(String),
}

/// Errors on an established target session
#[derive(Error, Debug)]
pub enum TargetError {
    /// The target channel has been closed
    #[error("Target channel closed")]
    Closed,

    /// A side-channel command execution failed
    #[error("Remote exec failed: {0}")]
    Exec(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}
