//! Relay error types

use jb_core::{ConnectionError, TargetError};
use thiserror::Error;

use crate::client::ClientGone;

/// Errors that end or interrupt a relay session
#[derive(Error, Debug)]
pub enum RelayError {
    /// The client channel went away; the session is over
    #[error(transparent)]
    ClientGone(#[from] ClientGone),

    /// Could not establish the outbound session
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The target session failed after it was established
    #[error("Target error: {0}")]
    Target(#[from] TargetError),
}

impl RelayError {
    /// Whether the error ends the whole client session
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::ClientGone(_))
    }
}
