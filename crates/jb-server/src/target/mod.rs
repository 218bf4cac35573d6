//! Outbound SSH sessions to assets

mod connector;

pub use connector::{SshExec, SshTargetConnector};
