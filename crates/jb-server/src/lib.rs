//! jb-server: SSH front end of the jumpbox bastion
//!
//! Accepts client SSH connections, authenticates bastion users and hands
//! each interactive shell to a [`jb_relay::SessionDispatcher`]. Outbound
//! sessions to assets are opened by the russh-based [`target::SshTargetConnector`].

pub mod auth;
pub mod server;
pub mod session;
pub mod state;
pub mod target;

pub use state::BastionState;
