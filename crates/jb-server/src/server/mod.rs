//! SSH server implementation

mod handler;
mod listener;

pub use handler::{BastionHandler, ChannelSink, ServerConfig};
pub use listener::{load_or_generate_host_key, SshServer};
