//! Global bastion state

use std::sync::Arc;

use jb_core::config::BastionConfig;
use jb_relay::RelayServices;

use crate::auth::{AuthorizedKeys, UserCredentials};
use crate::session::SessionRegistry;

/// State shared by every connection handler
pub struct BastionState {
    pub config: BastionConfig,
    /// Collaborators handed to each session dispatcher
    pub services: RelayServices,
    pub users: UserCredentials,
    pub keys: AuthorizedKeys,
    pub sessions: Arc<SessionRegistry>,
}

impl BastionState {
    pub fn new(config: BastionConfig, services: RelayServices, keys: AuthorizedKeys) -> Self {
        Self {
            users: UserCredentials::new(&config.users),
            sessions: Arc::new(SessionRegistry::new(config.max_sessions)),
            config,
            services,
            keys,
        }
    }

    pub fn session_registry(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }
}
