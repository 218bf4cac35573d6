//! Live client sessions

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Identifier of a client session, unique for the daemon's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// The configured session limit has been reached
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("session limit of {limit} reached")]
pub struct SessionLimitExceeded {
    pub limit: u32,
}

/// One authenticated client shell
#[derive(Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    pub user: String,
    pub peer: SocketAddr,
    pub started: Instant,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Stop the session's dispatcher and target connection
    pub fn terminate(&self) {
        self.cancel.cancel();
    }
}

/// Registry of active sessions with an optional concurrency limit
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
    next_id: AtomicU64,
    /// Slots taken, including registrations still being inserted
    active: AtomicUsize,
    limit: Option<u32>,
}

impl SessionRegistry {
    pub fn new(limit: Option<u32>) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            active: AtomicUsize::new(0),
            limit,
        }
    }

    /// Claim a slot for a new session
    pub fn register(
        &self,
        user: &str,
        peer: SocketAddr,
        cancel: CancellationToken,
    ) -> Result<Arc<SessionHandle>, SessionLimitExceeded> {
        let claimed = self.active.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
            match self.limit {
                Some(limit) if active >= limit as usize => None,
                _ => Some(active + 1),
            }
        });
        if claimed.is_err() {
            return Err(SessionLimitExceeded {
                limit: self.limit.unwrap_or_default(),
            });
        }

        let handle = Arc::new(SessionHandle {
            id: SessionId(self.next_id.fetch_add(1, Ordering::SeqCst)),
            user: user.to_string(),
            peer,
            started: Instant::now(),
            cancel,
        });
        self.sessions.insert(handle.id, Arc::clone(&handle));
        tracing::debug!("Registered {} for {} from {}", handle.id, user, peer);
        Ok(handle)
    }

    /// Release a session's slot
    pub fn remove(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        let removed = self.sessions.remove(&id).map(|(_, handle)| handle);
        if removed.is_some() {
            self.active.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!("Released {}", id);
        }
        removed
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(&id).map(|r| Arc::clone(&r))
    }

    pub fn list(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.iter().map(|r| Arc::clone(&r)).collect()
    }

    /// Terminate every session, e.g. on shutdown
    pub fn terminate_all(&self) {
        for session in self.sessions.iter() {
            session.terminate();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}
