//! Session management

mod registry;

pub use registry::{SessionHandle, SessionId, SessionLimitExceeded, SessionRegistry};
