//! jb-relay: Interactive session relay and command-audit engine
//!
//! Sits between the raw client byte stream and the raw target byte
//! stream of one bastion session. The [`dispatcher::SessionDispatcher`]
//! classifies client keys, keeps separate line-edit state for the local
//! asset menu and the relayed remote shell, tells command lines apart
//! from keys meant for full-screen programs, and writes an audit record
//! for every completed command.

pub mod audit;
pub mod client;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod keys;
pub mod line_edit;
pub mod menu;
pub mod probe;
pub mod program;
pub mod pump;
pub mod reader;
pub mod target;
pub mod terminal;

pub use audit::{AuditLogger, AuditRecord, AuditSink, FileAuditSink};
pub use client::{ClientGone, ClientSink};
pub use dispatcher::{ClientEvent, RelayServices, RelayState, RemoteMode, SessionDispatcher};
pub use error::RelayError;
pub use keys::{classify, KeyEvent};
pub use line_edit::LineEditContext;
pub use probe::{ForegroundProbe, PsProbe};
pub use target::{
    ClientTerminal, ExecOutput, RemoteExec, TargetConnector, TargetInput, TargetLink,
};
