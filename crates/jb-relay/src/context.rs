//! Per-side session state

use std::sync::Arc;

use jb_core::Asset;
use tokio_util::sync::CancellationToken;

use crate::line_edit::LineEditContext;
use crate::program::{FullScreenProgram, ProgramFamily};
use crate::pump::PumpGate;
use crate::target::TargetLink;

/// Mode of a connected remote session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMode {
    /// The remote shell is at its prompt
    Command,
    /// A full-screen program owns the remote terminal
    Program(ProgramFamily),
}

/// The bastion's own menu prompt
#[derive(Debug)]
pub struct LocalContext {
    pub edit: LineEditContext,
    /// Authenticated bastion user
    pub user: String,
}

impl LocalContext {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            edit: LineEditContext::new(),
            user: user.into(),
        }
    }
}

/// The relayed shell on one asset
///
/// Created once the outbound session is up and dropped when it closes.
pub struct RemoteContext {
    pub edit: LineEditContext,
    pub asset: Arc<Asset>,
    /// Pseudo-terminal of the remote shell, e.g. `pts/3`
    pub tty: String,
    pub link: TargetLink,
    pub gate: PumpGate,
    pub mode: RemoteMode,
    pub program: Option<FullScreenProgram>,
    /// Command that launched the current full-screen program
    pub last_command: Option<String>,
    /// Waiting for y/n after the shell asked to display all completions
    pub tab_confirm: bool,
    pub(crate) link_id: u64,
    pub(crate) pump_cancel: CancellationToken,
}

impl RemoteContext {
    pub(crate) fn new(
        asset: Arc<Asset>,
        tty: String,
        link: TargetLink,
        link_id: u64,
        pump_cancel: CancellationToken,
    ) -> Self {
        Self {
            edit: LineEditContext::new(),
            asset,
            tty,
            link,
            gate: PumpGate::new(),
            mode: RemoteMode::Command,
            program: None,
            last_command: None,
            tab_confirm: false,
            link_id,
            pump_cancel,
        }
    }

    /// Hand the terminal to a full-screen program
    pub fn enter_program(&mut self, family: ProgramFamily, command: String) {
        self.mode = RemoteMode::Program(family);
        self.program = Some(FullScreenProgram::new(family));
        self.last_command = Some(command);
        self.edit.clear();
    }

    /// Back to line editing at the shell prompt
    pub fn enter_command(&mut self) {
        self.mode = RemoteMode::Command;
        self.program = None;
        self.last_command = None;
        self.tab_confirm = false;
        self.edit.clear();
    }
}
