//! Outbound target session abstraction
//!
//! A [`TargetConnector`] turns an [`Asset`] into a [`TargetLink`]: an
//! interactive PTY shell (input sender plus output receiver) and an
//! independent exec facility for side-channel probes.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use jb_core::{Asset, ConnectionError, TargetError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::reader::TargetOutput;

/// Terminal parameters the client requested for its own session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTerminal {
    pub term: String,
    pub cols: u32,
    pub rows: u32,
    pub pix_width: u32,
    pub pix_height: u32,
    /// Environment sent by the client, passed on to the target shell
    pub env: Vec<(String, String)>,
}

impl Default for ClientTerminal {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            cols: 80,
            rows: 24,
            pix_width: 0,
            pix_height: 0,
            env: Vec::new(),
        }
    }
}

impl ClientTerminal {
    /// Environment to forward, without the bastion-side `USER`
    pub fn forwarded_env(&self) -> impl Iterator<Item = &(String, String)> {
        self.env.iter().filter(|(name, _)| name != "USER")
    }
}

/// Messages to the task that owns the target's shell channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetInput {
    Data(Bytes),
    Resize { cols: u32, rows: u32 },
    Close,
}

/// Result of a side-channel command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: Option<u32>,
}

/// One-shot command execution on the target host
#[async_trait]
pub trait RemoteExec: Send + Sync {
    async fn exec(&self, command: &str) -> Result<ExecOutput, TargetError>;
}

/// Opens interactive sessions to assets
#[async_trait]
pub trait TargetConnector: Send + Sync {
    async fn connect(
        &self,
        asset: &Asset,
        terminal: &ClientTerminal,
    ) -> Result<TargetLink, ConnectionError>;
}

/// Handles to an established target session
#[derive(Clone)]
pub struct TargetLink {
    input: mpsc::Sender<TargetInput>,
    output: Arc<TargetOutput>,
    exec: Arc<dyn RemoteExec>,
    closed: CancellationToken,
}

impl TargetLink {
    /// Assemble a link from the connector's channel ends
    ///
    /// `closed` is shared with whoever owns the shell channel: the owner
    /// cancels it once the shell ends and stops the shell when
    /// [`close`](Self::close) cancels it.
    pub fn new(
        input: mpsc::Sender<TargetInput>,
        output: mpsc::Receiver<Bytes>,
        exec: Arc<dyn RemoteExec>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            input,
            output: Arc::new(TargetOutput::new(output)),
            exec,
            closed,
        }
    }

    /// Forward bytes to the target shell
    pub async fn send(&self, data: &[u8]) -> Result<(), TargetError> {
        self.input
            .send(TargetInput::Data(Bytes::copy_from_slice(data)))
            .await
            .map_err(|_| TargetError::Closed)
    }

    /// Propagate a client window change
    pub async fn resize(&self, cols: u32, rows: u32) -> Result<(), TargetError> {
        self.input
            .send(TargetInput::Resize { cols, rows })
            .await
            .map_err(|_| TargetError::Closed)
    }

    /// Ask the channel owner to close the shell
    ///
    /// The owner watches the token, so a full input queue cannot hold the
    /// shell open.
    pub async fn close(&self) {
        self.closed.cancel();
        let _ = self.input.try_send(TargetInput::Close);
    }

    pub fn output(&self) -> &Arc<TargetOutput> {
        &self.output
    }

    pub fn exec(&self) -> &dyn RemoteExec {
        self.exec.as_ref()
    }
}

/// Extract the pseudo-terminal name from the reply to `tty`
///
/// `tty\r\n/dev/pts/3\r\n$ ` yields `pts/3`. Only lines already ended by
/// CR or LF count; a name still arriving is not cut short.
pub fn parse_tty_reply(reply: &str) -> Option<String> {
    let complete = &reply[..reply.rfind(['\r', '\n'])?];
    complete
        .split(['\r', '\n'])
        .map(str::trim)
        .find_map(|line| line.strip_prefix("/dev/"))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}
