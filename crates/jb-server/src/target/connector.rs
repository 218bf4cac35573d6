//! russh client side of the relay
//!
//! Opens a password-authenticated SSH session to an asset, starts a PTY
//! shell sized like the client's terminal and hands the relay a
//! [`TargetLink`]. A task owns the shell channel and moves bytes between
//! it and the link's channels; probes run on separate exec channels.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use jb_core::{Asset, ConnectionError, TargetError};
use jb_relay::{ClientTerminal, ExecOutput, RemoteExec, TargetConnector, TargetInput, TargetLink};
use russh::client::{self, Config, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Keystrokes queued towards the target shell
const INPUT_CHANNEL_CAPACITY: usize = 256;

/// Output chunks buffered while the pump is paused
const OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// Connects to assets over SSH
pub struct SshTargetConnector {
    connect_timeout: Duration,
    exec_timeout: Duration,
}

impl SshTargetConnector {
    /// `connect_timeout` bounds the whole login; `exec_timeout` bounds each probe
    pub fn new(connect_timeout: Duration, exec_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            exec_timeout,
        }
    }

    async fn open(
        &self,
        asset: &Asset,
        terminal: &ClientTerminal,
    ) -> Result<TargetLink, ConnectionError> {
        let address = asset.socket_address();
        let handler = TargetHandler {
            asset: asset.name.clone(),
            pinned_key: asset.host_key.clone(),
        };

        tracing::debug!("Connecting to {} at {}", asset.name, address);
        let mut session = client::connect(Arc::new(Config::default()), address.as_str(), handler)
            .await
            .map_err(|e| classify_connect_error(&address, e))?;

        tracing::debug!("Authenticating to {} as '{}'", asset.name, asset.username);
        let authenticated = session
            .authenticate_password(&asset.username, &asset.secret)
            .await
            .map_err(|e| ConnectionError::ConnectionRefused(format!("{}: {}", address, e)))?;
        if !authenticated {
            return Err(ConnectionError::AuthenticationFailed {
                user: asset.username.clone(),
                address,
            });
        }

        let channel = open_shell(&session, terminal).await?;
        let session = Arc::new(session);

        let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let closed = CancellationToken::new();

        tokio::spawn(run_shell_channel(
            channel,
            input_rx,
            output_tx,
            closed.clone(),
            Arc::clone(&session),
            asset.name.clone(),
        ));

        let exec = SshExec {
            session,
            timeout: self.exec_timeout,
        };
        tracing::info!("Shell opened on {} ({})", asset.name, address);
        Ok(TargetLink::new(input_tx, output_rx, Arc::new(exec), closed))
    }
}

#[async_trait]
impl TargetConnector for SshTargetConnector {
    async fn connect(
        &self,
        asset: &Asset,
        terminal: &ClientTerminal,
    ) -> Result<TargetLink, ConnectionError> {
        tokio::time::timeout(self.connect_timeout, self.open(asset, terminal))
            .await
            .map_err(|_| ConnectionError::Timeout(asset.socket_address()))?
    }
}

async fn open_shell(
    session: &Handle<TargetHandler>,
    terminal: &ClientTerminal,
) -> Result<Channel<Msg>, ConnectionError> {
    let channel_error =
        |stage: &str, e: russh::Error| ConnectionError::Channel(format!("{}: {}", stage, e));

    let channel = session
        .channel_open_session()
        .await
        .map_err(|e| channel_error("open session", e))?;

    for (name, value) in terminal.forwarded_env() {
        // servers commonly refuse env; that is not fatal
        if let Err(e) = channel.set_env(false, name.as_str(), value.as_str()).await {
            tracing::debug!("env {} not forwarded: {}", name, e);
        }
    }

    channel
        .request_pty(
            false,
            &terminal.term,
            terminal.cols,
            terminal.rows,
            terminal.pix_width,
            terminal.pix_height,
            &[],
        )
        .await
        .map_err(|e| channel_error("PTY request", e))?;
    channel
        .request_shell(false)
        .await
        .map_err(|e| channel_error("shell request", e))?;

    Ok(channel)
}

/// Move bytes between the shell channel and the link until either side ends
async fn run_shell_channel(
    mut channel: Channel<Msg>,
    mut input_rx: mpsc::Receiver<TargetInput>,
    output_tx: mpsc::Sender<Bytes>,
    closed: CancellationToken,
    session: Arc<Handle<TargetHandler>>,
    asset: String,
) {
    tracing::debug!("Shell channel task started for {}", asset);

    loop {
        tokio::select! {
            _ = closed.cancelled() => {
                tracing::debug!("Relay closed the link to {}", asset);
                let _ = channel.eof().await;
                let _ = channel.close().await;
                break;
            }

            input = input_rx.recv() => match input {
                Some(TargetInput::Data(data)) => {
                    if let Err(e) = channel.data(&data[..]).await {
                        tracing::warn!("Failed to write to {}: {}", asset, e);
                        break;
                    }
                }
                Some(TargetInput::Resize { cols, rows }) => {
                    if let Err(e) = channel.window_change(cols, rows, 0, 0).await {
                        tracing::debug!("Window change on {} failed: {}", asset, e);
                    }
                }
                Some(TargetInput::Close) | None => {
                    let _ = channel.eof().await;
                    let _ = channel.close().await;
                    break;
                }
            },

            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { data }) => {
                    if output_tx.send(Bytes::copy_from_slice(&data)).await.is_err() {
                        break;
                    }
                }
                Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                    if output_tx.send(Bytes::copy_from_slice(&data)).await.is_err() {
                        break;
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    tracing::debug!("Shell on {} exited with {}", asset, exit_status);
                }
                Some(ChannelMsg::Eof) => {
                    tracing::debug!("Shell on {} sent EOF", asset);
                }
                Some(ChannelMsg::Close) | None => {
                    tracing::info!("Shell channel on {} closed", asset);
                    break;
                }
                Some(_) => {}
            },
        }
    }

    closed.cancel();
    drop(output_tx);
    if let Err(e) = session
        .disconnect(Disconnect::ByApplication, "session closed", "en")
        .await
    {
        tracing::debug!("Disconnect from {} failed: {}", asset, e);
    }
    tracing::debug!("Shell channel task stopped for {}", asset);
}

/// Runs probe commands on their own exec channels
pub struct SshExec {
    session: Arc<Handle<TargetHandler>>,
    timeout: Duration,
}

#[async_trait]
impl RemoteExec for SshExec {
    async fn exec(&self, command: &str) -> Result<ExecOutput, TargetError> {
        let mut channel = self
            .session
            .channel_open_session()
            .await
            .map_err(|e| TargetError::Exec(format!("open exec channel: {}", e)))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| TargetError::Exec(format!("exec request: {}", e)))?;

        let mut output = ExecOutput::default();
        let drain = tokio::time::timeout(self.timeout, async {
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { data } => output.stdout.extend_from_slice(&data),
                    ChannelMsg::ExtendedData { data, .. } => {
                        output.stderr.extend_from_slice(&data)
                    }
                    ChannelMsg::ExitStatus { exit_status } => {
                        output.exit_status = Some(exit_status)
                    }
                    ChannelMsg::Close => break,
                    _ => {}
                }
            }
        })
        .await;

        if drain.is_err() {
            let _ = channel.close().await;
            return Err(TargetError::Exec(format!(
                "'{}' did not finish within {}ms",
                command,
                self.timeout.as_millis()
            )));
        }
        Ok(output)
    }
}

/// russh client handler for one asset
pub(crate) struct TargetHandler {
    asset: String,
    pinned_key: Option<String>,
}

#[async_trait]
impl client::Handler for TargetHandler {
    type Error = anyhow::Error;

    /// Accept any key unless the asset pins a fingerprint
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        match &self.pinned_key {
            Some(expected) if fingerprints_match(expected, &fingerprint) => {
                tracing::debug!("Host key of {} matches pinned fingerprint", self.asset);
                Ok(true)
            }
            Some(expected) => {
                tracing::warn!(
                    "Host key of {} rejected: expected {}, got {}",
                    self.asset,
                    expected,
                    fingerprint
                );
                Ok(false)
            }
            None => {
                tracing::debug!("Host key of {}: {}", self.asset, fingerprint);
                Ok(true)
            }
        }
    }
}

/// Pinned fingerprints may be written with or without the `SHA256:` prefix
fn fingerprints_match(pinned: &str, actual: &str) -> bool {
    let strip = |s: &str| s.trim().trim_start_matches("SHA256:").to_string();
    strip(pinned) == strip(actual)
}

fn classify_connect_error(address: &str, error: anyhow::Error) -> ConnectionError {
    match error.downcast_ref::<russh::Error>() {
        Some(russh::Error::UnknownKey) => {
            ConnectionError::HostKeyVerificationFailed(address.to_string())
        }
        _ => ConnectionError::ConnectionRefused(format!("{}: {}", address, error)),
    }
}
