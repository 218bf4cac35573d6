//! SSH handler for bastion clients
//!
//! Authenticates users, records the terminal they ask for and, on the
//! shell request, starts a [`SessionDispatcher`] fed from the channel's
//! data and window-change events.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use jb_relay::{ClientEvent, ClientGone, ClientSink, ClientTerminal, SessionDispatcher};
use russh::server::{Auth, Handle, Handler, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use russh_keys::key::PublicKey;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::state::BastionState;

/// Client events buffered ahead of the dispatcher
const CLIENT_EVENT_CAPACITY: usize = 1024;

/// Writes relay output to the client's session channel
pub struct ChannelSink {
    handle: Handle,
    channel: ChannelId,
    closed: AtomicBool,
}

impl ChannelSink {
    pub fn new(handle: Handle, channel: ChannelId) -> Self {
        Self {
            handle,
            channel,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ClientSink for ChannelSink {
    async fn write(&self, data: &[u8]) -> Result<(), ClientGone> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientGone);
        }
        self.handle
            .data(self.channel, CryptoVec::from_slice(data))
            .await
            .map_err(|_| {
                self.closed.store(true, Ordering::Release);
                ClientGone
            })
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.handle.eof(self.channel).await;
        let _ = self.handle.close(self.channel).await;
    }
}

/// The one interactive shell a connection may run
struct ShellSession {
    channel: ChannelId,
    events: Option<mpsc::Sender<ClientEvent>>,
    cancel: CancellationToken,
}

/// Handler for a single client connection
pub struct BastionHandler {
    state: Arc<BastionState>,
    peer_addr: SocketAddr,
    /// Login name, set once authenticated
    user: Option<String>,
    /// Session channel opened by the client
    channel: Option<ChannelId>,
    terminal: ClientTerminal,
    shell: Option<ShellSession>,
    cancel: CancellationToken,
}

impl BastionHandler {
    /// `cancel` stops the connection's shell, e.g. on daemon shutdown
    pub fn new(state: Arc<BastionState>, peer_addr: SocketAddr, cancel: CancellationToken) -> Self {
        Self {
            state,
            peer_addr,
            user: None,
            channel: None,
            terminal: ClientTerminal::default(),
            shell: None,
            cancel,
        }
    }

    fn is_session_channel(&self, channel: ChannelId) -> bool {
        self.channel == Some(channel)
    }

    fn send_event(&mut self, event: ClientEvent) {
        let Some(events) = self.shell.as_ref().and_then(|s| s.events.as_ref()) else {
            return;
        };
        // the dispatcher writes through this connection, so never wait here
        match events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Client event queue full for {}, dropping input", self.peer_addr);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Dispatcher for {} has stopped", self.peer_addr);
            }
        }
    }

    /// Start the relay for the session channel
    fn start_shell(&mut self, channel: ChannelId, session: &mut Session) -> bool {
        let Some(user) = self.user.clone() else {
            return false;
        };

        let cancel = self.cancel.child_token();
        let registry = Arc::clone(self.state.session_registry());
        let handle = match registry.register(&user, self.peer_addr, cancel.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Refusing shell for {} from {}: {}", user, self.peer_addr, e);
                session.data(channel, CryptoVec::from_slice(format!("{}\r\n", e).as_bytes()));
                return false;
            }
        };

        let (events_tx, events_rx) = mpsc::channel(CLIENT_EVENT_CAPACITY);
        let sink = Arc::new(ChannelSink::new(session.handle(), channel));
        let dispatcher = SessionDispatcher::new(
            self.state.services.clone(),
            Arc::clone(&sink) as Arc<dyn ClientSink>,
            user.clone(),
            self.terminal.clone(),
            cancel.clone(),
        );

        tracing::info!(
            "Starting {} for {} from {} ({} {}x{})",
            handle.id,
            user,
            self.peer_addr,
            self.terminal.term,
            self.terminal.cols,
            self.terminal.rows
        );

        tokio::spawn(async move {
            match dispatcher.run(events_rx).await {
                Ok(()) => tracing::info!("{} for {} ended", handle.id, handle.user),
                Err(e) => {
                    tracing::warn!("{} for {} ended with error: {}", handle.id, handle.user, e)
                }
            }
            registry.remove(handle.id);
            sink.close().await;
        });

        self.shell = Some(ShellSession {
            channel,
            events: Some(events_tx),
            cancel,
        });
        true
    }
}

impl Drop for BastionHandler {
    fn drop(&mut self) {
        if let Some(shell) = self.shell.take() {
            shell.cancel.cancel();
            tracing::debug!("Cancelled shell for {} on handler drop", self.peer_addr);
        }
    }
}

#[async_trait]
impl Handler for BastionHandler {
    type Error = anyhow::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if self.state.users.verify(user, password) {
            tracing::info!("Password login for {} from {}", user, self.peer_addr);
            self.user = Some(user.to_string());
            return Ok(Auth::Accept);
        }
        tracing::warn!("Password login REJECTED for {} from {}", user, self.peer_addr);
        Ok(Auth::Reject {
            proceed_with_methods: None,
        })
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        let fingerprint = public_key.fingerprint();
        if self.state.keys.is_authorized(&fingerprint) {
            tracing::info!(
                "Key login for {} from {}, fingerprint: {}",
                user,
                self.peer_addr,
                fingerprint
            );
            self.user = Some(user.to_string());
            return Ok(Auth::Accept);
        }
        tracing::debug!(
            "Key {} not authorized for {} from {}",
            fingerprint,
            user,
            self.peer_addr
        );
        Ok(Auth::Reject {
            proceed_with_methods: None,
        })
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if self.channel.is_some() {
            tracing::warn!("{} tried to open a second session channel", self.peer_addr);
            return Ok(false);
        }
        tracing::debug!("Session channel opened: {:?}", channel.id());
        self.channel = Some(channel.id());
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if !self.is_session_channel(channel) || self.shell.is_some() {
            session.channel_failure(channel);
            return Ok(());
        }
        self.terminal.term = term.to_string();
        self.terminal.cols = col_width;
        self.terminal.rows = row_height;
        self.terminal.pix_width = pix_width;
        self.terminal.pix_height = pix_height;
        session.channel_success(channel);
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        variable_name: &str,
        variable_value: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if !self.is_session_channel(channel) || self.shell.is_some() {
            session.channel_failure(channel);
            return Ok(());
        }
        self.terminal
            .env
            .push((variable_name.to_string(), variable_value.to_string()));
        session.channel_success(channel);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if !self.is_session_channel(channel) || self.shell.is_some() {
            session.channel_failure(channel);
            return Ok(());
        }
        if self.start_shell(channel, session) {
            session.channel_success(channel);
        } else {
            session.channel_failure(channel);
            session.close(channel);
        }
        Ok(())
    }

    /// Only interactive shells are relayed
    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::warn!(
            "Refusing exec of {:?} from {}",
            String::from_utf8_lossy(data),
            self.peer_addr
        );
        session.channel_failure(channel);
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.shell.as_ref().map(|s| s.channel) != Some(channel) {
            return Ok(());
        }
        tracing::trace!("Received {} bytes from {}", data.len(), self.peer_addr);
        self.send_event(ClientEvent::Data(Bytes::copy_from_slice(data)));
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if !self.is_session_channel(channel) {
            return Ok(());
        }
        self.terminal.cols = col_width;
        self.terminal.rows = row_height;
        self.terminal.pix_width = pix_width;
        self.terminal.pix_height = pix_height;
        self.send_event(ClientEvent::Resize {
            cols: col_width,
            rows: row_height,
        });
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Channel EOF: {:?}", channel);
        if let Some(shell) = self.shell.as_mut().filter(|s| s.channel == channel) {
            // ends the dispatcher's input stream
            shell.events = None;
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Channel closed: {:?}", channel);
        if self.shell.as_ref().map(|s| s.channel) == Some(channel) {
            if let Some(shell) = self.shell.take() {
                shell.cancel.cancel();
            }
        }
        if self.channel == Some(channel) {
            self.channel = None;
        }
        Ok(())
    }
}

/// Configuration for the SSH server
#[derive(Clone)]
pub struct ServerConfig {
    pub ssh_config: Arc<russh::server::Config>,
}

impl ServerConfig {
    pub fn new(host_key: russh_keys::key::KeyPair) -> Self {
        let mut config = russh::server::Config::default();
        config.keys.push(host_key);
        config.auth_rejection_time = std::time::Duration::from_secs(1);
        config.auth_rejection_time_initial = Some(std::time::Duration::from_secs(0));
        config.inactivity_timeout = None;

        Self {
            ssh_config: Arc::new(config),
        }
    }
}
