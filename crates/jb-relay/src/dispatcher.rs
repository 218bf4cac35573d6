//! Session dispatcher
//!
//! One dispatcher runs per client session. It owns the local menu
//! context and, while connected, the remote context; classifies every
//! client key; and decides whether the key edits the menu line, edits
//! the mirrored remote command line, or belongs to a full-screen program
//! on the target.
//!
//! States:
//!
//! ```text
//!   LOCAL --asset id--> CONNECTING --ok--> REMOTE/COMMAND <--> REMOTE/PROGRAM
//!     ^                     |                      |
//!     +------failed---------+----target closed-----+
//! ```
//!
//! Connecting runs on a spawned worker and the output pump on its own
//! task; both report back over an internal channel so all state changes
//! happen on the dispatcher task.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use jb_core::config::RelaySettings;
use jb_core::{Asset, AssetDirectory, ConnectionError};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audit::{AuditLogger, AuditRecord};
use crate::client::{ClientGone, ClientSink};
use crate::context::{LocalContext, RemoteContext};
use crate::error::RelayError;
use crate::keys::{self, classify, KeyEvent, LineMotion};
use crate::line_edit::{HistoryDirection, LineEditContext};
use crate::menu::{self, MenuCommand};
use crate::probe::ForegroundProbe;
use crate::program::{ProgramFamily, ProgramIo, ProgramSignal, Step};
use crate::pump::{run_pump, PumpExit};
use crate::target::{parse_tty_reply, ClientTerminal, TargetConnector, TargetLink};
use crate::terminal;

pub use crate::context::RemoteMode;

const TTY_COMMAND: &[u8] = b"tty\r";
const TTY_ECHO: &[u8] = b"tty\r\n";
const TAB_CONFIRM_KEYS: &[u8] = b"yYnN";
const TAB_LIST_PROMPT: &str = "Display all";
const INTERNAL_QUEUE: usize = 16;

/// Collaborators shared by every session
#[derive(Clone)]
pub struct RelayServices {
    pub directory: Arc<dyn AssetDirectory>,
    pub connector: Arc<dyn TargetConnector>,
    pub probe: Arc<dyn ForegroundProbe>,
    pub audit: AuditLogger,
    pub settings: RelaySettings,
}

/// Observable state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// At the bastion menu
    Local,
    /// Waiting for the outbound session; input is discarded
    Connecting,
    /// Relaying to an asset
    Remote(RemoteMode),
}

/// Input from the SSH layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Data(Bytes),
    Resize { cols: u32, rows: u32 },
}

enum InternalEvent {
    Connected {
        attempt: u64,
        asset: Arc<Asset>,
        link: TargetLink,
        tty: String,
    },
    ConnectFailed {
        attempt: u64,
        asset: Arc<Asset>,
        error: ConnectionError,
    },
    PumpStopped {
        link_id: u64,
        exit: PumpExit,
    },
}

enum Next {
    Stop,
    Internal(InternalEvent),
    Client(Option<ClientEvent>),
}

/// Borrowed view of what remote key handlers need besides the remote context
struct KeyEnv<'a> {
    client: &'a dyn ClientSink,
    services: &'a RelayServices,
    actor: &'a str,
}

pub struct SessionDispatcher {
    services: RelayServices,
    client: Arc<dyn ClientSink>,
    terminal: ClientTerminal,
    local: LocalContext,
    remote: Option<RemoteContext>,
    /// Id of the in-flight connect attempt
    connecting: Option<u64>,
    next_id: u64,
    quit: bool,
    state_tx: watch::Sender<RelayState>,
    events_tx: mpsc::Sender<InternalEvent>,
    events_rx: mpsc::Receiver<InternalEvent>,
    cancel: CancellationToken,
}

impl SessionDispatcher {
    pub fn new(
        services: RelayServices,
        client: Arc<dyn ClientSink>,
        user: impl Into<String>,
        terminal: ClientTerminal,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(RelayState::Local);
        let (events_tx, events_rx) = mpsc::channel(INTERNAL_QUEUE);
        Self {
            services,
            client,
            terminal,
            local: LocalContext::new(user),
            remote: None,
            connecting: None,
            next_id: 0,
            quit: false,
            state_tx,
            events_tx,
            events_rx,
            cancel,
        }
    }

    pub fn state(&self) -> RelayState {
        if self.connecting.is_some() {
            RelayState::Connecting
        } else if let Some(remote) = &self.remote {
            RelayState::Remote(remote.mode)
        } else {
            RelayState::Local
        }
    }

    /// Follow state changes from another task
    pub fn subscribe(&self) -> watch::Receiver<RelayState> {
        self.state_tx.subscribe()
    }

    pub fn local(&self) -> &LocalContext {
        &self.local
    }

    pub fn remote(&self) -> Option<&RemoteContext> {
        self.remote.as_ref()
    }

    /// Whether the user asked to leave the bastion
    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    /// Drive the session from the SSH handler's event channel
    ///
    /// Returns when the client input ends, the user quits, the session is
    /// cancelled or the client channel fails.
    pub async fn run(
        mut self,
        mut client_events: mpsc::Receiver<ClientEvent>,
    ) -> Result<(), RelayError> {
        let result = self.drive(&mut client_events).await;
        self.on_session_end().await;
        if self.quit {
            self.client.close().await;
        }
        result
    }

    async fn drive(
        &mut self,
        client_events: &mut mpsc::Receiver<ClientEvent>,
    ) -> Result<(), RelayError> {
        self.on_session_start().await?;
        let cancel = self.cancel.clone();

        while !self.quit {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Next::Stop,
                Some(event) = self.events_rx.recv() => Next::Internal(event),
                event = client_events.recv() => Next::Client(event),
            };

            match next {
                Next::Stop => break,
                Next::Internal(event) => self.apply_internal(event).await?,
                Next::Client(Some(ClientEvent::Data(data))) => self.on_client_bytes(&data).await?,
                Next::Client(Some(ClientEvent::Resize { cols, rows })) => {
                    self.on_resize(cols, rows).await
                }
                Next::Client(None) => {
                    debug!("Client input closed");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Greet the client with the asset table and a prompt
    pub async fn on_session_start(&mut self) -> Result<(), RelayError> {
        info!(user = %self.local.user, "Bastion session started");
        let table = menu::render_asset_table(&self.services.directory.list());
        self.client
            .write_parts(&[
                table.as_bytes(),
                self.services.settings.prompt.as_bytes(),
                terminal::INSERT_MODE_ON,
            ])
            .await?;
        Ok(())
    }

    /// Handle one chunk read from the client channel
    pub async fn on_client_bytes(&mut self, raw: &[u8]) -> Result<(), RelayError> {
        for chunk in keys::split_at_enter(raw) {
            if self.quit {
                break;
            }
            if self.connecting.is_some() {
                debug!("Discarding {} bytes of input while connecting", chunk.len());
                break;
            }

            let key = classify(chunk);
            let result = if self.remote.is_some() {
                self.on_remote_key(chunk, key).await
            } else {
                self.on_local_key(chunk, key).await
            };

            match result {
                Ok(()) => {}
                Err(RelayError::Target(e)) => {
                    warn!("Target session failed: {}", e);
                    self.close_remote().await;
                    self.client.write(b"\r\nConnection to asset lost").await?;
                    self.show_menu().await?;
                }
                Err(e) => {
                    self.publish();
                    return Err(e);
                }
            }
        }
        self.publish();
        Ok(())
    }

    /// Track the client's window size and pass it on to the target
    pub async fn on_resize(&mut self, cols: u32, rows: u32) {
        self.terminal.cols = cols;
        self.terminal.rows = rows;
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.link.resize(cols, rows).await {
                debug!("Window change not forwarded: {}", e);
            }
        }
    }

    /// Release the target and stop every task of this session
    pub async fn on_session_end(&mut self) {
        self.connecting = None;
        self.close_remote().await;
        self.cancel.cancel();
        self.publish();
        info!(user = %self.local.user, "Bastion session ended");
    }

    /// Wait for the next worker or pump report and apply it
    pub async fn process_internal_event(&mut self) -> Result<(), RelayError> {
        match self.events_rx.recv().await {
            Some(event) => self.apply_internal(event).await,
            None => Ok(()),
        }
    }

    async fn apply_internal(&mut self, event: InternalEvent) -> Result<(), RelayError> {
        let result = self.handle_internal(event).await;
        self.publish();
        result
    }

    async fn handle_internal(&mut self, event: InternalEvent) -> Result<(), RelayError> {
        match event {
            InternalEvent::Connected {
                attempt,
                asset,
                link,
                tty,
            } => {
                if self.connecting != Some(attempt) {
                    debug!("Dropping stale connection to {}", asset.name);
                    link.close().await;
                    return Ok(());
                }
                self.connecting = None;
                self.next_id += 1;
                let remote = RemoteContext::new(
                    asset,
                    tty,
                    link,
                    self.next_id,
                    self.cancel.child_token(),
                );
                self.spawn_pump(&remote);
                info!(
                    user = %self.local.user,
                    asset = %remote.asset.name,
                    tty = %remote.tty,
                    "Remote session established"
                );
                self.remote = Some(remote);
            }
            InternalEvent::ConnectFailed {
                attempt,
                asset,
                error,
            } => {
                if self.connecting != Some(attempt) {
                    return Ok(());
                }
                self.connecting = None;
                warn!(asset = %asset.name, "Connection failed: {}", error);
                let message = format!("\r\nConnection to {} failed: {}", asset.name, error);
                self.client
                    .write_parts(&[message.as_bytes(), &self.prompt_line()])
                    .await?;
            }
            InternalEvent::PumpStopped { link_id, exit } => {
                if self.remote.as_ref().map(|r| r.link_id) != Some(link_id) {
                    return Ok(());
                }
                match exit {
                    PumpExit::TargetClosed => {
                        self.close_remote().await;
                        self.show_menu().await?;
                    }
                    PumpExit::ClientGone => return Err(ClientGone.into()),
                    PumpExit::Cancelled => {}
                }
            }
        }
        Ok(())
    }

    async fn on_local_key(&mut self, raw: &[u8], key: KeyEvent) -> Result<(), RelayError> {
        let edit = &mut self.local.edit;
        match key {
            // the menu line has no use for unmapped function keys
            KeyEvent::Plain { .. } if keys::is_escape_sequence(raw) => {}
            KeyEvent::Plain { text, .. } => {
                let printable: String = text.chars().filter(|c| !c.is_control()).collect();
                if printable.is_empty() {
                    return Ok(());
                }
                edit.insert_str(&printable);
                self.client.write(printable.as_bytes()).await?;
            }
            KeyEvent::Enter if edit.is_empty() => {
                self.client.write(&self.prompt_line()).await?;
            }
            KeyEvent::Enter => {
                let line = edit.submit();
                self.client.write(terminal::CRLF).await?;
                self.on_local_command(line.trim()).await?;
            }
            KeyEvent::Up | KeyEvent::Down => {
                let direction = if key == KeyEvent::Up {
                    HistoryDirection::Older
                } else {
                    HistoryDirection::Newer
                };
                let line = edit.browse_history(direction);
                self.client
                    .write_parts(&[
                        terminal::CARRIAGE_RETURN,
                        terminal::CLEAR_TO_EOL,
                        self.services.settings.prompt.as_bytes(),
                        line.as_bytes(),
                    ])
                    .await?;
            }
            KeyEvent::Left | KeyEvent::Right => {
                let delta = if key == KeyEvent::Left { -1 } else { 1 };
                if edit.move_cursor(delta) {
                    self.client.write(raw).await?;
                }
            }
            KeyEvent::Delete => {
                if edit.delete_before_cursor() {
                    self.client.write(terminal::DELETE_BACK).await?;
                }
            }
            KeyEvent::Insert => {
                let sequence = if edit.toggle_insert_mode() {
                    terminal::INSERT_MODE_ON
                } else {
                    terminal::INSERT_MODE_OFF
                };
                self.client.write(sequence).await?;
            }
            KeyEvent::CtrlC => {
                edit.clear();
                self.client
                    .write_parts(&[terminal::INTERRUPT_ECHO, &self.prompt_line()])
                    .await?;
            }
            KeyEvent::Tab | KeyEvent::Escape => {}
        }
        Ok(())
    }

    async fn on_local_command(&mut self, line: &str) -> Result<(), RelayError> {
        match MenuCommand::parse(line) {
            Some(MenuCommand::ListAssets) => {
                let table = menu::render_asset_table(&self.services.directory.list());
                self.client
                    .write_parts(&[table.as_bytes(), self.services.settings.prompt.as_bytes()])
                    .await?;
            }
            Some(MenuCommand::ClearScreen) => {
                self.client
                    .write_parts(&[
                        terminal::CLEAR_SCREEN,
                        self.services.settings.prompt.as_bytes(),
                    ])
                    .await?;
            }
            Some(MenuCommand::Quit) => {
                info!(user = %self.local.user, "User left the bastion");
                self.quit = true;
            }
            None => self.select_asset(line).await?,
        }
        Ok(())
    }

    async fn select_asset(&mut self, id: &str) -> Result<(), RelayError> {
        let Some(asset) = self.services.directory.lookup(id) else {
            info!(user = %self.local.user, "Asset '{}' not found", id);
            let message = format!("Asset '{}' not found", id);
            self.client
                .write_parts(&[message.as_bytes(), &self.prompt_line()])
                .await?;
            return Ok(());
        };

        if !asset.kind.is_terminal() {
            let error = ConnectionError::UnsupportedAsset(asset.kind.to_string());
            info!(asset = %asset.name, "{}", error);
            let message = format!("{}: {}", asset.name, error);
            self.client
                .write_parts(&[message.as_bytes(), &self.prompt_line()])
                .await?;
            return Ok(());
        }

        let message = format!("Connecting to {} ({})...\r\n", asset.name, asset.address);
        self.client.write(message.as_bytes()).await?;
        self.spawn_connect(asset);
        Ok(())
    }

    async fn on_remote_key(&mut self, raw: &[u8], key: KeyEvent) -> Result<(), RelayError> {
        let Some(remote) = self.remote.as_mut() else {
            return Ok(());
        };
        let env = KeyEnv {
            client: self.client.as_ref(),
            services: &self.services,
            actor: &self.local.user,
        };
        match remote.mode {
            RemoteMode::Command => remote_command_key(remote, &env, raw, key).await,
            RemoteMode::Program(_) => remote_program_key(remote, &env, raw, key).await,
        }
    }

    fn spawn_connect(&mut self, asset: Arc<Asset>) {
        self.next_id += 1;
        let attempt = self.next_id;
        self.connecting = Some(attempt);

        let connector = Arc::clone(&self.services.connector);
        let settings = self.services.settings.clone();
        let terminal = self.terminal.clone();
        let client = Arc::clone(&self.client);
        let events = self.events_tx.clone();
        let cancel = self.cancel.child_token();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return,
                outcome = establish(
                    connector.as_ref(),
                    &asset,
                    &terminal,
                    client.as_ref(),
                    &settings,
                ) => outcome,
            };
            let event = match outcome {
                Ok((link, tty)) => InternalEvent::Connected {
                    attempt,
                    asset,
                    link,
                    tty,
                },
                Err(error) => InternalEvent::ConnectFailed {
                    attempt,
                    asset,
                    error,
                },
            };
            if let Err(mpsc::error::SendError(InternalEvent::Connected { link, .. })) =
                events.send(event).await
            {
                link.close().await;
            }
        });
    }

    fn spawn_pump(&self, remote: &RemoteContext) {
        let output = Arc::clone(remote.link.output());
        let gate = remote.gate.clone();
        let client = Arc::clone(&self.client);
        let cancel = remote.pump_cancel.clone();
        let events = self.events_tx.clone();
        let link_id = remote.link_id;

        tokio::spawn(async move {
            let exit = run_pump(output, gate, client, cancel).await;
            debug!(link_id, ?exit, "Pump stopped");
            let _ = events.send(InternalEvent::PumpStopped { link_id, exit }).await;
        });
    }

    async fn close_remote(&mut self) {
        if let Some(remote) = self.remote.take() {
            remote.pump_cancel.cancel();
            remote.link.close().await;
            info!(asset = %remote.asset.name, "Remote session closed");
        }
    }

    async fn show_menu(&self) -> Result<(), ClientGone> {
        let table = menu::render_asset_table(&self.services.directory.list());
        self.client
            .write_parts(&[
                terminal::CRLF,
                table.as_bytes(),
                self.services.settings.prompt.as_bytes(),
            ])
            .await
    }

    fn prompt_line(&self) -> Vec<u8> {
        [terminal::CRLF, self.services.settings.prompt.as_bytes()].concat()
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state());
    }
}

async fn remote_command_key(
    remote: &mut RemoteContext,
    env: &KeyEnv<'_>,
    raw: &[u8],
    key: KeyEvent,
) -> Result<(), RelayError> {
    let read_timeout = env.services.settings.read_timeout;

    if remote.tab_confirm {
        if raw.len() == 1 && TAB_CONFIRM_KEYS.contains(&raw[0]) {
            remote.link.send(raw).await?;
            remote.tab_confirm = false;
        }
        return Ok(());
    }

    match key {
        KeyEvent::Up | KeyEvent::Down => {
            let _pause = remote.gate.pause();
            remote.link.send(raw).await?;
            let reply = remote.link.output().read_with_timeout(read_timeout).await;
            if reply.len() == 1 && reply[0] == terminal::BEL {
                remote.edit.clear();
            } else {
                let selected =
                    terminal::visible_text(terminal::trim_leading(&reply, keys::BACKSPACE));
                remote.edit.replace(&selected);
            }
            debug!("History selection: '{}'", remote.edit.text());
            env.client
                .write_parts(&[&reply[..], terminal::CLEAR_TO_EOL])
                .await?;
        }
        KeyEvent::Tab => {
            let _pause = remote.gate.pause();
            remote.link.send(raw).await?;
            let reply = remote.link.output().read_with_timeout(read_timeout).await;
            env.client.write(&reply).await?;
            splice_completion(remote, &reply);
        }
        KeyEvent::Plain { .. } if keys::is_escape_sequence(raw) => {
            match keys::line_motion(raw) {
                Some(LineMotion::Home) => remote.edit.move_to_start(),
                Some(LineMotion::End) => remote.edit.move_to_end(),
                Some(LineMotion::ForwardDelete) => {
                    remote.edit.delete_at_cursor();
                }
                None => debug!("Unmapped escape sequence {:?} forwarded", raw),
            }
            // the shell's redraw reaches the client through the pump
            remote.link.send(raw).await?;
        }
        KeyEvent::Plain { text, .. } => {
            let printable: String = text.chars().filter(|c| !c.is_control()).collect();
            remote.edit.insert_str(&printable);

            let _pause = remote.gate.pause();
            remote.link.send(raw).await?;
            let echo = remote.link.output().read_with_timeout(read_timeout).await;
            match echo.strip_prefix(keys::RIGHT) {
                Some(rest) => {
                    env.client
                        .write_parts(&[terminal::CLEAR_TO_EOL, raw, rest])
                        .await?
                }
                None => {
                    env.client
                        .write_parts(&[terminal::CLEAR_TO_EOL, &echo[..]])
                        .await?
                }
            }
        }
        KeyEvent::Left => {
            if remote.edit.move_cursor(-1) {
                remote.link.send(raw).await?;
            }
        }
        KeyEvent::Right => {
            if remote.edit.move_cursor(1) {
                remote.link.send(raw).await?;
            }
        }
        KeyEvent::Delete => {
            if remote.edit.delete_before_cursor() {
                let _pause = remote.gate.pause();
                remote.link.send(raw).await?;
                env.client.write(terminal::DELETE_BACK).await?;
                // the shell's own redraw is already reproduced locally
                let _ = remote.link.output().read_with_timeout(read_timeout).await;
            }
        }
        KeyEvent::Insert => {
            remote.link.send(raw).await?;
            remote.edit.toggle_insert_mode();
        }
        KeyEvent::CtrlC => {
            remote.link.send(raw).await?;
            remote.edit.clear();
        }
        KeyEvent::Escape => remote.link.send(raw).await?,
        KeyEvent::Enter if remote.edit.is_empty() => remote.link.send(raw).await?,
        KeyEvent::Enter => submit_remote_command(remote, env, raw).await?,
    }
    Ok(())
}

/// Mirror a completion reply into the remote line
fn splice_completion(remote: &mut RemoteContext, reply: &[u8]) {
    let text = String::from_utf8_lossy(reply);
    if text.contains(TAB_LIST_PROMPT) {
        remote.tab_confirm = true;
    } else if reply.first() == Some(&terminal::BEL) {
        remote.edit.insert_str(&terminal::visible_text(&reply[1..]));
    } else if text.starts_with("\r\n") {
        remote.edit.move_to_end();
    } else {
        let completion = terminal::visible_text(reply);
        let single = !completion.trim().is_empty()
            && !completion.trim_end().contains(char::is_whitespace);
        if single {
            remote.edit.insert_str(&completion);
        }
    }
    debug!(confirm = remote.tab_confirm, "Tab completion: '{}'", remote.edit.text());
}

async fn submit_remote_command(
    remote: &mut RemoteContext,
    env: &KeyEnv<'_>,
    raw: &[u8],
) -> Result<(), RelayError> {
    let settings = &env.services.settings;
    let line = remote.edit.submit();
    let command = line.trim();
    if command.is_empty() {
        remote.link.send(raw).await?;
        return Ok(());
    }

    info!(
        user = %env.actor,
        asset = %remote.asset.name,
        "Command: {}",
        command
    );
    env.services
        .audit
        .record(AuditRecord::new(env.actor, &remote.asset, command));

    let _pause = remote.gate.pause();
    remote.link.send(raw).await?;
    let echo = remote.link.output().read_with_timeout(settings.read_timeout).await;
    env.client.write(&echo).await?;

    tokio::time::sleep(settings.probe_settle).await;
    if env
        .services
        .probe
        .is_attached(remote.link.exec(), command, &remote.tty)
        .await
    {
        match ProgramFamily::detect(command) {
            Ok(family) => {
                info!(%family, "'{}' took over the terminal", command);
                remote.enter_program(family, command.to_string());
            }
            Err(e) => warn!("Foreground process detected but {}; staying in command mode", e),
        }
    }
    Ok(())
}

async fn remote_program_key(
    remote: &mut RemoteContext,
    env: &KeyEnv<'_>,
    raw: &[u8],
    key: KeyEvent,
) -> Result<(), RelayError> {
    let settings = &env.services.settings;
    let Some(step) = remote.program.as_mut().map(|program| program.feed(&key)) else {
        remote.enter_command();
        return Ok(());
    };

    // a program that ended by itself leaves the shell reading this line
    if key == KeyEvent::Enter
        && step == Step::Forward(ProgramSignal::Stay)
        && !program_attached(remote, env).await
    {
        let line = remote.edit.text();
        info!(
            asset = %remote.asset.name,
            "'{}' ended on its own",
            remote.last_command.as_deref().unwrap_or_default()
        );
        remote.enter_command();
        remote.edit.replace(&line);
        return submit_remote_command(remote, env, raw).await;
    }
    track_program_line(&mut remote.edit, raw, &key);

    let io = ProgramIo {
        link: &remote.link,
        client: env.client,
        gate: &remote.gate,
        read_timeout: settings.read_timeout,
    };
    let signal = match remote.program.as_mut() {
        Some(program) => program.apply(step, raw, &io).await?,
        None => ProgramSignal::Exit,
    };

    let recheck = match signal {
        ProgramSignal::Exit => {
            info!(asset = %remote.asset.name, "Full-screen program ended");
            remote.enter_command();
            return Ok(());
        }
        ProgramSignal::Uncertain => true,
        ProgramSignal::Stay => matches!(key, KeyEvent::Escape | KeyEvent::CtrlC),
    };
    if recheck {
        tokio::time::sleep(settings.probe_settle).await;
        if !program_attached(remote, env).await {
            info!(
                asset = %remote.asset.name,
                "'{}' no longer attached",
                remote.last_command.as_deref().unwrap_or_default()
            );
            remote.enter_command();
        }
    }
    Ok(())
}

/// Whether the command that started the current program still holds the
/// terminal
async fn program_attached(remote: &RemoteContext, env: &KeyEnv<'_>) -> bool {
    let command = remote.last_command.as_deref().unwrap_or_default();
    env.services
        .probe
        .is_attached(remote.link.exec(), command, &remote.tty)
        .await
}

/// Shadow the line typed while a program runs
///
/// Only read when the program turns out to have exited, in which case
/// these keys went to the shell.
fn track_program_line(edit: &mut LineEditContext, raw: &[u8], key: &KeyEvent) {
    match key {
        KeyEvent::Plain { text, .. } if !keys::is_escape_sequence(raw) => {
            let printable: String = text.chars().filter(|c| !c.is_control()).collect();
            edit.insert_str(&printable);
        }
        KeyEvent::Delete => {
            edit.delete_before_cursor();
        }
        KeyEvent::Left => {
            edit.move_cursor(-1);
        }
        KeyEvent::Right => {
            edit.move_cursor(1);
        }
        KeyEvent::Enter | KeyEvent::Escape | KeyEvent::CtrlC => edit.clear(),
        _ => {}
    }
}

async fn establish(
    connector: &dyn TargetConnector,
    asset: &Asset,
    terminal: &ClientTerminal,
    client: &dyn ClientSink,
    settings: &RelaySettings,
) -> Result<(TargetLink, String), ConnectionError> {
    let link = connector.connect(asset, terminal).await?;

    let setup = async {
        flush_banner(&link, client, settings.banner_window).await?;
        resolve_tty(&link, client, settings.read_timeout).await
    };
    match setup.await {
        Ok(tty) => Ok((link, tty)),
        Err(e) => {
            link.close().await;
            Err(e)
        }
    }
}

/// Forward the login banner for a short window
async fn flush_banner(
    link: &TargetLink,
    client: &dyn ClientSink,
    window: Duration,
) -> Result<(), ConnectionError> {
    let deadline = tokio::time::Instant::now() + window;
    let mut rx = link.output().lock().await;
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(chunk)) => client
                .write(&chunk)
                .await
                .map_err(|_| ConnectionError::Channel("client left during login".to_string()))?,
            Ok(None) => {
                return Err(ConnectionError::Channel(
                    "target closed during login".to_string(),
                ))
            }
            Err(_) => return Ok(()),
        }
    }
}

/// Ask the remote shell for its pseudo-terminal name
///
/// Output preceding the echoed `tty` command is still banner and is
/// forwarded; the reply itself and the prompt after it are swallowed.
async fn resolve_tty(
    link: &TargetLink,
    client: &dyn ClientSink,
    read_timeout: Duration,
) -> Result<String, ConnectionError> {
    link.send(TTY_COMMAND)
        .await
        .map_err(|e| ConnectionError::Channel(e.to_string()))?;

    let mut reply: Vec<u8> = Vec::new();
    let (tty, echo_at) = loop {
        let chunk = link.output().read_with_timeout(read_timeout).await;
        if chunk.is_empty() {
            return Err(ConnectionError::TtyUnresolved(
                String::from_utf8_lossy(&reply).into_owned(),
            ));
        }
        reply.extend_from_slice(&chunk);

        let echo_at = find(&reply, TTY_ECHO);
        let answer = &reply[echo_at.map(|at| at + TTY_ECHO.len()).unwrap_or(0)..];
        if let Some(tty) = parse_tty_reply(&String::from_utf8_lossy(answer)) {
            break (tty, echo_at);
        }
    };

    if let Some(at) = echo_at.filter(|at| *at > 0) {
        client
            .write(&reply[..at])
            .await
            .map_err(|_| ConnectionError::Channel("client left during login".to_string()))?;
    }

    let text = String::from_utf8_lossy(&reply);
    let prompt_seen = text
        .find("/dev/")
        .and_then(|at| text[at..].find('\n').map(|nl| at + nl + 1))
        .map(|rest| !text[rest..].trim().is_empty())
        .unwrap_or(false);
    if !prompt_seen {
        let _ = link.output().read_with_timeout(read_timeout).await;
    }

    debug!("Resolved remote tty {}", tty);
    Ok(tty)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
