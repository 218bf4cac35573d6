//! Test doubles for driving a dispatcher without any network

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use jb_core::config::RelaySettings;
use jb_core::{Asset, AssetId, AssetKind, ConnectionError, StaticDirectory, TargetError};
use jb_relay::{
    AuditLogger, AuditRecord, AuditSink, ClientGone, ClientSink, ClientTerminal, ExecOutput,
    ForegroundProbe, RelayServices, RemoteExec, SessionDispatcher, TargetConnector, TargetInput,
    TargetLink,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const SHELL_PROMPT: &str = "[root@centos7 ~]# ";

/// Maps one chunk of target input to the bytes the target answers with
pub type Responder = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// A bash-like shell: answers `tty`, prints a prompt on Enter, echoes the rest
pub fn shell_responder() -> Responder {
    responder_with(|_| None)
}

/// Shell responder with per-input overrides
pub fn responder_with<F>(overrides: F) -> Responder
where
    F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
{
    Arc::new(move |input: &[u8]| {
        if let Some(reply) = overrides(input) {
            return reply;
        }
        match input {
            b"tty\r" => format!("tty\r\n/dev/pts/3\r\n{}", SHELL_PROMPT).into_bytes(),
            b"\r" => format!("\r\n{}", SHELL_PROMPT).into_bytes(),
            other => other.to_vec(),
        }
    })
}

pub fn test_settings() -> RelaySettings {
    RelaySettings {
        read_timeout: Duration::from_millis(200),
        connect_timeout: Duration::from_secs(1),
        banner_window: Duration::from_millis(20),
        probe_settle: Duration::from_millis(10),
        ..RelaySettings::default()
    }
}

pub fn test_assets() -> Vec<Asset> {
    let host = |id: &str, name: &str, address: &str| Asset {
        id: AssetId::new(id),
        name: name.into(),
        address: address.into(),
        port: 22,
        platform: "Linux".into(),
        group: "DEFAULT".into(),
        remark: String::new(),
        kind: AssetKind::Host,
        sub_kind: "linux".into(),
        username: "root".into(),
        secret: "secret".into(),
        host_key: None,
    };
    let mut db = host("3", "orders-db", "192.168.71.110");
    db.kind = AssetKind::Database;
    db.sub_kind = "mysql".into();
    vec![
        host("1", "centos7", "192.168.71.101"),
        host("2", "ubuntu", "192.168.71.102"),
        db,
    ]
}

/// Client sink that keeps everything written to it
#[derive(Default)]
pub struct RecordingClient {
    output: Mutex<Vec<u8>>,
    gone: AtomicBool,
    closed: AtomicBool,
}

impl RecordingClient {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output.lock().unwrap()).into_owned()
    }

    pub fn take_text(&self) -> String {
        let bytes = std::mem::take(&mut *self.output.lock().unwrap());
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Make every further write fail
    pub fn disconnect(&self) {
        self.gone.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientSink for RecordingClient {
    async fn write(&self, data: &[u8]) -> Result<(), ClientGone> {
        if self.gone.load(Ordering::SeqCst) {
            return Err(ClientGone);
        }
        self.output.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct NullExec;

#[async_trait]
impl RemoteExec for NullExec {
    async fn exec(&self, _command: &str) -> Result<ExecOutput, TargetError> {
        Ok(ExecOutput::default())
    }
}

/// Connector whose targets answer through a [`Responder`]
pub struct ScriptedConnector {
    responder: Responder,
    banner: Mutex<Option<Vec<u8>>>,
    delay: Mutex<Duration>,
    stagger: Mutex<Option<(usize, Duration)>>,
    fail: AtomicBool,
    connects: AtomicUsize,
    open_shells: Arc<AtomicUsize>,
    inputs: Arc<Mutex<Vec<Vec<u8>>>>,
    resizes: Arc<Mutex<Vec<(u32, u32)>>>,
    kill: CancellationToken,
}

impl ScriptedConnector {
    pub fn new(responder: Responder) -> Self {
        Self {
            responder,
            banner: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            stagger: Mutex::new(None),
            fail: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            open_shells: Arc::default(),
            inputs: Arc::default(),
            resizes: Arc::default(),
            kill: CancellationToken::new(),
        }
    }

    pub fn set_banner(&self, banner: &str) {
        *self.banner.lock().unwrap() = Some(banner.as_bytes().to_vec());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Deliver replies longer than `at` bytes in two chunks, `pause` apart
    pub fn stagger_replies(&self, at: usize, pause: Duration) {
        *self.stagger.lock().unwrap() = Some((at, pause));
    }

    pub fn fail_connects(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Target shells whose owner task is still running
    pub fn open_shells(&self) -> usize {
        self.open_shells.load(Ordering::SeqCst)
    }

    /// Everything the relay sent to the target shell
    pub fn inputs(&self) -> Vec<Vec<u8>> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn last_input(&self) -> Option<Vec<u8>> {
        self.inputs.lock().unwrap().last().cloned()
    }

    pub fn resizes(&self) -> Vec<(u32, u32)> {
        self.resizes.lock().unwrap().clone()
    }

    /// Drop the target side of every open shell
    pub fn kill_targets(&self) {
        self.kill.cancel();
    }
}

#[async_trait]
impl TargetConnector for ScriptedConnector {
    async fn connect(
        &self,
        asset: &Asset,
        _terminal: &ClientTerminal,
    ) -> Result<TargetLink, ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ConnectionError::ConnectionRefused(asset.socket_address()));
        }

        let (input_tx, mut input_rx) = mpsc::channel::<TargetInput>(64);
        let (output_tx, output_rx) = mpsc::channel::<Bytes>(64);

        let banner = self.banner.lock().unwrap().clone();
        if let Some(banner) = banner {
            let _ = output_tx.send(Bytes::from(banner)).await;
        }

        let responder = Arc::clone(&self.responder);
        let inputs = Arc::clone(&self.inputs);
        let resizes = Arc::clone(&self.resizes);
        let kill = self.kill.clone();
        let stagger = *self.stagger.lock().unwrap();
        let closed = CancellationToken::new();
        let owner_closed = closed.clone();
        let shells = Arc::clone(&self.open_shells);
        shells.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = kill.cancelled() => break,
                    _ = owner_closed.cancelled() => break,
                    input = input_rx.recv() => match input {
                        Some(TargetInput::Data(data)) => {
                            inputs.lock().unwrap().push(data.to_vec());
                            let mut reply = Bytes::from(responder(&data));
                            if let Some((at, pause)) = stagger.filter(|(at, _)| reply.len() > *at) {
                                let head = reply.split_to(at);
                                if output_tx.send(head).await.is_err() {
                                    break;
                                }
                                tokio::time::sleep(pause).await;
                            }
                            if !reply.is_empty() && output_tx.send(reply).await.is_err() {
                                break;
                            }
                        }
                        Some(TargetInput::Resize { cols, rows }) => {
                            resizes.lock().unwrap().push((cols, rows));
                        }
                        Some(TargetInput::Close) | None => break,
                    },
                }
            }
            owner_closed.cancel();
            shells.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(TargetLink::new(input_tx, output_rx, Arc::new(NullExec), closed))
    }
}

/// Probe with a switchable answer
#[derive(Default)]
pub struct ScriptedProbe {
    attached: AtomicBool,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedProbe {
    pub fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::SeqCst);
    }

    /// `(command, tty)` of every probe so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ForegroundProbe for ScriptedProbe {
    async fn is_attached(&self, _exec: &dyn RemoteExec, command: &str, tty: &str) -> bool {
        self.calls
            .lock()
            .unwrap()
            .push((command.to_string(), tty.to_string()));
        self.attached.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Wait until `count` records have been written
    pub async fn wait_for(&self, count: usize) -> Vec<AuditRecord> {
        for _ in 0..100 {
            let records = self.records();
            if records.len() >= count {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} audit records, got {:?}", count, self.records());
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> std::io::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Everything a dispatcher test needs, wired together
pub struct Harness {
    pub client: Arc<RecordingClient>,
    pub connector: Arc<ScriptedConnector>,
    pub probe: Arc<ScriptedProbe>,
    pub audit: Arc<MemoryAuditSink>,
    pub services: RelayServices,
    pub cancel: CancellationToken,
}

impl Harness {
    pub fn new(responder: Responder) -> Self {
        let client = Arc::new(RecordingClient::default());
        let connector = Arc::new(ScriptedConnector::new(responder));
        let probe = Arc::new(ScriptedProbe::default());
        let audit = Arc::new(MemoryAuditSink::default());
        let directory = StaticDirectory::new(test_assets()).expect("test assets are valid");
        let (logger, _workers) = AuditLogger::spawn(audit.clone(), 1, 64);

        let services = RelayServices {
            directory: Arc::new(directory),
            connector: connector.clone(),
            probe: probe.clone(),
            audit: logger,
            settings: test_settings(),
        };

        Self {
            client,
            connector,
            probe,
            audit,
            services,
            cancel: CancellationToken::new(),
        }
    }

    pub fn dispatcher(&self) -> SessionDispatcher {
        SessionDispatcher::new(
            self.services.clone(),
            self.client.clone(),
            "alice",
            ClientTerminal::default(),
            self.cancel.child_token(),
        )
    }

    /// A dispatcher already relaying to asset `id`
    pub async fn connected(&self, id: &str) -> SessionDispatcher {
        let mut dispatcher = self.dispatcher();
        dispatcher.on_session_start().await.unwrap();
        dispatcher.on_client_bytes(id.as_bytes()).await.unwrap();
        dispatcher.on_client_bytes(b"\r").await.unwrap();
        dispatcher.process_internal_event().await.unwrap();
        assert!(dispatcher.remote().is_some(), "connect to {} failed", id);
        self.client.take_text();
        dispatcher
    }
}

/// Send each key as its own chunk
pub async fn type_keys(dispatcher: &mut SessionDispatcher, keys: &[&[u8]]) {
    for key in keys {
        dispatcher.on_client_bytes(key).await.unwrap();
    }
}
