//! Command audit log
//!
//! One record per completed remote command. Records are queued without
//! blocking the session and written by a small pool of worker tasks; a
//! full queue drops the record and a failed write is logged, neither is
//! ever surfaced to the client.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use jb_core::Asset;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A completed command on a relayed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub actor: String,
    pub asset_name: String,
    pub asset_address: String,
    pub account: String,
    pub timestamp: DateTime<Local>,
    pub command: String,
}

impl AuditRecord {
    /// Record `command` as run by `actor` on `asset`, timestamped now
    pub fn new(actor: &str, asset: &Asset, command: &str) -> Self {
        Self {
            actor: actor.to_string(),
            asset_name: asset.name.clone(),
            asset_address: asset.address.clone(),
            account: asset.username.clone(),
            timestamp: Local::now(),
            command: command.to_string(),
        }
    }

    /// Fixed-width log line, newline terminated
    pub fn to_line(&self) -> String {
        format!(
            "{:<16} {:<16} {:<16} {:<16} {:<20} {}\n",
            self.actor,
            self.asset_name,
            self.asset_address,
            self.account,
            self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            self.command
        )
    }
}

/// Durable destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> std::io::Result<()>;
}

/// Append-only text file, created on first write
pub struct FileAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn append(&self, record: &AuditRecord) -> std::io::Result<()> {
        let line = record.to_line();
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

/// Cheap, clonable handle that queues audit records
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<AuditRecord>,
}

/// Worker tasks behind an [`AuditLogger`]
pub struct AuditWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl AuditWorkers {
    /// Wait for the queue to drain
    ///
    /// Completes once every [`AuditLogger`] clone has been dropped and all
    /// queued records have been written.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Audit worker panicked: {}", e);
            }
        }
    }
}

impl AuditLogger {
    /// Start `workers` writer tasks over a queue of `capacity` records
    pub fn spawn(
        sink: Arc<dyn AuditSink>,
        workers: usize,
        capacity: usize,
    ) -> (Self, AuditWorkers) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                let sink = Arc::clone(&sink);
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(record) = next else {
                            debug!(worker = id, "Audit queue closed");
                            break;
                        };
                        if let Err(e) = sink.append(&record).await {
                            error!("Failed to write audit record for '{}': {}", record.command, e);
                        }
                    }
                })
            })
            .collect();

        (Self { tx }, AuditWorkers { handles })
    }

    /// Queue a record without waiting
    pub fn record(&self, record: AuditRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(record)) => {
                warn!("Audit queue full, dropping record for '{}'", record.command);
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                warn!("Audit queue closed, dropping record for '{}'", record.command);
            }
        }
    }
}
