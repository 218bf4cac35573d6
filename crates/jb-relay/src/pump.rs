//! Output relay pump
//!
//! Forwards target output to the client for as long as a remote session
//! lives. The dispatcher pauses it around every synchronous read of
//! target output so the two never compete for the same bytes.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::client::ClientSink;
use crate::reader::TargetOutput;

/// Counted pause switch shared by the dispatcher and the pump
///
/// The pump runs while the count is zero. Each [`PauseGuard`] holds one
/// count and releases it on drop.
#[derive(Clone)]
pub struct PumpGate {
    tx: Arc<watch::Sender<usize>>,
}

impl Default for PumpGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PumpGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Pause the pump until the returned guard is dropped
    pub fn pause(&self) -> PauseGuard {
        self.tx.send_modify(|count| *count += 1);
        PauseGuard { gate: self.clone() }
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow() > 0
    }

    fn subscribe(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }
}

/// Keeps the pump paused while alive
#[must_use = "the pump resumes as soon as the guard is dropped"]
pub struct PauseGuard {
    gate: PumpGate,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.gate.tx.send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// Why the pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The target output channel ended
    TargetClosed,
    /// Writing to the client failed
    ClientGone,
    /// The session was cancelled
    Cancelled,
}

/// Forward target output to the client until the target closes
pub async fn run_pump(
    output: Arc<TargetOutput>,
    gate: PumpGate,
    client: Arc<dyn ClientSink>,
    cancel: CancellationToken,
) -> PumpExit {
    let mut paused = gate.subscribe();

    loop {
        if !wait_until_running(&mut paused, &cancel).await {
            return PumpExit::Cancelled;
        }

        let mut rx = output.lock().await;
        // A pause may have landed while we waited for the lock.
        let now_paused = *paused.borrow_and_update() > 0;
        if now_paused {
            continue;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return PumpExit::Cancelled,
            _ = until_paused(&mut paused) => {
                trace!("Pump paused");
            }
            chunk = rx.recv() => match chunk {
                Some(data) => {
                    if client.write(&data).await.is_err() {
                        debug!("Client write failed, stopping pump");
                        return PumpExit::ClientGone;
                    }
                }
                None => {
                    debug!("Target output closed, stopping pump");
                    return PumpExit::TargetClosed;
                }
            },
        }
    }
}

async fn wait_until_running(
    paused: &mut watch::Receiver<usize>,
    cancel: &CancellationToken,
) -> bool {
    loop {
        let count = *paused.borrow_and_update();
        if count == 0 {
            return true;
        }
        tokio::select! {
            _ = cancel.cancelled() => return false,
            changed = paused.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

async fn until_paused(paused: &mut watch::Receiver<usize>) {
    loop {
        let count = *paused.borrow_and_update();
        if count > 0 {
            return;
        }
        if paused.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
