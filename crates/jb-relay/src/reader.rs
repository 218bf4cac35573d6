//! Target output with bounded reads
//!
//! Target output chunks arrive on an mpsc channel owned by the target
//! connection. The receiver sits behind an async mutex: the output pump
//! holds it while forwarding, the dispatcher takes it for synchronous
//! echo and confirmation reads. Both never read at the same time.

use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Shared receiving end of a target's output
pub struct TargetOutput {
    rx: Mutex<mpsc::Receiver<Bytes>>,
}

impl TargetOutput {
    pub fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx: Mutex::new(rx) }
    }

    /// Exclusive access for the pump
    pub async fn lock(&self) -> MutexGuard<'_, mpsc::Receiver<Bytes>> {
        self.rx.lock().await
    }

    /// Wait up to `timeout` for target output
    ///
    /// Returns the first chunk plus everything already queued behind it.
    /// A timeout or a closed target yields empty bytes, never an error.
    pub async fn read_with_timeout(&self, timeout: Duration) -> Bytes {
        let read = async {
            let mut rx = self.rx.lock().await;
            let first = rx.recv().await?;
            let mut collected = BytesMut::from(&first[..]);
            while let Ok(more) = rx.try_recv() {
                collected.extend_from_slice(&more);
            }
            Some(collected.freeze())
        };

        match tokio::time::timeout(timeout, read).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!("Target output closed during read");
                Bytes::new()
            }
            Err(_) => {
                warn!("Read of target output timed out after {}ms", timeout.as_millis());
                Bytes::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_collects_queued_chunks() {
        let (tx, rx) = mpsc::channel(8);
        let output = TargetOutput::new(rx);
        tx.send(Bytes::from_static(b"ls")).await.unwrap();
        tx.send(Bytes::from_static(b"\r\n")).await.unwrap();

        let data = output.read_with_timeout(Duration::from_millis(50)).await;
        assert_eq!(&data[..], b"ls\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_empty() {
        let (_tx, rx) = mpsc::channel::<Bytes>(8);
        let output = TargetOutput::new(rx);
        let data = output.read_with_timeout(Duration::from_millis(300)).await;
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_closed_returns_empty() {
        let (tx, rx) = mpsc::channel::<Bytes>(8);
        drop(tx);
        let output = TargetOutput::new(rx);
        let data = output.read_with_timeout(Duration::from_secs(5)).await;
        assert!(data.is_empty());
    }
}
