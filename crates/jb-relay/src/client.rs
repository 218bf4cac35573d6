//! Write side of the client channel

use async_trait::async_trait;
use thiserror::Error;

/// The client channel can no longer be written to
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("client channel closed")]
pub struct ClientGone;

/// Byte sink for the authenticated client's terminal
///
/// Every call is one flushed data message on the client channel.
#[async_trait]
pub trait ClientSink: Send + Sync {
    /// Write raw bytes to the client
    async fn write(&self, data: &[u8]) -> Result<(), ClientGone>;

    /// Write several fragments as a single message
    async fn write_parts(&self, parts: &[&[u8]]) -> Result<(), ClientGone> {
        let data = parts.concat();
        self.write(&data).await
    }

    /// Close the client channel
    async fn close(&self);
}
