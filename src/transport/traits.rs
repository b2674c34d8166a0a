//! Transport trait abstraction for pluggable host links

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A transport stream that can read and write bytes
#[async_trait]
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Close the transport gracefully
    async fn shutdown(&mut self) -> Result<()>;
}

/// Source of host connections to serve, one at a time
#[async_trait]
pub trait TransportSource: Send {
    /// The stream type this source produces
    type Stream: TransportStream;

    /// Wait for the next host link, returning a stream on success
    async fn next(&mut self) -> Result<Self::Stream>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
