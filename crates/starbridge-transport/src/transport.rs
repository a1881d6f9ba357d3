//! Message transport seam
//!
//! The underlying transport is treated as a pipe that delivers whole byte
//! messages between two peers, or stops delivering when the connection is
//! gone. Splitting the contract into a sink and a source lets the endpoint
//! drive sending and receiving from independent tasks.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("peer rejected the filter key")]
    FilterKeyRejected,

    #[error("protocol error: {0}")]
    ProtocolError(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// The sending half of a message transport.
#[async_trait]
pub trait MessageSink: Send {
    /// Send one whole message to the peer.
    async fn send(&mut self, data: Bytes) -> TransportResult<()>;

    /// Close the sending side.
    async fn close(&mut self) -> TransportResult<()>;
}

/// The receiving half of a message transport.
#[async_trait]
pub trait MessageSource: Send {
    /// Receive one whole message from the peer.
    ///
    /// Returns `None` when the connection has been closed gracefully.
    async fn recv(&mut self) -> TransportResult<Option<Bytes>>;
}
