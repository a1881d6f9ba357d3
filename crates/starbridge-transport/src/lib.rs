//! Transport layer for the starbridge network stack
//!
//! This crate turns an asynchronous, unordered message pipe into the
//! synchronous call/response contract the rest of the stack is built on.
//! It has two halves:
//!
//! 1. A message transport seam ([`MessageSink`] / [`MessageSource`]) and a
//!    TCP implementation delivering whole length-prefixed messages between
//!    exactly two peers, with a pre-shared filter key checked at accept
//!    time.
//! 2. A [`ChannelEndpoint`]: multiplexes logical channels over the single
//!    connection, correlates inbound messages to pending outbound requests
//!    (the waiter table), and routes everything else to per-channel
//!    callbacks.

pub mod endpoint;
pub mod pending;
pub mod tcp;
pub mod transport;

pub use endpoint::{
    callback_fn, ChannelEndpoint, ChannelHandler, EndpointError, HandlerFuture, MessageEndpoint,
};
pub use pending::PendingCalls;
pub use tcp::{TcpServer, TcpTransport};
pub use transport::{MessageSink, MessageSource, TransportError, TransportResult};

/// Maximum size of one transport message (64 MiB). Large images move as
/// region-sized payloads well under this; anything bigger is a protocol
/// error, not a legitimate message.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;
