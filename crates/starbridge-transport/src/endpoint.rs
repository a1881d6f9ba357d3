//! Channel endpoint
//!
//! Multiplexes logical channels over one peer connection and gives every
//! channel synchronous call/response semantics. A single dispatch loop
//! reads inbound messages and either completes a pending call (the message
//! is a reply) or invokes the callback registered for that channel (the
//! message is a request) and sends the result back.

use crate::pending::PendingCalls;
use crate::transport::{MessageSink, MessageSource, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use starbridge_proto::{ChannelId, Frame, ProtoError};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, trace, warn};

/// Errors surfaced by channel calls.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("connection lost")]
    ConnectionLost,

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Proto(#[from] ProtoError),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("handler error: {0}")]
    Handler(String),
}

/// Future returned by a channel handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, EndpointError>> + Send>>;

/// A per-channel request handler: request bytes in, response bytes out.
pub type ChannelHandler = Arc<dyn Fn(Vec<u8>) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`ChannelHandler`].
pub fn callback_fn<F, Fut>(f: F) -> ChannelHandler
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<u8>, EndpointError>> + Send + 'static,
{
    Arc::new(move |data| Box::pin(f(data)) as HandlerFuture)
}

/// The layered endpoint contract: every layer of the stack (raw transport
/// endpoint, encrypted channel) exposes the same three operations.
#[async_trait]
pub trait ChannelEndpoint: Send + Sync {
    /// Send a request on `channel` and suspend until its reply arrives.
    ///
    /// At most one call per channel id is in flight at a time; concurrent
    /// callers on the same id serialize behind a per-id lock. A channel id
    /// is one unbuffered call slot: if both peers fire a request on the
    /// same id simultaneously, each side would take the peer's request for
    /// its reply, so requests must flow one direction per id.
    async fn send_receive(&self, channel: ChannelId, data: &[u8])
        -> Result<Vec<u8>, EndpointError>;

    /// Register the handler invoked for inbound requests on `channel`.
    fn register_callback(&self, channel: ChannelId, handler: ChannelHandler);

    /// Remove the handler for `channel`. Messages arriving afterwards are
    /// logged and dropped.
    fn unregister_callback(&self, channel: ChannelId);
}

/// Channel endpoint over one message transport connection.
pub struct MessageEndpoint {
    outbox: mpsc::Sender<Bytes>,
    outbox_rx: std::sync::Mutex<Option<mpsc::Receiver<Bytes>>>,
    pending: PendingCalls,
    callbacks: Arc<DashMap<ChannelId, ChannelHandler>>,
    call_locks: DashMap<ChannelId, Arc<Mutex<()>>>,
    closed: Arc<AtomicBool>,
    request_timeout: Option<Duration>,
}

impl MessageEndpoint {
    /// Outbound messages queued before the writer applies backpressure.
    const OUTBOX_DEPTH: usize = 256;

    /// Create an endpoint that is not yet attached to a transport.
    ///
    /// Callbacks may be registered before [`start`](Self::start), so a
    /// listening side can have its handlers in place before the first
    /// peer message can possibly arrive.
    pub fn new(request_timeout: Option<Duration>) -> Arc<Self> {
        let (outbox, outbox_rx) = mpsc::channel(Self::OUTBOX_DEPTH);
        Arc::new(Self {
            outbox,
            outbox_rx: std::sync::Mutex::new(Some(outbox_rx)),
            pending: PendingCalls::new(),
            callbacks: Arc::new(DashMap::new()),
            call_locks: DashMap::new(),
            closed: Arc::new(AtomicBool::new(false)),
            request_timeout,
        })
    }

    /// Attach the transport and spawn the writer and dispatch loops.
    pub fn start(
        self: &Arc<Self>,
        sink: Box<dyn MessageSink>,
        source: Box<dyn MessageSource>,
    ) {
        let rx = match self.outbox_rx.lock().unwrap().take() {
            Some(rx) => rx,
            None => {
                warn!("endpoint already started, ignoring");
                return;
            }
        };

        tokio::spawn(Self::write_loop(
            rx,
            sink,
            self.closed.clone(),
            self.pending.clone(),
        ));
        tokio::spawn(self.clone().dispatch_loop(source));
    }

    /// True once either loop has observed the connection going away.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn write_loop(
        mut rx: mpsc::Receiver<Bytes>,
        mut sink: Box<dyn MessageSink>,
        closed: Arc<AtomicBool>,
        pending: PendingCalls,
    ) {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = sink.send(msg).await {
                error!("transport send failed: {}", e);
                break;
            }
        }
        closed.store(true, Ordering::SeqCst);
        pending.fail_all();
        debug!("write loop ended");
    }

    async fn dispatch_loop(self: Arc<Self>, mut source: Box<dyn MessageSource>) {
        loop {
            let msg = match source.recv().await {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    debug!("connection closed by peer");
                    break;
                }
                Err(e) => {
                    error!("transport receive failed: {}", e);
                    break;
                }
            };

            match Frame::decode(msg) {
                Ok(frame) => self.route(frame),
                Err(e) => error!("dropping malformed frame: {}", e),
            }
        }

        self.closed.store(true, Ordering::SeqCst);
        self.pending.fail_all();
        debug!("dispatch loop ended");
    }

    /// Route one inbound frame: reply to a waiter, or request to a
    /// callback. A channel id with neither is an error worth logging, not
    /// a silent drop.
    fn route(&self, frame: Frame) {
        let channel = frame.channel;
        let payload = frame.payload.to_vec();
        trace!("inbound message on channel {} ({} bytes)", channel, payload.len());

        let payload = match self.pending.try_deliver(channel, payload) {
            None => return,
            Some(payload) => payload,
        };

        let handler = match self.callbacks.get(&channel) {
            Some(h) => h.clone(),
            None => {
                warn!(
                    "no waiter or callback for inbound channel {}, dropping {} byte message",
                    channel,
                    payload.len()
                );
                return;
            }
        };

        // Handlers run on their own task so a slow one cannot stall reply
        // routing, and a handler can never deadlock the dispatch loop.
        let outbox = self.outbox.clone();
        tokio::spawn(async move {
            let reply = match handler(payload).await {
                Ok(reply) => reply,
                Err(e) => {
                    error!("handler for channel {} failed: {}", channel, e);
                    // An empty reply fails fast on the requester side
                    // instead of letting it wait out the timeout.
                    Vec::new()
                }
            };

            let framed = Frame::new(channel, reply).encode();
            if outbox.send(framed).await.is_err() {
                warn!("connection closed before reply on channel {} was sent", channel);
            }
        });
    }
}

#[async_trait]
impl ChannelEndpoint for MessageEndpoint {
    async fn send_receive(
        &self,
        channel: ChannelId,
        data: &[u8],
    ) -> Result<Vec<u8>, EndpointError> {
        if self.is_closed() {
            return Err(EndpointError::ConnectionLost);
        }

        // One outstanding call per channel id.
        let slot = self
            .call_locks
            .entry(channel)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _slot = slot.lock().await;

        let rx = self.pending.register(channel);
        let framed = Frame::new(channel, data.to_vec()).encode();
        if self.outbox.send(framed).await.is_err() {
            self.pending.cancel(channel);
            return Err(EndpointError::ConnectionLost);
        }

        let reply = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.pending.cancel(channel);
                    return Err(EndpointError::Timeout);
                }
            },
            None => rx.await,
        };

        reply.map_err(|_| EndpointError::ConnectionLost)
    }

    fn register_callback(&self, channel: ChannelId, handler: ChannelHandler) {
        self.callbacks.insert(channel, handler);
    }

    fn unregister_callback(&self, channel: ChannelId) {
        self.callbacks.remove(&channel);
    }
}
