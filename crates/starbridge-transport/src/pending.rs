//! Pending call tracker
//!
//! Associates each channel id with at most one in-flight synchronous call
//! and routes the reply back to the task that sent the request. Waiters
//! are oneshot senders, so tearing the table down wakes every blocked
//! caller with an error instead of leaving it parked forever.

use dashmap::DashMap;
use starbridge_proto::ChannelId;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Tracks calls awaiting their reply, keyed by channel id.
#[derive(Clone, Default)]
pub struct PendingCalls {
    calls: Arc<DashMap<ChannelId, oneshot::Sender<Vec<u8>>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending call on `channel`.
    /// Returns the receiver the caller blocks on.
    pub fn register(&self, channel: ChannelId) -> oneshot::Receiver<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.calls.insert(channel, tx);
        rx
    }

    /// Deliver an inbound payload to the waiter on `channel`, if any.
    ///
    /// Returns `None` when the payload was consumed as a reply. Returns
    /// the payload back when no waiter is registered, so the caller can
    /// route it as a request instead.
    pub fn try_deliver(&self, channel: ChannelId, payload: Vec<u8>) -> Option<Vec<u8>> {
        match self.calls.remove(&channel) {
            Some((_, tx)) => {
                if tx.send(payload).is_err() {
                    // The caller gave up (timeout) between reply arrival
                    // and delivery; the reply is stale either way.
                    warn!("waiter on channel {} gave up before its reply arrived", channel);
                }
                None
            }
            None => Some(payload),
        }
    }

    /// Drop the pending call on `channel` (caller timed out or the send
    /// never went out).
    pub fn cancel(&self, channel: ChannelId) {
        if self.calls.remove(&channel).is_some() {
            debug!("cancelled pending call on channel {}", channel);
        }
    }

    /// Fail every pending call. Dropping the senders wakes each waiting
    /// caller with a receive error, which the endpoint surfaces as a
    /// connection-lost failure.
    pub fn fail_all(&self) {
        let count = self.calls.len();
        if count > 0 {
            warn!("failing {} pending call(s): connection lost", count);
        }
        self.calls.clear();
    }

    /// Number of calls currently awaiting a reply.
    pub fn count(&self) -> usize {
        self.calls.len()
    }
}
