//! Stack orchestrator
//!
//! One [`Stack`] instance owns one peer connection: the transport
//! endpoint, the control channel, the table of live data channels and the
//! channel-id counter. All of that is instance state, so two independent
//! stacks can talk to each other inside a single process.

use crate::control::{control_handler, greeting_handler};
use crate::crypto::{ChannelCipher, CryptoError, EncryptedChannel, KEY_LEN};
use dashmap::DashMap;
use starbridge_proto::{
    ChannelId, ControlMessage, CLIENT_GREETING, CONTROL_CHANNEL, CONTROL_IV, FIRST_DATA_CHANNEL,
    GREETING_CHANNEL, IV_LEN, SERVER_GREETING,
};
use starbridge_transport::{
    ChannelEndpoint, ChannelHandler, EndpointError, MessageEndpoint, TcpServer, TcpTransport,
    TransportError,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Stack-level errors
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("handshake failed: peer did not echo the handshake")]
    HandshakeFailed,

    #[error("unknown channel: {0}")]
    UnknownChannel(ChannelId),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("endpoint error: {0}")]
    Endpoint(#[from] EndpointError),
}

/// Stack configuration
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Upper bound on how long one `send_receive` waits for its reply.
    /// `None` waits until the connection is declared dead, which with a
    /// live but unresponsive peer can be forever.
    pub request_timeout: Option<Duration>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

fn validate_key(enc_key: &[u8]) -> Result<[u8; KEY_LEN], StackError> {
    enc_key
        .try_into()
        .map_err(|_| StackError::Crypto(CryptoError::BadKeyLength(enc_key.len())))
}

/// State shared between the stack and its control handler.
pub(crate) struct StackShared {
    pub(crate) endpoint: Arc<MessageEndpoint>,
    pub(crate) key: [u8; KEY_LEN],
    pub(crate) channels: DashMap<ChannelId, Arc<EncryptedChannel>>,
}

/// One secure, multiplexed connection to a peer.
pub struct Stack {
    shared: Arc<StackShared>,
    control: Arc<EncryptedChannel>,
    next_channel: AtomicU32,
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("next_channel", &self.next_channel)
            .finish_non_exhaustive()
    }
}

impl Stack {
    /// Connect to a listening peer and run the connection ceremony:
    /// transport connect with the filter key, plaintext greeting exchange,
    /// then the encrypted handshake echo on the control channel. Any
    /// deviation is fatal to the connection.
    pub async fn establish_connection(
        host: &str,
        port: u16,
        filter_key: &str,
        enc_key: &[u8],
        config: StackConfig,
    ) -> Result<Self, StackError> {
        let key = validate_key(enc_key)?;
        let transport = TcpTransport::connect(host, port, filter_key).await?;
        let peer = transport.peer_addr();
        let (sink, source) = transport.into_split();

        let endpoint = MessageEndpoint::new(config.request_timeout);
        endpoint.start(Box::new(sink), Box::new(source));

        let greeting = endpoint
            .send_receive(GREETING_CHANNEL, CLIENT_GREETING)
            .await?;
        if greeting != SERVER_GREETING {
            return Err(StackError::ProtocolViolation(
                "remote host does not speak the starbridge network stack".into(),
            ));
        }

        let stack = Self::assemble(endpoint, key);
        stack.send_handshake().await?;
        info!("connection to {} established", peer);
        Ok(stack)
    }

    /// Listen on `port` and serve the first peer that passes the filter
    /// key. See [`StackListener`] for the two-step variant that exposes
    /// the bound address before accepting.
    pub async fn create_listener(
        port: u16,
        filter_key: &str,
        enc_key: &[u8],
        config: StackConfig,
    ) -> Result<Self, StackError> {
        let listener = StackListener::bind(port, filter_key).await?;
        listener.accept(enc_key, config).await
    }

    /// Build the shared state and control channel over a transport
    /// endpoint. The control handler is registered here, before any peer
    /// control traffic can arrive.
    fn assemble(endpoint: Arc<MessageEndpoint>, key: [u8; KEY_LEN]) -> Self {
        let shared = Arc::new(StackShared {
            endpoint: endpoint.clone(),
            key,
            channels: DashMap::new(),
        });

        let control = Arc::new(EncryptedChannel::with_cipher(
            endpoint as Arc<dyn ChannelEndpoint>,
            ChannelCipher::from_parts(key, CONTROL_IV),
        ));
        control.register_callback(CONTROL_CHANNEL, control_handler(shared.clone()));

        Self {
            shared,
            control,
            next_channel: AtomicU32::new(FIRST_DATA_CHANNEL),
        }
    }

    /// Round-trip the handshake over the control channel. The peer must
    /// echo the exact bytes; anything else means the two sides do not
    /// share the key and IV they think they share.
    async fn send_handshake(&self) -> Result<(), StackError> {
        let request = ControlMessage::Handshake.encode();
        let reply = self.control.send_receive(CONTROL_CHANNEL, &request).await?;
        if reply != request {
            return Err(StackError::HandshakeFailed);
        }
        debug!("handshake complete");
        Ok(())
    }

    /// Open a new data channel and return its id and endpoint handle.
    ///
    /// Channel ids are allocated by the connecting (initiating) side only;
    /// the listening side opens channels solely on peer request. The peer
    /// answers with the fresh IV both sides then share for this channel.
    pub async fn create_new_channel(
        &self,
    ) -> Result<(ChannelId, Arc<EncryptedChannel>), StackError> {
        let id = self.next_channel.fetch_add(1, Ordering::SeqCst);

        let reply = self
            .control
            .send_receive(CONTROL_CHANNEL, &ControlMessage::OpenChannel(id).encode())
            .await?;
        if reply.len() != IV_LEN {
            return Err(StackError::ProtocolViolation(format!(
                "expected a {} byte IV opening channel {}, got {} bytes",
                IV_LEN,
                id,
                reply.len()
            )));
        }

        let channel = Arc::new(EncryptedChannel::new(
            self.shared.endpoint.clone() as Arc<dyn ChannelEndpoint>,
            &self.shared.key,
            &reply,
        )?);
        self.shared.channels.insert(id, channel.clone());
        debug!("opened channel {}", id);
        Ok((id, channel))
    }

    /// Attach an application handler to an already-open channel. Inbound
    /// requests on it are decrypted before the handler runs and its
    /// replies are encrypted on the way out.
    pub fn register_channel(
        &self,
        channel: ChannelId,
        handler: ChannelHandler,
    ) -> Result<(), StackError> {
        let endpoint = self.open_channel(channel)?;
        endpoint.register_callback(channel, handler);
        Ok(())
    }

    /// Look up an open channel for sending.
    pub fn open_channel(&self, channel: ChannelId) -> Result<Arc<EncryptedChannel>, StackError> {
        self.shared
            .channels
            .get(&channel)
            .map(|c| c.clone())
            .ok_or(StackError::UnknownChannel(channel))
    }

    /// Close a data channel from this side: ask the peer to tear it down,
    /// then mirror the teardown locally. No further traffic on the id is
    /// valid afterwards.
    pub async fn close_channel(&self, channel: ChannelId) -> Result<(), StackError> {
        self.control
            .send_receive(
                CONTROL_CHANNEL,
                &ControlMessage::CloseChannel(channel).encode(),
            )
            .await?;
        self.shared.endpoint.unregister_callback(channel);
        self.shared.channels.remove(&channel);
        debug!("closed channel {}", channel);
        Ok(())
    }

    /// True once the underlying connection has been declared dead.
    pub fn is_closed(&self) -> bool {
        self.shared.endpoint.is_closed()
    }
}

/// Bound but not yet connected listening side of a stack.
///
/// Splitting bind from accept lets callers bind port 0 and learn the
/// real port before the peer connects.
pub struct StackListener {
    server: TcpServer,
}

impl StackListener {
    pub async fn bind(port: u16, filter_key: &str) -> Result<Self, StackError> {
        let server = TcpServer::bind(port, filter_key).await?;
        Ok(Self { server })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, StackError> {
        Ok(self.server.local_addr()?)
    }

    /// Serve the first peer that passes the filter key.
    ///
    /// The greeting and control handlers are registered before the
    /// transport is attached, so no peer message can arrive unrouted.
    pub async fn accept(&self, enc_key: &[u8], config: StackConfig) -> Result<Stack, StackError> {
        let key = validate_key(enc_key)?;
        let endpoint = MessageEndpoint::new(config.request_timeout);
        endpoint.register_callback(GREETING_CHANNEL, greeting_handler());
        let stack = Stack::assemble(endpoint.clone(), key);

        let transport = self.server.accept().await?;
        let peer = transport.peer_addr();
        let (sink, source) = transport.into_split();
        endpoint.start(Box::new(sink), Box::new(source));

        info!("serving peer {}", peer);
        Ok(stack)
    }
}
