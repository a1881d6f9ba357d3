//! Starbridge - remote image access for astronomical pipelines
//!
//! This library re-exports the starbridge crates, providing a unified
//! entry point for applications that serve or consume large in-memory
//! images across a network.
//!
//! # Quick Start - Serving an image
//!
//! ```ignore
//! use starbridge::{
//!     generate_surrogate_pair, SkyImage, Stack, StackConfig,
//! };
//! use std::sync::Arc;
//! use tokio::sync::RwLock;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key = *b"sixteen byte key";
//!     let stack = Stack::establish_connection(
//!         "compute.example.org",
//!         4400,
//!         "survey-filter-key",
//!         &key,
//!         StackConfig::default(),
//!     )
//!     .await?;
//!
//!     let image = Arc::new(RwLock::new(SkyImage::new(4096, 4096)));
//!     let surrogate = generate_surrogate_pair(&stack, image).await?;
//!
//!     // Ship `surrogate.to_bytes()?` to the peer over any open channel;
//!     // it unpacks into a proxy that reads and writes this live image.
//!     Ok(())
//! }
//! ```
//!
//! ## Key Components
//!
//! - **Stack**: one secure, multiplexed connection to a peer; owns the
//!   control channel and the live data channels
//! - **StackListener**: the passive side; binds, filters on the
//!   pre-shared key, serves one peer
//! - **EncryptedChannel**: transparent AES-CBC layer implementing the
//!   same endpoint contract as the raw transport
//! - **ImageHost / ImageProxy**: the two roles of a served image
//! - **ImageSurrogate**: the portable descriptor tying them together

pub use starbridge_proto::{
    ChannelId, ControlMessage, Frame, CLIENT_GREETING, CONTROL_CHANNEL, FIRST_DATA_CHANNEL,
    GREETING_CHANNEL, SERVER_GREETING,
};
pub use starbridge_remote::{
    generate_surrogate_pair, unpack_surrogate, BufferPool, ImageHost, ImageMetadata, ImageProxy,
    ImageSurrogate, Region, RemoteData, RemoteError, SkyImage, SwapOp,
};
pub use starbridge_stack::{
    ChannelCipher, CryptoError, EncryptedChannel, Stack, StackConfig, StackError, StackListener,
};
pub use starbridge_transport::{
    callback_fn, ChannelEndpoint, ChannelHandler, EndpointError, MessageEndpoint, MessageSink,
    MessageSource, TcpServer, TcpTransport, TransportError,
};
