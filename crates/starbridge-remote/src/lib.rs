//! Remote image surrogates
//!
//! Lets one process serve a large in-memory image to a peer as if it were
//! local. The serving side binds an [`ImageHost`] dispatcher to a channel;
//! the consuming side gets an [`ImageProxy`] whose swap operations
//! round-trip a [`RemoteData`] payload over that channel. An
//! [`ImageSurrogate`] descriptor ties the two together: it is small,
//! serializable, and can be shipped to the peer through any open channel,
//! transferring the image by reference instead of by value.

pub mod data;
pub mod host;
pub mod image;
pub mod pool;
pub mod proxy;
pub mod surrogate;

pub use data::{RemoteData, RemoteError, SwapOp};
pub use host::ImageHost;
pub use image::{ImageMetadata, Region, SkyImage};
pub use pool::{BufferPool, ScratchBuf};
pub use proxy::ImageProxy;
pub use surrogate::{generate_surrogate_pair, unpack_surrogate, ImageSurrogate};
