//! Surrogate passing
//!
//! Ties the host and proxy roles together over a stack. Generating a
//! surrogate pair allocates a channel, binds the image dispatcher to it,
//! and yields a small serializable descriptor. The descriptor can travel
//! to the peer through any open channel; unpacking it there produces a
//! proxy bound to the same channel, so the image moves by reference, not
//! by value.

use crate::data::RemoteError;
use crate::host::ImageHost;
use crate::image::{ImageMetadata, SkyImage};
use crate::proxy::ImageProxy;
use serde::{Deserialize, Serialize};
use starbridge_proto::ChannelId;
use starbridge_stack::Stack;
use starbridge_transport::ChannelEndpoint;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Portable descriptor of a remotely served image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSurrogate {
    /// Channel the image is served on.
    pub channel: ChannelId,
    /// Shape of the image at generation time.
    pub metadata: ImageMetadata,
}

impl ImageSurrogate {
    pub fn to_bytes(&self) -> Result<Vec<u8>, RemoteError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RemoteError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Serve `image` on a fresh channel of `stack` and return the descriptor
/// to hand to the peer.
///
/// The image stays resident on this side; the dispatcher lives as long as
/// the channel does.
pub async fn generate_surrogate_pair(
    stack: &Stack,
    image: Arc<RwLock<SkyImage>>,
) -> Result<ImageSurrogate, RemoteError> {
    let (channel, _endpoint) = stack.create_new_channel().await?;
    let metadata = image.read().await.metadata();
    stack.register_channel(channel, ImageHost::new(image).into_handler())?;

    debug!("serving {}x{} image on channel {}", metadata.width, metadata.height, channel);
    Ok(ImageSurrogate { channel, metadata })
}

/// Reconstruct a proxy for a surrogate received from the peer.
pub fn unpack_surrogate(stack: &Stack, surrogate: &ImageSurrogate) -> Result<ImageProxy, RemoteError> {
    let channel = stack.open_channel(surrogate.channel)?;
    Ok(ImageProxy::new(
        channel as Arc<dyn ChannelEndpoint>,
        surrogate.channel,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageMetadata;

    #[test]
    fn test_surrogate_descriptor_round_trip() {
        let surrogate = ImageSurrogate {
            channel: 11,
            metadata: ImageMetadata {
                width: 2048,
                height: 2048,
            },
        };
        let bytes = surrogate.to_bytes().unwrap();
        assert_eq!(ImageSurrogate::from_bytes(&bytes).unwrap(), surrogate);
    }
}
