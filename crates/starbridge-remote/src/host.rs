//! Server-side image dispatcher
//!
//! An [`ImageHost`] binds one live image to one channel. Each inbound
//! request is one swap: decode the payload, apply it to the image, return
//! the mutated payload. The image stays resident here; only deltas move.

use crate::data::{decode_exact, RemoteData, RemoteError, SwapOp};
use crate::image::SkyImage;
use starbridge_transport::{callback_fn, ChannelHandler, EndpointError};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

/// Dispatcher serving one local image on one channel.
pub struct ImageHost {
    image: Arc<RwLock<SkyImage>>,
}

impl ImageHost {
    pub fn new(image: Arc<RwLock<SkyImage>>) -> Self {
        Self { image }
    }

    /// Serve one request: decode, swap against the live image, re-encode.
    pub async fn serve(&self, request: Vec<u8>) -> Result<Vec<u8>, RemoteError> {
        let mut data = decode_exact(&request)?;
        trace!("serving {:?} on channel {}", data.op, data.reference);
        self.apply(&mut data).await?;
        Ok(bincode::serialize(&data)?)
    }

    async fn apply(&self, data: &mut RemoteData) -> Result<(), RemoteError> {
        match data.op {
            SwapOp::Metadata => {
                data.metadata = Some(self.image.read().await.metadata());
            }
            SwapOp::ReadRegion => {
                data.pixels = self.image.read().await.read_region(data.region)?;
            }
            SwapOp::WriteRegion => {
                let mut image = self.image.write().await;
                image.write_region(data.region, &data.pixels)?;
                // The reply reflects the post-swap live state.
                data.pixels = image.read_region(data.region)?;
            }
        }
        Ok(())
    }

    /// Turn the host into a channel handler for
    /// [`Stack::register_channel`](starbridge_stack::Stack::register_channel).
    pub fn into_handler(self) -> ChannelHandler {
        let host = Arc::new(self);
        callback_fn(move |request| {
            let host = host.clone();
            async move {
                host.serve(request)
                    .await
                    .map_err(|e| EndpointError::Handler(e.to_string()))
            }
        })
    }
}
