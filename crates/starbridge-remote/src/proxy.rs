//! Client-side image proxy
//!
//! The consuming peer's view of a remote image. Each operation serializes
//! a swap payload into a pooled scratch buffer, round-trips it over the
//! channel, and deserializes the reply back into the same payload, so the
//! caller sees a single synchronous swap on an object that lives
//! elsewhere.

use crate::data::{decode_exact, RemoteData, RemoteError};
use crate::image::{ImageMetadata, Region};
use crate::pool::BufferPool;
use starbridge_proto::ChannelId;
use starbridge_transport::ChannelEndpoint;
use std::sync::Arc;

/// Proxy for an image resident on the peer, bound to one channel.
pub struct ImageProxy {
    channel: Arc<dyn ChannelEndpoint>,
    reference: ChannelId,
    pool: BufferPool,
}

impl ImageProxy {
    pub fn new(channel: Arc<dyn ChannelEndpoint>, reference: ChannelId) -> Self {
        Self {
            channel,
            reference,
            pool: BufferPool::default(),
        }
    }

    /// Channel this proxy talks on.
    pub fn reference(&self) -> ChannelId {
        self.reference
    }

    /// One full state exchange: the payload goes out carrying the delta to
    /// apply, and comes back mutated with the host's live state. The
    /// payload names its own channel, so prebuilt payloads for other
    /// channels round-trip unchanged through a proxy that shares the
    /// endpoint.
    pub async fn swap(&self, data: &mut RemoteData) -> Result<(), RemoteError> {
        let reply = {
            let mut buf = self.pool.acquire();
            bincode::serialize_into(&mut *buf, data)?;
            self.channel.send_receive(data.reference, &buf).await?
            // Scratch buffer returns to the pool here, on success and on
            // every early return above.
        };

        *data = decode_exact(&reply)?;
        Ok(())
    }

    pub async fn metadata(&self) -> Result<ImageMetadata, RemoteError> {
        let mut data = RemoteData::metadata_request(self.reference);
        self.swap(&mut data).await?;
        data.metadata
            .ok_or(RemoteError::MissingReplyField("metadata"))
    }

    pub async fn read_region(&self, region: Region) -> Result<Vec<f64>, RemoteError> {
        let mut data = RemoteData::read_request(self.reference, region);
        self.swap(&mut data).await?;
        Ok(data.pixels)
    }

    /// Write a region and return its contents as read back from the host
    /// after the swap.
    pub async fn write_region(
        &self,
        region: Region,
        pixels: Vec<f64>,
    ) -> Result<Vec<f64>, RemoteError> {
        let mut data = RemoteData::write_request(self.reference, region, pixels);
        self.swap(&mut data).await?;
        Ok(data.pixels)
    }
}
