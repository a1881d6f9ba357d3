//! Swap payloads
//!
//! A [`RemoteData`] carries one state exchange between proxy and host: the
//! channel reference, the operation, and the full delta to apply and to
//! read back. The host mutates the payload in place and returns it, so
//! one round trip is one complete "swap" on the remote image.

use crate::image::{ImageMetadata, Region};
use serde::{Deserialize, Serialize};
use starbridge_proto::ChannelId;
use starbridge_stack::StackError;
use starbridge_transport::EndpointError;
use thiserror::Error;

/// Errors in the remote-surrogate layer.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("decoded {decoded} of {total} request bytes")]
    SizeMismatch { decoded: usize, total: usize },

    #[error("region {0:?} outside image bounds {1}x{2}")]
    RegionOutOfBounds(Region, u32, u32),

    #[error("pixel count {0} does not match expected {1}")]
    PixelCountMismatch(usize, usize),

    #[error("reply is missing its {0}")]
    MissingReplyField(&'static str),

    #[error("endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("stack error: {0}")]
    Stack(#[from] StackError),
}

/// The operation a swap performs on the remote image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapOp {
    /// Fetch the image shape.
    Metadata,
    /// Fill `pixels` with the region's current contents.
    ReadRegion,
    /// Apply `pixels` to the region, then read the region back.
    WriteRegion,
}

/// One state exchange between an [`ImageProxy`](crate::ImageProxy) and an
/// [`ImageHost`](crate::ImageHost).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteData {
    /// Channel the exchange travels on.
    pub reference: ChannelId,
    pub op: SwapOp,
    pub region: Region,
    pub pixels: Vec<f64>,
    pub metadata: Option<ImageMetadata>,
}

impl RemoteData {
    pub fn metadata_request(reference: ChannelId) -> Self {
        Self {
            reference,
            op: SwapOp::Metadata,
            region: Region::new(0, 0, 0, 0),
            pixels: Vec::new(),
            metadata: None,
        }
    }

    pub fn read_request(reference: ChannelId, region: Region) -> Self {
        Self {
            reference,
            op: SwapOp::ReadRegion,
            region,
            pixels: Vec::new(),
            metadata: None,
        }
    }

    pub fn write_request(reference: ChannelId, region: Region, pixels: Vec<f64>) -> Self {
        Self {
            reference,
            op: SwapOp::WriteRegion,
            region,
            pixels,
            metadata: None,
        }
    }
}

/// Decode a [`RemoteData`], requiring that the payload is consumed
/// exactly. Trailing bytes mean the two sides disagree about the payload
/// layout, which is fatal for the call.
pub(crate) fn decode_exact(bytes: &[u8]) -> Result<RemoteData, RemoteError> {
    let mut cursor = std::io::Cursor::new(bytes);
    let data: RemoteData = bincode::deserialize_from(&mut cursor)?;
    let decoded = cursor.position() as usize;
    if decoded != bytes.len() {
        return Err(RemoteError::SizeMismatch {
            decoded,
            total: bytes.len(),
        });
    }
    Ok(data)
}
