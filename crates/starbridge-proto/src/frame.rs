//! Channel-id framing
//!
//! Every message on a connection is prefixed with the 4-byte little-endian
//! id of the channel it belongs to. The transport delivers whole messages,
//! so no payload length field is carried here.

use crate::{ChannelId, ProtoError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A framed wire message: channel id plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub channel: ChannelId,
    pub payload: Bytes,
}

impl Frame {
    /// Frame header size: channel id (4 bytes)
    pub const HEADER_SIZE: usize = 4;

    pub fn new(channel: ChannelId, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }

    /// Encode the frame to wire bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::HEADER_SIZE + self.payload.len());
        buf.put_u32_le(self.channel);
        buf.put(self.payload.clone());
        buf.freeze()
    }

    /// Decode a frame from one whole transport message.
    pub fn decode(mut buf: Bytes) -> Result<Self, ProtoError> {
        if buf.len() < Self::HEADER_SIZE {
            return Err(ProtoError::TruncatedFrame(buf.len(), Self::HEADER_SIZE));
        }

        let channel = buf.get_u32_le();

        Ok(Self {
            channel,
            payload: buf,
        })
    }
}
