//! Control-channel messages
//!
//! The control channel (id 1) carries the handshake echo and the channel
//! open/close requests. Messages are a 4-byte little-endian type tag,
//! followed by a 4-byte little-endian channel id where applicable.

use crate::{ChannelId, ProtoError};
use bytes::{Buf, BufMut, BytesMut};

const TYPE_HANDSHAKE: u32 = 0;
const TYPE_OPEN_CHANNEL: u32 = 1;
const TYPE_CLOSE_CHANNEL: u32 = 2;

/// A message on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Connectivity check; the receiving side echoes the message verbatim.
    Handshake,
    /// Request to open a data channel. The reply payload is the raw
    /// 16-byte IV the responder generated for it.
    OpenChannel(ChannelId),
    /// Request to tear down a data channel; echoed on success.
    CloseChannel(ChannelId),
}

impl ControlMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(8);
        match self {
            ControlMessage::Handshake => buf.put_u32_le(TYPE_HANDSHAKE),
            ControlMessage::OpenChannel(id) => {
                buf.put_u32_le(TYPE_OPEN_CHANNEL);
                buf.put_u32_le(*id);
            }
            ControlMessage::CloseChannel(id) => {
                buf.put_u32_le(TYPE_CLOSE_CHANNEL);
                buf.put_u32_le(*id);
            }
        }
        buf.to_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtoError> {
        let mut buf = data;
        if buf.len() < 4 {
            return Err(ProtoError::TruncatedControl(data.len()));
        }
        let msg_type = buf.get_u32_le();

        match msg_type {
            TYPE_HANDSHAKE => Ok(ControlMessage::Handshake),
            TYPE_OPEN_CHANNEL | TYPE_CLOSE_CHANNEL => {
                if buf.len() < 4 {
                    return Err(ProtoError::TruncatedControl(data.len()));
                }
                let id = buf.get_u32_le();
                if msg_type == TYPE_OPEN_CHANNEL {
                    Ok(ControlMessage::OpenChannel(id))
                } else {
                    Ok(ControlMessage::CloseChannel(id))
                }
            }
            other => Err(ProtoError::UnknownMessageType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_round_trip() {
        let encoded = ControlMessage::Handshake.encode();
        assert_eq!(encoded, vec![0, 0, 0, 0]);
        assert_eq!(
            ControlMessage::decode(&encoded).unwrap(),
            ControlMessage::Handshake
        );
    }

    #[test]
    fn test_open_channel_round_trip() {
        let encoded = ControlMessage::OpenChannel(42).encode();
        assert_eq!(encoded.len(), 8);
        assert_eq!(
            ControlMessage::decode(&encoded).unwrap(),
            ControlMessage::OpenChannel(42)
        );
    }

    #[test]
    fn test_close_channel_round_trip() {
        let encoded = ControlMessage::CloseChannel(1337).encode();
        assert_eq!(
            ControlMessage::decode(&encoded).unwrap(),
            ControlMessage::CloseChannel(1337)
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = ControlMessage::decode(&[9, 0, 0, 0, 1, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, ProtoError::UnknownMessageType(9)));
    }

    #[test]
    fn test_truncated_rejected() {
        assert!(matches!(
            ControlMessage::decode(&[1, 0]).unwrap_err(),
            ProtoError::TruncatedControl(2)
        ));
        // OpenChannel without its channel id
        assert!(matches!(
            ControlMessage::decode(&[1, 0, 0, 0]).unwrap_err(),
            ProtoError::TruncatedControl(4)
        ));
    }
}
