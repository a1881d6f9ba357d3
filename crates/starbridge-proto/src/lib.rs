//! Starbridge Protocol Definitions
//!
//! This crate defines the wire-level building blocks of the starbridge
//! network stack: channel-id framing, the control-channel message types,
//! and the reserved protocol constants shared by both peers.

pub mod control;
pub mod frame;

pub use control::ControlMessage;
pub use frame::Frame;

use thiserror::Error;

/// Channel identifier, unique per logical conversation on one connection.
pub type ChannelId = u32;

/// Reserved channel carrying the plaintext greeting exchange.
pub const GREETING_CHANNEL: ChannelId = 0;

/// Reserved channel carrying encrypted control messages.
pub const CONTROL_CHANNEL: ChannelId = 1;

/// First channel id handed out for data channels. Ids below this are
/// reserved; allocation is sequential and ids are never reused while open.
pub const FIRST_DATA_CHANNEL: ChannelId = 10;

/// Greeting sent by the connecting side on [`GREETING_CHANNEL`].
pub const CLIENT_GREETING: &[u8] = b"WNS-C";

/// Greeting the listening side must answer with, byte for byte.
pub const SERVER_GREETING: &[u8] = b"WNS-S";

/// Length of a channel initialization vector in bytes.
pub const IV_LEN: usize = 16;

/// Fixed IV of the control channel. Data channels negotiate a fresh IV at
/// open time; the control channel must be usable before any negotiation
/// has happened, so its IV is a protocol constant.
pub const CONTROL_IV: [u8; IV_LEN] = *b"WebrellaNetStack";

/// Protocol-level decoding errors.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("truncated frame: {0} bytes, need at least {1}")]
    TruncatedFrame(usize, usize),

    #[error("truncated control message: {0} bytes")]
    TruncatedControl(usize),

    #[error("unknown control message type: {0}")]
    UnknownMessageType(u32),

    #[error("bad IV length: {0} bytes, expected {IV_LEN}")]
    BadIvLength(usize),
}
