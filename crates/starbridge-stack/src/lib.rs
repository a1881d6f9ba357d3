//! Starbridge network stack
//!
//! Orchestrates a secure, multiplexed request/response connection between
//! two peers: the plaintext greeting on channel 0, the encrypted control
//! protocol on channel 1 (handshake, channel open/close), and the set of
//! live encrypted data channels. Application code talks to channels
//! through the same [`ChannelEndpoint`](starbridge_transport::ChannelEndpoint)
//! contract the raw transport exposes; encryption is a transparent layer
//! in between.

pub mod control;
pub mod crypto;
pub mod stack;

pub use crypto::{ChannelCipher, CryptoError, EncryptedChannel, KEY_LEN};
pub use stack::{Stack, StackConfig, StackError, StackListener};
