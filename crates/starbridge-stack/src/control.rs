//! Control protocol handlers
//!
//! Channel 0 carries the plaintext greeting; channel 1 carries encrypted
//! control messages. Both handlers live here, built over the shared stack
//! state so either peer can answer handshake, open and close requests.

use crate::crypto::{ChannelCipher, EncryptedChannel};
use crate::stack::StackShared;
use starbridge_proto::{ControlMessage, CLIENT_GREETING, SERVER_GREETING};
use starbridge_transport::{callback_fn, ChannelEndpoint, ChannelHandler};
use std::sync::Arc;
use tracing::{debug, warn};

/// Handler for the plaintext greeting on channel 0 (listening side).
///
/// Replies with the server greeting only to the exact client greeting; an
/// empty reply tells a misbehaving peer nothing about what runs here.
pub(crate) fn greeting_handler() -> ChannelHandler {
    callback_fn(|data: Vec<u8>| async move {
        if data == CLIENT_GREETING {
            Ok(SERVER_GREETING.to_vec())
        } else {
            warn!(
                "unexpected greeting from peer ({} bytes), ignoring",
                data.len()
            );
            Ok(Vec::new())
        }
    })
}

/// Handler for control messages on channel 1.
///
/// Decoding is exhaustive over the closed message set; anything malformed
/// propagates as an error, which the dispatch layer logs and answers with
/// an empty reply.
pub(crate) fn control_handler(shared: Arc<StackShared>) -> ChannelHandler {
    callback_fn(move |data: Vec<u8>| {
        let shared = shared.clone();
        async move {
            let message = ControlMessage::decode(&data)?;

            match message {
                ControlMessage::Handshake => Ok(data),
                ControlMessage::OpenChannel(id) => {
                    let iv = ChannelCipher::generate_iv();
                    let channel = Arc::new(EncryptedChannel::with_cipher(
                        shared.endpoint.clone() as Arc<dyn ChannelEndpoint>,
                        ChannelCipher::from_parts(shared.key, iv),
                    ));
                    shared.channels.insert(id, channel);
                    debug!("opened channel {} on peer request", id);
                    Ok(iv.to_vec())
                }
                ControlMessage::CloseChannel(id) => {
                    shared.endpoint.unregister_callback(id);
                    shared.channels.remove(&id);
                    debug!("closed channel {} on peer request", id);
                    Ok(data)
                }
            }
        }
    })
}
