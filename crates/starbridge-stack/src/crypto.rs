//! Per-channel encryption
//!
//! Every channel encrypts its payloads with AES-128-CBC and PKCS7 padding
//! under a key shared by both peers and an IV fixed at channel-open time.
//! The fixed per-channel IV is acceptable only because a channel carries a
//! bounded, short-lived sequence of request/response pairs between two
//! mutually trusted peers; this layer must not be reused as a
//! general-purpose stream cipher.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use async_trait::async_trait;
use rand::{rngs::OsRng, RngCore};
use starbridge_proto::{ChannelId, IV_LEN};
use starbridge_transport::{ChannelEndpoint, ChannelHandler, EndpointError, HandlerFuture};
use std::sync::Arc;
use thiserror::Error;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Length of a channel key in bytes (AES-128).
pub const KEY_LEN: usize = 16;

/// Encryption errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("bad key length: {0} bytes, expected 16")]
    BadKeyLength(usize),

    #[error("bad IV length: {0} bytes, expected 16")]
    BadIvLength(usize),

    #[error("decryption failed: corrupt ciphertext or wrong key/IV")]
    Decrypt,
}

/// A validated (key, IV) pair for one channel.
#[derive(Clone)]
pub struct ChannelCipher {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl ChannelCipher {
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| CryptoError::BadKeyLength(key.len()))?;
        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| CryptoError::BadIvLength(iv.len()))?;
        Ok(Self { key, iv })
    }

    /// Build from already-sized key material.
    pub fn from_parts(key: [u8; KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self { key, iv }
    }

    /// Draw a fresh random IV for a newly opened channel.
    pub fn generate_iv() -> [u8; IV_LEN] {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        iv
    }

    pub fn encrypt(&self, plain: &[u8]) -> Vec<u8> {
        Aes128CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plain)
    }

    pub fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Aes128CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(cipher)
            .map_err(|_| CryptoError::Decrypt)
    }
}

impl std::fmt::Debug for ChannelCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.debug_struct("ChannelCipher").finish_non_exhaustive()
    }
}

/// A channel endpoint that transparently encrypts outbound and decrypts
/// inbound payloads, wrapping any other [`ChannelEndpoint`].
pub struct EncryptedChannel {
    inner: Arc<dyn ChannelEndpoint>,
    cipher: ChannelCipher,
}

impl EncryptedChannel {
    pub fn new(
        inner: Arc<dyn ChannelEndpoint>,
        key: &[u8],
        iv: &[u8],
    ) -> Result<Self, CryptoError> {
        Ok(Self {
            inner,
            cipher: ChannelCipher::new(key, iv)?,
        })
    }

    /// Build from an already-validated cipher.
    pub fn with_cipher(inner: Arc<dyn ChannelEndpoint>, cipher: ChannelCipher) -> Self {
        Self { inner, cipher }
    }
}

#[async_trait]
impl ChannelEndpoint for EncryptedChannel {
    async fn send_receive(
        &self,
        channel: ChannelId,
        data: &[u8],
    ) -> Result<Vec<u8>, EndpointError> {
        let request = self.cipher.encrypt(data);
        let reply = self.inner.send_receive(channel, &request).await?;
        self.cipher
            .decrypt(&reply)
            .map_err(|e| EndpointError::Crypto(e.to_string()))
    }

    fn register_callback(&self, channel: ChannelId, handler: ChannelHandler) {
        let cipher = self.cipher.clone();
        let wrapped: ChannelHandler = Arc::new(move |data: Vec<u8>| {
            let cipher = cipher.clone();
            let handler = handler.clone();
            Box::pin(async move {
                let plain = cipher
                    .decrypt(&data)
                    .map_err(|e| EndpointError::Crypto(e.to_string()))?;
                let reply = handler(plain).await?;
                Ok(cipher.encrypt(&reply))
            }) as HandlerFuture
        });
        self.inner.register_callback(channel, wrapped);
    }

    fn unregister_callback(&self, channel: ChannelId) {
        self.inner.unregister_callback(channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let cipher = ChannelCipher::new(&[7u8; 16], &[9u8; 16]).unwrap();

        for payload in [&b""[..], b"x", b"ping", &[0u8; 4096][..]] {
            let ct = cipher.encrypt(payload);
            assert_ne!(ct.as_slice(), payload);
            assert_eq!(ct.len() % 16, 0);
            assert_eq!(cipher.decrypt(&ct).unwrap(), payload);
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let a = ChannelCipher::new(&[1u8; 16], &[0u8; 16]).unwrap();
        let b = ChannelCipher::new(&[2u8; 16], &[0u8; 16]).unwrap();

        let ct = a.encrypt(b"classified");
        assert!(b.decrypt(&ct).is_err());
    }

    #[test]
    fn test_corrupt_ciphertext_fails() {
        let cipher = ChannelCipher::new(&[3u8; 16], &[4u8; 16]).unwrap();
        let mut ct = cipher.encrypt(b"payload bytes here");

        let last = ct.len() - 1;
        ct[last] ^= 0xFF;
        assert!(matches!(cipher.decrypt(&ct), Err(CryptoError::Decrypt)));

        // Truncation to a non-block size is also rejected.
        let ct = cipher.encrypt(b"payload bytes here");
        assert!(cipher.decrypt(&ct[..ct.len() - 3]).is_err());
    }

    #[test]
    fn test_key_and_iv_lengths_validated() {
        assert!(matches!(
            ChannelCipher::new(&[0u8; 15], &[0u8; 16]),
            Err(CryptoError::BadKeyLength(15))
        ));
        assert!(matches!(
            ChannelCipher::new(&[0u8; 16], &[0u8; 8]),
            Err(CryptoError::BadIvLength(8))
        ));
    }

    #[test]
    fn test_generate_iv() {
        let a = ChannelCipher::generate_iv();
        let b = ChannelCipher::generate_iv();
        assert_eq!(a.len(), IV_LEN);
        assert_ne!(a, b);
    }
}
