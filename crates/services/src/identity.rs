//! # Identity Manager
//!
//! Turns request metadata into a per-submission anonymous identity:
//!
//! - `encrypted_blob`: base64(nonce || XChaCha20-Poly1305 ciphertext) of the
//!   JSON-serialized [`RequestMetadata`]. Reversible only with the key.
//! - `display_hash`: `user_` + 12 hex chars of SHA-256 over the blob. Since
//!   the nonce is fresh per call, the same caller gets a new hash every time.
//! - `throttle_key`: HMAC-SHA256 of (address, client signature) under a
//!   subkey. Stable per actor so bans and quotas bind, never stored.
//!
//! Reversal requires an [`AdminGrant`], which only the admin service can
//! issue after verifying credentials.

use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    XChaCha20Poly1305, XNonce,
};
use domains::models::{AnonymousIdentity, RequestMetadata};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Required key length in bytes (256-bit).
pub const KEY_LEN: usize = 32;
/// XChaCha20 nonce length in bytes.
pub const NONCE_LEN: usize = 24;

const DISPLAY_HASH_BYTES: usize = 6;
const THROTTLE_SUBKEY_LABEL: &[u8] = b"tipline/throttle-key/v1";

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("encryption key must be exactly {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("failed to serialize metadata: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("encryption failed")]
    Encryption,

    #[error("encrypted metadata is not valid base64")]
    Encoding(#[from] base64::DecodeError),

    #[error("encrypted metadata is truncated")]
    Truncated,

    /// Tampered blob or wrong key
    #[error("authentication failed while decrypting metadata")]
    Authentication,

    #[error("decrypted metadata is malformed")]
    Malformed,
}

/// Capability proving the holder passed the admin credential check.
#[derive(Debug)]
pub struct AdminGrant {
    _private: (),
}

impl AdminGrant {
    pub(crate) fn issue() -> Self {
        Self { _private: () }
    }
}

pub struct IdentityManager {
    cipher: XChaCha20Poly1305,
    /// HMAC keyed with the throttle subkey, cloned per use
    throttle_mac: HmacSha256,
}

impl std::fmt::Debug for IdentityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityManager").finish_non_exhaustive()
    }
}

impl IdentityManager {
    pub fn new(key: &[u8]) -> Result<Self, IdentityError> {
        if key.len() != KEY_LEN {
            return Err(IdentityError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            });
        }

        let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| {
            IdentityError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            }
        })?;

        // Separate subkey so the AEAD key is never used as a MAC key.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| {
            IdentityError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            }
        })?;
        mac.update(THROTTLE_SUBKEY_LABEL);
        let throttle_subkey = Zeroizing::new(mac.finalize().into_bytes().to_vec());
        let throttle_mac = <HmacSha256 as Mac>::new_from_slice(throttle_subkey.as_slice())
            .map_err(|_| IdentityError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            })?;

        Ok(Self {
            cipher,
            throttle_mac,
        })
    }

    pub fn derive(&self, metadata: &RequestMetadata) -> Result<AnonymousIdentity, IdentityError> {
        let plaintext = Zeroizing::new(serde_json::to_vec(metadata)?);

        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| IdentityError::Encryption)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        let encrypted_blob = STANDARD.encode(&sealed);
        let display_hash = display_hash_of(&encrypted_blob);
        let throttle_key = self.throttle_key(&metadata.network_address, &metadata.client_signature);

        Ok(AnonymousIdentity {
            display_hash,
            encrypted_blob,
            throttle_key,
        })
    }

    /// Decrypts a blob produced by [`IdentityManager::derive`]. Either the
    /// whole metadata record comes back or an error does.
    pub fn reverse(
        &self,
        encrypted_blob: &str,
        _grant: &AdminGrant,
    ) -> Result<RequestMetadata, IdentityError> {
        let sealed = STANDARD.decode(encrypted_blob)?;
        if sealed.len() <= NONCE_LEN {
            return Err(IdentityError::Truncated);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = Zeroizing::new(
            self.cipher
                .decrypt(XNonce::from_slice(nonce), ciphertext)
                .map_err(|_| IdentityError::Authentication)?,
        );

        serde_json::from_slice(plaintext.as_slice()).map_err(|_| IdentityError::Malformed)
    }

    /// Keyed digest of the actor. Deterministic for a given key.
    pub fn throttle_key(&self, network_address: &str, client_signature: &str) -> String {
        let mut mac = self.throttle_mac.clone();
        mac.update(network_address.as_bytes());
        mac.update(&[0]);
        mac.update(client_signature.as_bytes());
        let digest = mac.finalize().into_bytes();
        format!("tk_{}", hex::encode(&digest[..16]))
    }
}

/// Short display hash computed over the encrypted blob, never the plaintext.
pub fn display_hash_of(encrypted_blob: &str) -> String {
    let digest = Sha256::digest(encrypted_blob.as_bytes());
    format!("user_{}", hex::encode(&digest[..DISPLAY_HASH_BYTES]))
}
