//! # auth-adapters
//!
//! Argon2 implementation of the `AdminVerifier` port, plus the helper used
//! to produce the configured hash in the first place.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use domains::ports::AdminVerifier;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("failed to gather salt entropy: {0}")]
    Entropy(String),

    #[error("failed to hash password: {0}")]
    Hash(String),

    #[error("configured admin hash is not a valid PHC string: {0}")]
    InvalidHash(String),
}

pub struct Argon2AdminVerifier {
    /// PHC-format argon2 hash. `None` disables every admin route.
    hash: Option<Arc<SecretString>>,
}

impl Argon2AdminVerifier {
    /// Rejects a malformed hash up front instead of failing every login.
    pub fn new(hash: Option<SecretString>) -> Result<Self, AuthError> {
        if let Some(hash) = &hash {
            PasswordHash::new(hash.expose_secret())
                .map_err(|e| AuthError::InvalidHash(e.to_string()))?;
        } else {
            warn!("no admin password hash configured, admin routes are disabled");
        }
        Ok(Self {
            hash: hash.map(Arc::new),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.hash.is_some()
    }
}

#[async_trait]
impl AdminVerifier for Argon2AdminVerifier {
    /// Verifies `presented` against the stored hash on the blocking pool,
    /// argon2 being deliberately slow.
    async fn verify(&self, presented: &str) -> bool {
        let Some(hash) = self.hash.clone() else {
            return false;
        };
        let presented = presented.to_string();

        let outcome = tokio::task::spawn_blocking(move || {
            let parsed_hash = match PasswordHash::new(hash.expose_secret()) {
                Ok(p) => p,
                Err(_) => return false,
            };
            Argon2::default()
                .verify_password(presented.as_bytes(), &parsed_hash)
                .is_ok()
        })
        .await;

        match outcome {
            Ok(verified) => verified,
            Err(e) => {
                error!(error = %e, "admin verification task failed");
                false
            }
        }
    }
}

/// Hashes `password` with a fresh random salt, returning a PHC string
/// suitable for `security.admin_password_hash`.
pub fn hash_admin_password(password: &str) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| AuthError::Entropy(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hash(e.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}
