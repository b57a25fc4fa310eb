//! # Admin Service
//!
//! Privileged operations. Every entry point takes an [`AdminGrant`], and the
//! only way to get one is [`AdminService::authorize`].

use chrono::Duration;
use domains::error::{AppError, Result};
use domains::models::{Ban, RequestMetadata};
use domains::ports::AdminVerifier;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ban_manager::BanManager;
use crate::identity::{AdminGrant, IdentityError, IdentityManager};
use crate::tips::TipService;

pub struct AdminService {
    verifier: Arc<dyn AdminVerifier>,
    identity: Arc<IdentityManager>,
    tips: Arc<TipService>,
    bans: BanManager,
}

impl AdminService {
    pub fn new(
        verifier: Arc<dyn AdminVerifier>,
        identity: Arc<IdentityManager>,
        tips: Arc<TipService>,
        bans: BanManager,
    ) -> Self {
        Self {
            verifier,
            identity,
            tips,
            bans,
        }
    }

    pub async fn authorize(&self, presented: &str) -> Result<AdminGrant> {
        if presented.is_empty() || !self.verifier.verify(presented).await {
            warn!("admin credential check failed");
            return Err(AdminError::Unauthorized.into());
        }
        Ok(AdminGrant::issue())
    }

    /// Decrypts the metadata captured when the tip was submitted.
    pub async fn reveal_submitter(&self, _grant: &AdminGrant, tip_id: Uuid) -> Result<RequestMetadata> {
        let tip = self
            .tips
            .find_tip(tip_id)
            .await
            .ok_or_else(|| AppError::NotFound("Tip".to_string(), tip_id.to_string()))?;

        let metadata = self.reverse(&tip.encrypted_owner)?;
        info!(tip_id = %tip_id, identity = %tip.identity_hash, "admin revealed tip submitter");
        Ok(metadata)
    }

    pub async fn ban_identifier(
        &self,
        _grant: &AdminGrant,
        identifier: &str,
        duration: Duration,
        reason: &str,
    ) -> Result<Ban> {
        self.bans.ban(identifier, duration, reason, "admin").await
    }

    /// Bans whoever submitted `tip_id`, keyed the same way submissions are
    /// throttled so the ban binds on their next attempt.
    pub async fn ban_submitter(
        &self,
        _grant: &AdminGrant,
        tip_id: Uuid,
        duration: Duration,
        reason: &str,
    ) -> Result<Ban> {
        let tip = self
            .tips
            .find_tip(tip_id)
            .await
            .ok_or_else(|| AppError::NotFound("Tip".to_string(), tip_id.to_string()))?;

        let metadata = self.reverse(&tip.encrypted_owner)?;
        let key = self
            .identity
            .throttle_key(&metadata.network_address, &metadata.client_signature);

        info!(tip_id = %tip_id, identity = %tip.identity_hash, "banning tip submitter");
        self.bans.ban(&key, duration, reason, "admin").await
    }

    pub async fn lift_ban(&self, _grant: &AdminGrant, identifier: &str) -> Result<bool> {
        self.bans.unban(identifier).await
    }

    pub async fn active_bans(&self, _grant: &AdminGrant) -> Vec<Ban> {
        self.bans.active_bans().await
    }

    fn reverse(&self, encrypted_owner: &str) -> Result<RequestMetadata> {
        self.identity
            .reverse(encrypted_owner, &AdminGrant::issue())
            .map_err(|e| AdminError::Reveal(e).into())
    }
}

#[derive(thiserror::Error, Debug)]
enum AdminError {
    #[error("invalid admin credentials")]
    Unauthorized,
    #[error("could not decrypt submitter metadata: {0}")]
    Reveal(#[from] IdentityError),
}

impl From<AdminError> for AppError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::Unauthorized => AppError::Unauthorized(err.to_string()),
            AdminError::Reveal(_) => AppError::CryptoFailure(err.to_string()),
        }
    }
}
