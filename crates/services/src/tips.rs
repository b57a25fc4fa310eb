//! # Tip Service
//!
//! Orchestrates one submission through
//! validate → identify → ban check → rate check → moderate → accept.
//! Every non-accepted outcome leaves no tip behind and nothing queued.

use domains::error::{AppError, Result};
use domains::models::{
    BanStatus, InteractionContext, ModerationStatus, ModerationVerdict, PublicTip, RequestMetadata,
    SubmissionOutcome, SubmissionReceipt, SubmissionRequest, Tip,
};
use domains::ports::{Clock, ContentModerator, TipRepo};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ban_manager::BanManager;
use crate::context::{InteractionContextService, TIP_SUBMISSION};
use crate::identity::IdentityManager;
use crate::keywords::extract_keywords;
use crate::pending::PendingTipQueue;
use crate::rate_limiter::RateLimiter;
use crate::validation::validate_content;

#[derive(Debug, Clone)]
pub struct TipServiceConfig {
    pub max_length: usize,
    /// Tips kept in memory, oldest evicted first. Also bounds the pending
    /// queue.
    pub recent_capacity: usize,
    /// Tips returned by the public listing
    pub listing_limit: usize,
    pub pending_batch: usize,
    pub moderation_timeout: Duration,
    pub write_timeout: Duration,
    pub retain_submitter_address: bool,
}

impl Default for TipServiceConfig {
    fn default() -> Self {
        Self {
            max_length: 1000,
            recent_capacity: 100,
            listing_limit: 20,
            pending_batch: crate::pending::MAX_BATCH,
            moderation_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(3),
            retain_submitter_address: false,
        }
    }
}

/// Collaborators of the tip service.
pub struct TipServiceDeps {
    pub identity: Arc<IdentityManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub bans: BanManager,
    pub moderator: Arc<dyn ContentModerator>,
    /// `None` runs memory-only
    pub store: Option<Arc<dyn TipRepo>>,
    pub clock: Arc<dyn Clock>,
}

pub struct TipService {
    identity: Arc<IdentityManager>,
    rate_limiter: Arc<RateLimiter>,
    bans: BanManager,
    moderator: Arc<dyn ContentModerator>,
    store: Option<Arc<dyn TipRepo>>,
    clock: Arc<dyn Clock>,
    recent: RwLock<VecDeque<Tip>>,
    pending: PendingTipQueue,
    context: InteractionContextService,
    config: TipServiceConfig,
}

impl TipService {
    pub fn new(deps: TipServiceDeps, config: TipServiceConfig) -> Self {
        Self {
            identity: deps.identity,
            rate_limiter: deps.rate_limiter,
            bans: deps.bans,
            moderator: deps.moderator,
            store: deps.store,
            clock: deps.clock,
            recent: RwLock::new(VecDeque::with_capacity(config.recent_capacity)),
            pending: PendingTipQueue::new(config.pending_batch, config.recent_capacity),
            context: InteractionContextService::new(),
            config,
        }
    }

    pub async fn submit(&self, request: SubmissionRequest) -> Result<SubmissionOutcome> {
        validate_content(&request.content, self.config.max_length)?;

        let now = self.clock.now();
        let metadata = RequestMetadata {
            network_address: request.network_address.clone(),
            client_signature: request.client_signature.clone(),
            captured_at: now,
            session_token: request.session_token.clone(),
        };
        let identity = self.identity.derive(&metadata).map_err(|e| {
            error!(error = %e, "failed to derive anonymous identity");
            AppError::Internal("failed to derive anonymous identity".to_string())
        })?;

        if let BanStatus::Banned { reason, expires_at } =
            self.bans.is_banned(&identity.throttle_key).await
        {
            info!(identity = %identity.display_hash, %expires_at, "submission from banned actor refused");
            return Ok(SubmissionOutcome::Banned { reason, expires_at });
        }

        let quota = self.rate_limiter.check_and_record(&identity.throttle_key);
        if !quota.allowed {
            info!(identity = %identity.display_hash, reset_at = %quota.reset_at, "submission rate limited");
            return Ok(SubmissionOutcome::RateLimited {
                reset_at: quota.reset_at,
            });
        }

        let verdict = self.moderate(&request.content).await?;
        if verdict.status == ModerationStatus::Rejected {
            let reason = verdict
                .reason
                .unwrap_or_else(|| "Content rejected by moderation".to_string());
            info!(identity = %identity.display_hash, %reason, "submission rejected by moderation");
            return Ok(SubmissionOutcome::Rejected { reason });
        }

        let keywords = extract_keywords(&verdict.moderated_text);
        let tip = Tip {
            id: Uuid::now_v7(),
            content: request.content,
            moderated_content: verdict.moderated_text,
            identity_hash: identity.display_hash.clone(),
            encrypted_owner: identity.encrypted_blob,
            status: verdict.status,
            moderation_reason: verdict.reason,
            keywords,
            submitted_at: now,
            submitter_address: self
                .config
                .retain_submitter_address
                .then_some(request.network_address),
        };

        self.remember(tip.clone()).await;
        self.pending.push(tip.id).await;
        self.persist(tip.clone());
        self.context
            .record(
                TIP_SUBMISSION,
                tip.keywords.clone(),
                tip.id.to_string(),
                tip.moderated_content.clone(),
                now,
            )
            .await;

        info!(tip_id = %tip.id, status = %tip.status, identity = %tip.identity_hash, "anonymous tip accepted");

        Ok(SubmissionOutcome::Accepted(SubmissionReceipt {
            tip_id: tip.id,
            identity_hash: tip.identity_hash,
            moderated: tip.status == ModerationStatus::Redacted,
            reason: tip.moderation_reason,
            remaining: quota.remaining,
        }))
    }

    /// Public view of one tip, from memory first, then the store.
    pub async fn get_tip(&self, id: Uuid) -> Result<PublicTip> {
        self.find_tip(id)
            .await
            .map(|tip| tip.to_public())
            .ok_or_else(|| AppError::NotFound("Tip".to_string(), id.to_string()))
    }

    /// Most recent approved or redacted tips, newest first.
    pub async fn list_recent(&self) -> Vec<PublicTip> {
        let limit = self.config.listing_limit;
        let in_memory: Vec<PublicTip> = self
            .recent
            .read()
            .await
            .iter()
            .rev()
            .filter(|tip| tip.status.is_listable())
            .take(limit)
            .map(Tip::to_public)
            .collect();

        if !in_memory.is_empty() {
            return in_memory;
        }

        // Cold start: fall back to whatever the store remembers.
        let Some(store) = self.store.as_ref() else {
            return in_memory;
        };
        match tokio::time::timeout(self.config.write_timeout, store.recent_tips(limit)).await {
            Ok(Ok(tips)) => tips
                .iter()
                .filter(|tip| tip.status.is_listable())
                .take(limit)
                .map(Tip::to_public)
                .collect(),
            Ok(Err(e)) => {
                warn!(error = %e, "failed to list tips from store");
                in_memory
            }
            Err(_) => {
                warn!("timed out listing tips from store");
                in_memory
            }
        }
    }

    pub async fn take_pending_batch(&self) -> Vec<Uuid> {
        let batch = self.pending.take_batch().await;
        if !batch.is_empty() {
            debug!(count = batch.len(), "pending tips handed downstream");
        }
        batch
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.len().await
    }

    pub async fn last_interaction(&self) -> Option<InteractionContext> {
        self.context.current().await
    }

    pub async fn recent_len(&self) -> usize {
        self.recent.read().await.len()
    }

    /// Full record including the encrypted owner. Crate-internal so the
    /// blob only leaves through the admin service.
    pub(crate) async fn find_tip(&self, id: Uuid) -> Option<Tip> {
        if let Some(tip) = self.recent.read().await.iter().find(|t| t.id == id) {
            return Some(tip.clone());
        }

        let store = self.store.as_ref()?;
        match tokio::time::timeout(self.config.write_timeout, store.get_tip(id)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                warn!(tip_id = %id, error = %e, "tip store lookup failed");
                None
            }
            Err(_) => {
                warn!(tip_id = %id, "tip store lookup timed out");
                None
            }
        }
    }

    /// Fails closed: an unreachable moderator never approves anything.
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict> {
        match tokio::time::timeout(self.config.moderation_timeout, self.moderator.moderate(text))
            .await
        {
            Ok(Ok(verdict)) => Ok(verdict),
            Ok(Err(e)) => {
                warn!(error = %e, "content moderator failed");
                Err(AppError::DependencyUnavailable(
                    "content moderation is unavailable, please retry".to_string(),
                ))
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.moderation_timeout.as_millis() as u64,
                    "content moderator timed out"
                );
                Err(AppError::DependencyUnavailable(
                    "content moderation is unavailable, please retry".to_string(),
                ))
            }
        }
    }

    async fn remember(&self, tip: Tip) {
        let mut recent = self.recent.write().await;
        recent.push_back(tip);
        while recent.len() > self.config.recent_capacity {
            recent.pop_front();
        }
    }

    /// Fire-and-forget; a failed write never un-accepts the tip.
    fn persist(&self, tip: Tip) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let timeout = self.config.write_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, store.save_tip(&tip)).await {
                Ok(Ok(())) => debug!(tip_id = %tip.id, "tip persisted"),
                Ok(Err(e)) => warn!(tip_id = %tip.id, error = %e, "failed to persist tip"),
                Err(_) => warn!(tip_id = %tip.id, "timed out persisting tip"),
            }
        });
    }
}
