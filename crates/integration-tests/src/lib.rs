//! Shared fixtures for the cross-crate tests.

use chrono::{DateTime, TimeZone, Utc};
use domains::clock::ManualClock;
use domains::models::{SubmissionOutcome, SubmissionRequest};
use domains::ports::{BanRepo, Clock, ContentModerator, TipRepo};
use services::{
    BanManager, IdentityManager, PatternModerator, RateLimiter, TipService, TipServiceConfig,
    TipServiceDeps,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const KEY: [u8; 32] = [42u8; 32];
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

/// Everything a test needs to drive submissions.
pub struct Harness {
    pub clock: ManualClock,
    pub identity: Arc<IdentityManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub bans: BanManager,
    pub tips: Arc<TipService>,
}

pub struct HarnessBuilder {
    per_hour: u32,
    key: [u8; 32],
    moderator: Arc<dyn ContentModerator>,
    tip_store: Option<Arc<dyn TipRepo>>,
    ban_store: Option<Arc<dyn BanRepo>>,
    config: TipServiceConfig,
    clock: Option<ManualClock>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            per_hour: 10,
            key: KEY,
            moderator: Arc::new(PatternModerator),
            tip_store: None,
            ban_store: None,
            config: TipServiceConfig {
                write_timeout: WRITE_TIMEOUT,
                ..TipServiceConfig::default()
            },
            clock: None,
        }
    }
}

impl HarnessBuilder {
    pub fn per_hour(mut self, per_hour: u32) -> Self {
        self.per_hour = per_hour;
        self
    }

    pub fn key(mut self, key: [u8; 32]) -> Self {
        self.key = key;
        self
    }

    pub fn moderator(mut self, moderator: Arc<dyn ContentModerator>) -> Self {
        self.moderator = moderator;
        self
    }

    pub fn tip_store(mut self, store: Arc<dyn TipRepo>) -> Self {
        self.tip_store = Some(store);
        self
    }

    pub fn ban_store(mut self, store: Arc<dyn BanRepo>) -> Self {
        self.ban_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: ManualClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Harness {
        let clock = self.clock.unwrap_or_else(|| ManualClock::new(start()));
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let identity = Arc::new(IdentityManager::new(&self.key).unwrap());
        let rate_limiter = Arc::new(RateLimiter::new(self.per_hour, shared.clone()));
        let bans = BanManager::new(self.ban_store, shared.clone(), WRITE_TIMEOUT);
        let tips = Arc::new(TipService::new(
            TipServiceDeps {
                identity: identity.clone(),
                rate_limiter: rate_limiter.clone(),
                bans: bans.clone(),
                moderator: self.moderator,
                store: self.tip_store,
                clock: shared,
            },
            self.config,
        ));
        Harness {
            clock,
            identity,
            rate_limiter,
            bans,
            tips,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub async fn submit_from(&self, address: &str, content: &str) -> SubmissionOutcome {
        self.tips
            .submit(request(address, content))
            .await
            .expect("submission errored")
    }

    pub async fn accept_from(&self, address: &str, content: &str) -> Uuid {
        match self.submit_from(address, content).await {
            SubmissionOutcome::Accepted(receipt) => receipt.tip_id,
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    pub fn throttle_key_of(&self, address: &str) -> String {
        self.identity.throttle_key(address, AGENT)
    }
}

pub const AGENT: &str = "integration/1.0";

pub fn request(address: &str, content: &str) -> SubmissionRequest {
    SubmissionRequest {
        content: content.to_string(),
        network_address: address.to_string(),
        client_signature: AGENT.to_string(),
        session_token: None,
    }
}

/// Polls `check` until it holds or two seconds pass. Store writes happen on
/// background tasks.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
