//! # Ports
//!
//! Any adapter must implement these traits to be wired in by the binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Ban, ModerationVerdict, Tip};

/// Durable persistence for accepted tips.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TipRepo: Send + Sync {
    async fn save_tip(&self, tip: &Tip) -> anyhow::Result<()>;
    async fn get_tip(&self, id: Uuid) -> anyhow::Result<Option<Tip>>;
    /// Most recent first.
    async fn recent_tips(&self, limit: usize) -> anyhow::Result<Vec<Tip>>;
}

/// Durable persistence for bans, keyed by identifier.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BanRepo: Send + Sync {
    /// Inserts or replaces the ban for `ban.identifier`.
    async fn put_ban(&self, ban: &Ban) -> anyhow::Result<()>;
    async fn delete_ban(&self, identifier: &str) -> anyhow::Result<()>;
    async fn scan_bans(&self) -> anyhow::Result<Vec<Ban>>;
}

/// Opaque content classifier.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ContentModerator: Send + Sync {
    async fn moderate(&self, text: &str) -> anyhow::Result<ModerationVerdict>;
}

/// Verifies credentials presented on privileged routes.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AdminVerifier: Send + Sync {
    async fn verify(&self, presented: &str) -> bool;
}

/// Wall-clock source. Swapped for a manual clock in tests.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
