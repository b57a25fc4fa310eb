//! In-memory stores backed by `DashMap`.
//!
//! Both stores carry an availability switch so callers can exercise the
//! degraded paths without a real outage.

use async_trait::async_trait;
use dashmap::DashMap;
use domains::models::{Ban, Tip};
use domains::ports::{BanRepo, TipRepo};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::StoreError;

#[derive(Debug)]
struct Availability(AtomicBool);

impl Default for Availability {
    fn default() -> Self {
        Self(AtomicBool::new(true))
    }
}

impl Availability {
    fn check(&self) -> Result<(), StoreError> {
        if self.0.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryTipStore {
    tips: DashMap<Uuid, Tip>,
    available: Availability,
}

impl MemoryTipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.0.store(available, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.tips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tips.is_empty()
    }
}

#[async_trait]
impl TipRepo for MemoryTipStore {
    async fn save_tip(&self, tip: &Tip) -> anyhow::Result<()> {
        self.available.check()?;
        self.tips.insert(tip.id, tip.clone());
        Ok(())
    }

    async fn get_tip(&self, id: Uuid) -> anyhow::Result<Option<Tip>> {
        self.available.check()?;
        Ok(self.tips.get(&id).map(|entry| entry.value().clone()))
    }

    async fn recent_tips(&self, limit: usize) -> anyhow::Result<Vec<Tip>> {
        self.available.check()?;
        let mut tips: Vec<Tip> = self.tips.iter().map(|e| e.value().clone()).collect();
        tips.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then(b.id.cmp(&a.id)));
        tips.truncate(limit);
        Ok(tips)
    }
}

#[derive(Debug, Default)]
pub struct MemoryBanStore {
    bans: DashMap<String, Ban>,
    available: Availability,
}

impl MemoryBanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.0.store(available, Ordering::Relaxed);
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.bans.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.bans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bans.is_empty()
    }
}

#[async_trait]
impl BanRepo for MemoryBanStore {
    async fn put_ban(&self, ban: &Ban) -> anyhow::Result<()> {
        self.available.check()?;
        self.bans.insert(ban.identifier.clone(), ban.clone());
        Ok(())
    }

    async fn delete_ban(&self, identifier: &str) -> anyhow::Result<()> {
        self.available.check()?;
        self.bans.remove(identifier);
        Ok(())
    }

    async fn scan_bans(&self) -> anyhow::Result<Vec<Ban>> {
        self.available.check()?;
        Ok(self.bans.iter().map(|e| e.value().clone()).collect())
    }
}
