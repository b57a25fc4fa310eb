//! # Ban Manager
//!
//! Write-through cache of bans. Memory is authoritative for enforcement; the
//! optional [`BanRepo`] keeps bans across restarts.
//!
//! Store writes never carry the operation itself. A write task re-reads the
//! in-memory state for the identifier and mirrors it (put if present, delete
//! if absent), so out-of-order or retried writes converge on memory. Failed
//! writes are remembered and replayed by [`BanManager::sweep`].

use chrono::Duration;
use domains::error::{AppError, Result};
use domains::models::{Ban, BanStatus};
use domains::ports::{BanRepo, Clock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

struct Shared {
    bans: RwLock<HashMap<String, Ban>>,
    store: Option<Arc<dyn BanRepo>>,
    /// identifiers whose store copy may disagree with memory
    unsynced: Mutex<HashSet<String>>,
    /// serializes store writes so mirrors are not interleaved
    write_gate: Mutex<()>,
    degraded: AtomicBool,
    loaded: AtomicBool,
    write_timeout: std::time::Duration,
}

#[derive(Clone)]
pub struct BanManager {
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
}

impl BanManager {
    /// Without a store the manager runs memory-only and reports degraded.
    pub fn new(
        store: Option<Arc<dyn BanRepo>>,
        clock: Arc<dyn Clock>,
        write_timeout: std::time::Duration,
    ) -> Self {
        let memory_only = store.is_none();
        Self {
            shared: Arc::new(Shared {
                bans: RwLock::new(HashMap::new()),
                store,
                unsynced: Mutex::new(HashSet::new()),
                write_gate: Mutex::new(()),
                degraded: AtomicBool::new(memory_only),
                loaded: AtomicBool::new(false),
                write_timeout,
            }),
            clock,
        }
    }

    pub async fn is_banned(&self, identifier: &str) -> BanStatus {
        let now = self.clock.now();
        {
            let bans = self.shared.bans.read().await;
            match bans.get(identifier) {
                None => return BanStatus::NotBanned,
                Some(ban) if !ban.is_expired_at(now) => {
                    return BanStatus::Banned {
                        reason: ban.reason.clone(),
                        expires_at: ban.expires_at,
                    }
                }
                Some(_) => {}
            }
        }

        // Expired: drop it, re-checking under the write lock in case it was
        // renewed in between.
        let mut bans = self.shared.bans.write().await;
        if let Some(ban) = bans.get(identifier) {
            if !ban.is_expired_at(now) {
                return BanStatus::Banned {
                    reason: ban.reason.clone(),
                    expires_at: ban.expires_at,
                };
            }
            bans.remove(identifier);
            debug!(identifier, "expired ban removed on read");
            drop(bans);
            self.spawn_sync(identifier.to_string());
        }
        BanStatus::NotBanned
    }

    pub async fn ban(
        &self,
        identifier: &str,
        duration: Duration,
        reason: &str,
        imposed_by: &str,
    ) -> Result<Ban> {
        if identifier.trim().is_empty() {
            return Err(AppError::ValidationError(
                "ban identifier must not be empty".to_string(),
            ));
        }
        if duration <= Duration::zero() {
            return Err(AppError::ValidationError(
                "ban duration must be positive".to_string(),
            ));
        }

        let now = self.clock.now();
        let expires_at = now.checked_add_signed(duration).ok_or_else(|| {
            AppError::ValidationError("ban duration out of range".to_string())
        })?;
        let ban = Ban {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
            expires_at,
            imposed_at: now,
            imposed_by: imposed_by.to_string(),
        };

        self.shared
            .bans
            .write()
            .await
            .insert(identifier.to_string(), ban.clone());
        info!(identifier, expires_at = %ban.expires_at, imposed_by, "ban imposed");

        self.spawn_sync(identifier.to_string());
        Ok(ban)
    }

    /// Returns whether a ban was present in memory.
    pub async fn unban(&self, identifier: &str) -> Result<bool> {
        let removed = self.shared.bans.write().await.remove(identifier).is_some();
        info!(identifier, removed, "ban lifted");

        // Mirror even when memory had nothing; the store may still hold it.
        self.spawn_sync(identifier.to_string());
        Ok(removed)
    }

    /// Warms the cache from the store. Meant to run once on a background
    /// task at startup. Bans imposed since startup win over stored ones.
    pub async fn load_from_store(&self) -> usize {
        let Some(store) = self.shared.store.as_ref() else {
            warn!("no ban store configured, bans are memory-only and will not survive a restart");
            return 0;
        };

        let scanned = match tokio::time::timeout(self.shared.write_timeout, store.scan_bans()).await
        {
            Ok(Ok(bans)) => bans,
            Ok(Err(e)) => {
                warn!(error = %e, "failed to load bans from store, running memory-only");
                self.shared.degraded.store(true, Ordering::Relaxed);
                return 0;
            }
            Err(_) => {
                warn!("timed out loading bans from store, running memory-only");
                self.shared.degraded.store(true, Ordering::Relaxed);
                return 0;
            }
        };

        let now = self.clock.now();
        let mut loaded = 0;
        {
            let mut bans = self.shared.bans.write().await;
            for ban in scanned.into_iter().filter(|b| !b.is_expired_at(now)) {
                bans.entry(ban.identifier.clone()).or_insert_with(|| {
                    loaded += 1;
                    ban
                });
            }
        }

        self.shared.loaded.store(true, Ordering::Relaxed);
        self.refresh_degraded().await;
        info!(loaded, "active bans loaded from store");
        loaded
    }

    /// Drops expired bans (memory and store) and replays unsynced writes.
    /// Returns the number of expired bans removed.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<String> = {
            let mut bans = self.shared.bans.write().await;
            let expired: Vec<String> = bans
                .values()
                .filter(|b| b.is_expired_at(now))
                .map(|b| b.identifier.clone())
                .collect();
            for identifier in &expired {
                bans.remove(identifier);
            }
            expired
        };

        if self.shared.store.is_some() {
            if !self.shared.loaded.load(Ordering::Relaxed) {
                self.load_from_store().await;
            }

            let pending: Vec<String> = {
                let mut unsynced = self.shared.unsynced.lock().await;
                unsynced.extend(expired.iter().cloned());
                unsynced.iter().cloned().collect()
            };
            for identifier in pending {
                sync_identifier(&self.shared, identifier).await;
            }
            self.refresh_degraded().await;
        }

        if !expired.is_empty() {
            debug!(removed = expired.len(), "ban sweep removed expired bans");
        }
        expired.len()
    }

    pub fn is_degraded(&self) -> bool {
        self.shared.degraded.load(Ordering::Relaxed)
    }

    pub async fn active_bans(&self) -> Vec<Ban> {
        let now = self.clock.now();
        let mut bans: Vec<Ban> = self
            .shared
            .bans
            .read()
            .await
            .values()
            .filter(|b| !b.is_expired_at(now))
            .cloned()
            .collect();
        bans.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        bans
    }

    pub async fn unsynced_count(&self) -> usize {
        self.shared.unsynced.lock().await.len()
    }

    fn spawn_sync(&self, identifier: String) {
        if self.shared.store.is_none() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            sync_identifier(&shared, identifier).await;
        });
    }

    async fn refresh_degraded(&self) {
        if self.shared.store.is_none() {
            return;
        }
        let healthy = self.shared.loaded.load(Ordering::Relaxed)
            && self.shared.unsynced.lock().await.is_empty();
        let was_degraded = self.shared.degraded.swap(!healthy, Ordering::Relaxed);
        if was_degraded && healthy {
            info!("ban store reachable again, leaving degraded mode");
        }
    }
}

/// Mirrors the in-memory state of one identifier into the store.
async fn sync_identifier(shared: &Shared, identifier: String) {
    let Some(store) = shared.store.as_ref() else {
        return;
    };

    let _gate = shared.write_gate.lock().await;
    let current = shared.bans.read().await.get(&identifier).cloned();

    let write = async {
        match &current {
            Some(ban) => store.put_ban(ban).await,
            None => store.delete_ban(&identifier).await,
        }
    };

    let outcome = match tokio::time::timeout(shared.write_timeout, write).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("ban store write timed out")),
    };

    match outcome {
        Ok(()) => {
            shared.unsynced.lock().await.remove(&identifier);
        }
        Err(e) => {
            warn!(
                identifier = %identifier,
                error = %e,
                "ban store write failed, enforcement continues from memory"
            );
            shared.unsynced.lock().await.insert(identifier);
            shared.degraded.store(true, Ordering::Relaxed);
        }
    }
}
