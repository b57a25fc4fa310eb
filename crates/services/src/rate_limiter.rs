//! # Rate Limiter
//!
//! Sliding one-hour submission quota per identifier, held in memory only.
//! A restart refills every quota once, which is acceptable.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use domains::models::RateDecision;
use domains::ports::Clock;
use std::sync::Arc;
use tracing::debug;

pub struct RateLimiter {
    /// identifier -> submission instants, oldest first
    windows: DashMap<String, Vec<DateTime<Utc>>>,
    max_per_window: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(max_per_hour: u32, clock: Arc<dyn Clock>) -> Self {
        Self::with_window(max_per_hour, Duration::hours(1), clock)
    }

    pub fn with_window(max_per_window: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            max_per_window,
            window,
            clock,
        }
    }

    /// Prunes, checks and records in one step. The entry lock is held for the
    /// whole operation, so concurrent calls for one identifier cannot both see
    /// a free slot past the cap.
    pub fn check_and_record(&self, identifier: &str) -> RateDecision {
        let now = self.clock.now();
        let cutoff = now - self.window;

        let mut entry = self.windows.entry(identifier.to_string()).or_default();
        let stamps = entry.value_mut();
        stamps.retain(|ts| *ts > cutoff);

        if stamps.len() >= self.max_per_window as usize {
            let reset_at = stamps
                .first()
                .map(|oldest| *oldest + self.window)
                .unwrap_or(now + self.window);
            debug!(identifier, %reset_at, "submission quota exhausted");
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_at,
            };
        }

        stamps.push(now);
        let remaining = self.max_per_window.saturating_sub(stamps.len() as u32);
        let reset_at = stamps[0] + self.window;

        RateDecision {
            allowed: true,
            remaining,
            reset_at,
        }
    }

    /// Advisory quota left for `identifier` without recording anything.
    pub fn remaining_quota(&self, identifier: &str) -> u32 {
        let cutoff = self.clock.now() - self.window;
        let used = self
            .windows
            .get(identifier)
            .map(|stamps| stamps.iter().filter(|ts| **ts > cutoff).count())
            .unwrap_or(0);
        self.max_per_window.saturating_sub(used as u32)
    }

    /// Drops stale instants everywhere and forgets identifiers with none left.
    /// Returns how many identifiers were forgotten.
    pub fn sweep(&self) -> usize {
        let cutoff = self.clock.now() - self.window;
        let before = self.windows.len();
        self.windows.retain(|_, stamps| {
            stamps.retain(|ts| *ts > cutoff);
            !stamps.is_empty()
        });
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, "rate limit sweep evicted idle identifiers");
        }
        removed
    }

    pub fn tracked_identifiers(&self) -> usize {
        self.windows.len()
    }

    pub fn max_per_window(&self) -> u32 {
        self.max_per_window
    }
}
