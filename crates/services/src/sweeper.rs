//! Periodic background maintenance for the rate limiter and ban manager.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::ban_manager::BanManager;
use crate::rate_limiter::RateLimiter;

#[derive(Debug, Clone, Copy)]
pub struct SweepIntervals {
    pub rate_limit: Duration,
    pub bans: Duration,
}

impl Default for SweepIntervals {
    fn default() -> Self {
        Self {
            rate_limit: Duration::from_secs(5 * 60),
            bans: Duration::from_secs(10 * 60),
        }
    }
}

/// Handles of the running sweep tasks. Dropping this does not stop them.
pub struct Sweepers {
    handles: Vec<JoinHandle<()>>,
}

impl Sweepers {
    pub fn abort_all(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

pub fn spawn_sweepers(
    rate_limiter: Arc<RateLimiter>,
    bans: BanManager,
    intervals: SweepIntervals,
) -> Sweepers {
    let rate_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(intervals.rate_limit);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let forgotten = rate_limiter.sweep();
            debug!(forgotten, "rate limit sweep finished");
        }
    });

    let ban_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(intervals.bans);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let expired = bans.sweep().await;
            debug!(expired, degraded = bans.is_degraded(), "ban sweep finished");
        }
    });

    Sweepers {
        handles: vec![rate_task, ban_task],
    }
}
