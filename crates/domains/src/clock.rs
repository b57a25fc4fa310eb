//! Clock adapters.
//!
//! `SystemClock` is the production clock. `ManualClock` lets tests move time
//! explicitly and is available in test builds or with the `testing` feature.

use chrono::{DateTime, Utc};

use crate::ports::Clock;

/// System clock implementation using `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "testing"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "testing"))]
mod manual {
    use super::*;
    use std::sync::{Arc, Mutex, PoisonError};

    /// Controllable clock. All clones share the same instant, so advancing
    /// one clone advances every component holding another.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        current: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                current: Arc::new(Mutex::new(start)),
            }
        }

        pub fn advance(&self, by: chrono::Duration) {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            *current += by;
        }

        pub fn set(&self, instant: DateTime<Utc>) {
            *self.current.lock().unwrap_or_else(PoisonError::into_inner) = instant;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.current.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}
