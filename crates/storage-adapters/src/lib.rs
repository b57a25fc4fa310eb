//! tipline/crates/storage-adapters/src/lib.rs
//!
//! Persistence adapters for the `TipRepo` and `BanRepo` ports.
//!
//! - `memory`: process-local stores, used by tests and single-node setups.
//! - `sqlite` (feature `db-sqlite`): durable stores on sqlx.

pub mod memory;
#[cfg(feature = "db-sqlite")]
pub mod sqlite;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store is unavailable")]
    Unavailable,

    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
}

pub use memory::{MemoryBanStore, MemoryTipStore};
#[cfg(feature = "db-sqlite")]
pub use sqlite::{SqliteBanStore, SqliteTipStore};
