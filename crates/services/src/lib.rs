//! tipline/crates/services/src/lib.rs
//!
//! Business logic of the tip line: anonymous identities, throttling, bans,
//! moderation and the submission pipeline that ties them together.

pub mod admin;
pub mod ban_manager;
pub mod context;
pub mod identity;
pub mod keywords;
pub mod moderation;
pub mod pending;
pub mod rate_limiter;
pub mod sweeper;
pub mod tips;
pub mod validation;

pub use admin::AdminService;
pub use ban_manager::BanManager;
pub use identity::{display_hash_of, AdminGrant, IdentityError, IdentityManager};
pub use moderation::PatternModerator;
pub use rate_limiter::RateLimiter;
pub use sweeper::{spawn_sweepers, SweepIntervals, Sweepers};
pub use tips::{TipService, TipServiceConfig, TipServiceDeps};
