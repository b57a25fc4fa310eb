//! tipline/crates/domains/src/lib.rs
//!
//! The central domain types and interface definitions for the tip line.

pub mod clock;
pub mod error;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use clock::*;
pub use error::*;
pub use models::*;
pub use ports::*;
