//! # AppError
//!
//! Centralized error handling for the tip line.
//! Maps failures to the taxonomy callers act on.

use thiserror::Error;

/// The primary error type at the service boundary.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Tip)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Bad input shape or length. Never has side effects.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Missing or invalid admin credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A required collaborator (e.g., the content moderator) did not answer.
    /// Transient: the caller may retry.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Malformed or tampered encrypted identity blob. Distinct from NotFound.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// Infrastructure failure (e.g., serialization bug)
    #[error("internal service error: {0}")]
    Internal(String),
}

/// A specialized Result type for tip line logic.
pub type Result<T> = std::result::Result<T, AppError>;
