//! # Domain Models
//!
//! These structs represent the core entities of the tip line.
//! Tips use UUID v7 for time-ordered, globally unique identification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Per-request facts about the caller. Only ever stored encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub network_address: String,
    /// User agent or any other client fingerprint string
    pub client_signature: String,
    pub captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

/// The output of deriving an anonymous identity from [`RequestMetadata`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymousIdentity {
    /// Short per-submission token, e.g. `user_3fa2c91b07de`
    pub display_hash: String,
    /// base64(nonce || ciphertext) of the serialized metadata
    pub encrypted_blob: String,
    /// Stable keyed digest of the caller used for ban and quota lookups.
    /// Never persisted, never returned to callers.
    pub throttle_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    Approved,
    Redacted,
    Rejected,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Approved => "approved",
            ModerationStatus::Redacted => "redacted",
            ModerationStatus::Rejected => "rejected",
        }
    }

    /// Whether tips with this status may appear in public listings.
    pub fn is_listable(&self) -> bool {
        matches!(self, ModerationStatus::Approved | ModerationStatus::Redacted)
    }
}

impl fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModerationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(ModerationStatus::Approved),
            "redacted" => Ok(ModerationStatus::Redacted),
            "rejected" => Ok(ModerationStatus::Rejected),
            other => Err(format!("unknown moderation status: {other}")),
        }
    }
}

/// What the content moderator decided about a piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub status: ModerationStatus,
    /// The text to publish. Equal to the input unless redacted.
    pub moderated_text: String,
    pub reason: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// An accepted anonymous tip. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tip {
    pub id: Uuid,
    pub content: String,
    pub moderated_content: String,
    pub identity_hash: String,
    /// Encrypted [`RequestMetadata`] of the submitter
    pub encrypted_owner: String,
    pub status: ModerationStatus,
    pub moderation_reason: Option<String>,
    pub keywords: Vec<String>,
    pub submitted_at: DateTime<Utc>,
    /// Only populated when the deployment opts into address retention
    pub submitter_address: Option<String>,
}

impl Tip {
    pub fn to_public(&self) -> PublicTip {
        PublicTip {
            id: self.id,
            content: self.moderated_content.clone(),
            identity_hash: self.identity_hash.clone(),
            status: self.status,
            moderation_reason: self.moderation_reason.clone(),
            keywords: self.keywords.clone(),
            submitted_at: self.submitted_at,
        }
    }
}

/// The externally visible projection of a [`Tip`]: moderated text only,
/// no raw content, no encrypted owner, no address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicTip {
    pub id: Uuid,
    pub content: String,
    pub identity_hash: String,
    pub status: ModerationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderation_reason: Option<String>,
    pub keywords: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

/// A temporary block against an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ban {
    pub identifier: String,
    pub reason: String,
    pub expires_at: DateTime<Utc>,
    pub imposed_at: DateTime<Utc>,
    pub imposed_by: String,
}

impl Ban {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanStatus {
    NotBanned,
    Banned {
        reason: String,
        expires_at: DateTime<Utc>,
    },
}

impl BanStatus {
    pub fn is_banned(&self) -> bool {
        matches!(self, BanStatus::Banned { .. })
    }
}

/// Result of a sliding-window quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Advisory only; never gates a submission by itself
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// The last user-driven interaction, consumed by downstream generators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionContext {
    pub interaction_type: String,
    pub keywords: Vec<String>,
    pub source_id: String,
    pub raw_content: String,
    pub recorded_at: DateTime<Utc>,
}

/// An inbound submission as handed over by the HTTP layer.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub content: String,
    pub network_address: String,
    pub client_signature: String,
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReceipt {
    pub tip_id: Uuid,
    pub identity_hash: String,
    pub moderated: bool,
    pub reason: Option<String>,
    pub remaining: u32,
}

/// Terminal states of a submission that are not faults.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Accepted(SubmissionReceipt),
    Rejected { reason: String },
    RateLimited { reset_at: DateTime<Utc> },
    Banned { reason: String, expires_at: DateTime<Utc> },
}

impl SubmissionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SubmissionOutcome::Accepted(_) => "success",
            SubmissionOutcome::Rejected { .. } => "rejected",
            SubmissionOutcome::RateLimited { .. } => "rate_limited",
            SubmissionOutcome::Banned { .. } => "banned",
        }
    }
}
