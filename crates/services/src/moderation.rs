//! Pattern-based moderator: redacts personal data, rejects nothing but
//! blank input. Deployments with a real classifier plug in their own
//! [`ContentModerator`].

use async_trait::async_trait;
use domains::models::{ModerationStatus, ModerationVerdict};
use domains::ports::ContentModerator;
use once_cell::sync::Lazy;
use regex::Regex;

struct RedactionRule {
    pattern: Regex,
    replacement: &'static str,
}

impl RedactionRule {
    fn new(pattern: &str, replacement: &'static str) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("invalid redaction pattern"),
            replacement,
        }
    }
}

// Order matters: narrower shapes (SSN, cards) would otherwise be half-eaten
// by the phone rules.
static RULES: Lazy<Vec<RedactionRule>> = Lazy::new(|| {
    vec![
        RedactionRule::new(
            r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
            "[EMAIL_REDACTED]",
        ),
        RedactionRule::new(r"https?://[^\s]+", "[URL_REDACTED]"),
        RedactionRule::new(r"\b\d{3}-\d{2}-\d{4}\b", "[SSN_REDACTED]"),
        RedactionRule::new(
            r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{3,4}\b",
            "[CARD_REDACTED]",
        ),
        RedactionRule::new(
            r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b",
            "[IP_REDACTED]",
        ),
        RedactionRule::new(r"\(\d{3}\)\s*\d{3}[-.]?\d{4}", "[PHONE_REDACTED]"),
        RedactionRule::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b", "[PHONE_REDACTED]"),
        RedactionRule::new(r"\b\d{3}\s\d{3}\s\d{4}\b", "[PHONE_REDACTED]"),
        RedactionRule::new(r"\+\d{1,3}\s*\d{1,14}", "[PHONE_REDACTED]"),
        RedactionRule::new(
            r"\b\d+\s+[A-Z][a-z]+\s+(Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Way)\b",
            "[ADDRESS_REDACTED]",
        ),
    ]
});

#[derive(Debug, Default, Clone, Copy)]
pub struct PatternModerator;

impl PatternModerator {
    /// Returns the redacted text, or `None` when nothing matched.
    pub fn redact(text: &str) -> Option<String> {
        let mut current = text.to_string();
        let mut changed = false;
        for rule in RULES.iter() {
            if rule.pattern.is_match(&current) {
                current = rule
                    .pattern
                    .replace_all(&current, rule.replacement)
                    .into_owned();
                changed = true;
            }
        }
        changed.then_some(current)
    }
}

#[async_trait]
impl ContentModerator for PatternModerator {
    async fn moderate(&self, text: &str) -> anyhow::Result<ModerationVerdict> {
        if text.trim().is_empty() {
            return Ok(ModerationVerdict {
                status: ModerationStatus::Rejected,
                moderated_text: String::new(),
                reason: Some("Empty content".to_string()),
                categories: Vec::new(),
            });
        }

        Ok(match Self::redact(text) {
            Some(redacted) => ModerationVerdict {
                status: ModerationStatus::Redacted,
                moderated_text: redacted,
                reason: Some("Sensitive information redacted".to_string()),
                categories: vec!["pii".to_string()],
            },
            None => ModerationVerdict {
                status: ModerationStatus::Approved,
                moderated_text: text.to_string(),
                reason: None,
                categories: Vec::new(),
            },
        })
    }
}
