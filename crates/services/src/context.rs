//! Tracks the last user-driven interaction so downstream generators can stay
//! keyword-aware of it.

use chrono::{DateTime, Utc};
use domains::models::InteractionContext;
use tokio::sync::RwLock;
use tracing::debug;

pub const TIP_SUBMISSION: &str = "tip_submission";

#[derive(Debug, Default)]
pub struct InteractionContextService {
    last: RwLock<Option<InteractionContext>>,
}

impl InteractionContextService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(
        &self,
        interaction_type: &str,
        keywords: Vec<String>,
        source_id: String,
        raw_content: String,
        recorded_at: DateTime<Utc>,
    ) {
        debug!(interaction_type, keywords = ?keywords, "interaction context updated");
        *self.last.write().await = Some(InteractionContext {
            interaction_type: interaction_type.to_string(),
            keywords,
            source_id,
            raw_content,
            recorded_at,
        });
    }

    /// A copy of the current context, if any.
    pub async fn current(&self) -> Option<InteractionContext> {
        self.last.read().await.clone()
    }

    pub async fn clear(&self) {
        *self.last.write().await = None;
    }
}
