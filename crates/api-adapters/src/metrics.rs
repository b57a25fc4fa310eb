//! Prometheus counters for submission outcomes.

use prometheus_client::encoding::{text::encode, EncodeLabelSet};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: String,
}

pub struct Metrics {
    registry: Registry,
    submissions: Family<OutcomeLabels, Counter>,
    admin_actions: Family<OutcomeLabels, Counter>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("tipline");
        let submissions = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "tip_submissions",
            "Tip submissions by outcome",
            submissions.clone(),
        );
        let admin_actions = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "admin_actions",
            "Privileged requests by action",
            admin_actions.clone(),
        );
        Self {
            registry,
            submissions,
            admin_actions,
        }
    }

    /// `outcome` is one of success, rejected, rate_limited, banned, invalid,
    /// unavailable, error.
    pub fn record_submission(&self, outcome: &str) {
        self.submissions
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn record_admin_action(&self, action: &str) {
        self.admin_actions
            .get_or_create(&OutcomeLabels {
                outcome: action.to_string(),
            })
            .inc();
    }

    pub fn submissions(&self, outcome: &str) -> u64 {
        self.submissions
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_string(),
            })
            .get()
    }

    /// OpenMetrics text exposition.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}
