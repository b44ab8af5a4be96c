use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::modules::action::{Ledger, Publisher};
use crate::utils::retry::{retry_or, RetryPolicy};

/// Best-effort engagement tracking of our own posts.
pub struct PerformanceTracker {
    publisher: Arc<dyn Publisher>,
    retry: RetryPolicy,
}

impl PerformanceTracker {
    pub fn new(publisher: Arc<dyn Publisher>, retry: RetryPolicy) -> Self {
        Self { publisher, retry }
    }

    /// Never fails; an unreachable API counts as zero engagement.
    pub async fn track(&self, post_id: &str) -> u64 {
        let label = format!("engagement for {}", post_id);
        retry_or(self.retry, &label, 0, || self.publisher.fetch_engagement(post_id)).await
    }

    pub async fn track_into(&self, ledger: &mut Ledger, post_id: &str) -> u64 {
        let engagement = self.track(post_id).await;
        ledger.record_metric(post_id, engagement, Utc::now());
        info!("📈 {} engagement: {}", post_id, engagement);
        engagement
    }

    /// Re-reads the `n` most recent posts already in the ledger.
    /// Their original timestamps are kept so recency order does not churn.
    pub async fn refresh_recent(&self, ledger: &mut Ledger, n: usize) -> usize {
        let ids = ledger.recent_post_ids(n);
        for id in &ids {
            let engagement = self.track(id).await;
            let timestamp = ledger.metric(id).map(|m| m.timestamp).unwrap_or_else(Utc::now);
            ledger.record_metric(id, engagement, timestamp);
        }
        if !ids.is_empty() {
            info!("📈 Refreshed engagement of {} earlier posts", ids.len());
        }
        ids.len()
    }
}
