use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::bot_profile::LedgerConfig;
use crate::utils::text::headline_key;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMetric {
    pub engagement_count: u64,
    pub timestamp: DateTime<Utc>,
}

/// Recently posted headlines plus engagement of our own posts.
///
/// `seen_headlines` is oldest first and never longer than the capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default, alias = "posted_headlines")]
    seen_headlines: VecDeque<String>,
    #[serde(default)]
    post_metrics: BTreeMap<String, PostMetric>,
    #[serde(skip)]
    capacity: usize,
    #[serde(skip)]
    max_metrics: usize,
}

impl Ledger {
    pub fn new(capacity: usize, max_metrics: usize) -> Self {
        Self {
            seen_headlines: VecDeque::new(),
            post_metrics: BTreeMap::new(),
            capacity: capacity.max(1),
            max_metrics: max_metrics.max(1),
        }
    }

    fn with_bounds(mut self, capacity: usize, max_metrics: usize) -> Self {
        self.capacity = capacity.max(1);
        self.max_metrics = max_metrics.max(1);
        while self.seen_headlines.len() > self.capacity {
            self.seen_headlines.pop_front();
        }
        self.evict_metrics();
        self
    }

    /// Case and spacing are ignored, the same way fetches are deduplicated.
    pub fn is_new(&self, headline: &str) -> bool {
        let key = headline_key(headline);
        !self.seen_headlines.iter().any(|h| headline_key(h) == key)
    }

    /// Appends a new headline, evicting the oldest once over capacity.
    /// Returns false if it was already present.
    pub fn record(&mut self, headline: &str) -> bool {
        if !self.is_new(headline) {
            return false;
        }
        self.seen_headlines.push_back(headline.to_string());
        while self.seen_headlines.len() > self.capacity {
            self.seen_headlines.pop_front();
        }
        true
    }

    pub fn record_metric(&mut self, post_id: &str, engagement_count: u64, timestamp: DateTime<Utc>) {
        self.post_metrics
            .insert(post_id.to_string(), PostMetric { engagement_count, timestamp });
        self.evict_metrics();
    }

    fn evict_metrics(&mut self) {
        while self.post_metrics.len() > self.max_metrics {
            let oldest = self
                .post_metrics
                .iter()
                .min_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp).then_with(|| a.0.cmp(b.0)))
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    self.post_metrics.remove(&id);
                }
                None => break,
            }
        }
    }

    /// Ids of the `n` most recently tracked posts, newest first.
    pub fn recent_post_ids(&self, n: usize) -> Vec<String> {
        let mut entries: Vec<(&String, &PostMetric)> = self.post_metrics.iter().collect();
        entries.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp).then_with(|| b.0.cmp(a.0)));
        entries.into_iter().take(n).map(|(id, _)| id.clone()).collect()
    }

    pub fn metric(&self, post_id: &str) -> Option<&PostMetric> {
        self.post_metrics.get(post_id)
    }

    pub fn clear_headlines(&mut self) {
        self.seen_headlines.clear();
    }

    #[cfg(test)]
    pub fn headlines(&self) -> impl Iterator<Item = &str> {
        self.seen_headlines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.seen_headlines.len()
    }
}

/// JSON file backing for the ledger.
pub struct LedgerStore {
    path: PathBuf,
    capacity: usize,
    max_metrics: usize,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>, capacity: usize, max_metrics: usize) -> Self {
        Self { path: path.into(), capacity, max_metrics }
    }

    pub fn from_config(cfg: &LedgerConfig) -> Self {
        Self::new(&cfg.path, cfg.capacity, cfg.max_tracked_posts)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing or unreadable document yields an empty ledger.
    pub fn load(&self) -> Ledger {
        let empty = || Ledger::new(self.capacity, self.max_metrics);

        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("📒 No ledger at {}, starting fresh", self.path.display());
                return empty();
            }
            Err(e) => {
                warn!("⚠️ Could not read ledger {}: {}. Starting fresh.", self.path.display(), e);
                return empty();
            }
        };

        match serde_json::from_str::<Ledger>(&content) {
            Ok(ledger) => {
                let ledger = ledger.with_bounds(self.capacity, self.max_metrics);
                info!("📒 Ledger loaded: {} headlines, {} tracked posts", ledger.len(), ledger.post_metrics.len());
                ledger
            }
            Err(e) => {
                warn!("⚠️ Ledger {} is corrupt ({}). Starting fresh.", self.path.display(), e);
                empty()
            }
        }
    }

    /// Writes to a sibling temp file, then renames over the target.
    pub fn save(&self, ledger: &Ledger) -> Result<()> {
        let content = serde_json::to_string_pretty(ledger)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content.as_bytes())
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        info!("💾 Ledger saved to {}", self.path.display());
        Ok(())
    }
}
