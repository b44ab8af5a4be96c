use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::bot_profile::{BotProfile, ResetPolicy, ScheduleConfig};
use crate::modules::action::{Ledger, PostRecord, Publisher};
use crate::modules::brain::FallbackChain;
use crate::modules::evolution::PerformanceTracker;
use crate::modules::perception::text_serializer::{format_market_post, format_movers_follow_up};
use crate::modules::perception::{HeadlineSource, QuoteSource};
use crate::utils::retry::{retry_or, with_retry, RetryPolicy};
use crate::utils::text::char_len;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Market,
    News,
}

impl Mode {
    /// `market` / `news`, or a cron string listed under `[schedule]`.
    /// Anything else falls back to `schedule.default_mode`.
    pub fn resolve(arg: Option<&str>, schedule: &ScheduleConfig) -> Mode {
        let arg = arg.map(str::trim).unwrap_or_default();
        match arg.to_lowercase().as_str() {
            "market" => return Mode::Market,
            "news" => return Mode::News,
            _ => {}
        }
        if schedule.market.iter().any(|s| s.trim() == arg) {
            return Mode::Market;
        }
        if schedule.news.iter().any(|s| s.trim() == arg) {
            return Mode::News;
        }

        let fallback = if schedule.default_mode.eq_ignore_ascii_case("market") { Mode::Market } else { Mode::News };
        warn!("🗓️ Unrecognized mode {:?}, defaulting to {}", arg, fallback);
        fallback
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Market => write!(f, "market"),
            Mode::News => write!(f, "news"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: Mode,
    pub posts: Vec<PostRecord>,
    pub failures: Vec<String>,
    pub skipped: Option<String>,
}

impl RunReport {
    fn new(mode: Mode) -> Self {
        Self { mode, posts: Vec::new(), failures: Vec::new(), skipped: None }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut out = format!("{} run: {} posted", self.mode, self.posts.len());
        if let Some(reason) = &self.skipped {
            out.push_str(&format!(", skipped ({})", reason));
        }
        for failure in &self.failures {
            out.push_str(&format!("\n- {}", failure));
        }
        out
    }
}

/// One scheduled invocation: gather, compose, publish, track.
pub struct BotCycle {
    quotes: Arc<dyn QuoteSource>,
    headlines: Arc<dyn HeadlineSource>,
    chain: FallbackChain,
    publisher: Arc<dyn Publisher>,
    tracker: PerformanceTracker,
    profile: BotProfile,
    retry: RetryPolicy,
}

impl BotCycle {
    pub fn new(
        quotes: Arc<dyn QuoteSource>,
        headlines: Arc<dyn HeadlineSource>,
        chain: FallbackChain,
        publisher: Arc<dyn Publisher>,
        profile: BotProfile,
        retry: RetryPolicy,
    ) -> Self {
        let tracker = PerformanceTracker::new(publisher.clone(), retry);
        Self { quotes, headlines, chain, publisher, tracker, profile, retry }
    }

    pub async fn run(&self, mode: Mode, ledger: &mut Ledger) -> RunReport {
        let mut report = RunReport::new(mode);
        info!("🚀 Starting {} run ({} headlines remembered)", mode, ledger.len());

        if !self.publisher.verify_identity().await {
            report.failures.push("X authentication failed".to_string());
            report.skipped = Some("not authenticated".to_string());
            return report;
        }

        self.tracker.refresh_recent(ledger, self.profile.tracking.refresh_recent).await;

        match mode {
            Mode::Market => self.run_market(ledger, &mut report).await,
            Mode::News => self.run_news(ledger, &mut report).await,
        }

        for post in &report.posts {
            self.tracker.track_into(ledger, &post.id).await;
        }

        info!("🏁 {}", report.summary().replace('\n', " "));
        report
    }

    async fn run_market(&self, ledger: &mut Ledger, report: &mut RunReport) {
        if self.profile.ledger.reset_policy == ResetPolicy::OnMarketRun {
            info!("🧹 Clearing {} remembered headlines for market run", ledger.len());
            ledger.clear_headlines();
        }

        let quotes = retry_or(self.retry, "market data", Vec::new(), || self.quotes.top_assets()).await;
        let max_chars = self.profile.gate.max_chars;
        let Some(post) = format_market_post(&quotes, max_chars) else {
            report.skipped = Some("no market data".to_string());
            return;
        };

        let follow_up = if self.profile.threads.enabled {
            format_movers_follow_up(&quotes).filter(|reply| char_len(reply) <= max_chars)
        } else {
            None
        };

        if let Some(parent) = self.publish_primary(&post, report).await {
            self.publish_follow_up(&parent, follow_up.as_deref(), report).await;
        }
    }

    async fn run_news(&self, ledger: &mut Ledger, report: &mut RunReport) {
        let items = retry_or(self.retry, "news headlines", Vec::new(), || self.headlines.latest()).await;
        let Some(item) = items.iter().find(|item| ledger.is_new(&item.title)) else {
            info!("😴 No unseen headlines among {} fetched", items.len());
            report.skipped = Some("no new headlines".to_string());
            return;
        };

        info!("📰 Selected headline: {}", item.title);
        let candidate = self.chain.generate(item).await;
        info!("✍️ Candidate via {:?}: {}", candidate.provider_used, candidate.text);
        if !self.chain.gate().accepts(&candidate.text, &item.title, false) {
            warn!("🚫 Candidate for {:?} fails the quality gate, not publishing", item.title);
            report.skipped = Some("candidate failed quality gate".to_string());
            return;
        }

        let Some(parent) = self.publish_primary(&candidate.text, report).await else {
            return;
        };
        // Remembered before the reply goes out.
        ledger.record(&candidate.source_headline);

        let follow_up = if self.profile.threads.enabled { candidate.follow_up.as_deref() } else { None };
        self.publish_follow_up(&parent, follow_up, report).await;
    }

    /// Returns the id of the published post.
    async fn publish_primary(&self, text: &str, report: &mut RunReport) -> Option<String> {
        match with_retry(self.retry, "publish", || self.publisher.publish(text, None)).await {
            Ok(post) => {
                let id = post.id.clone();
                report.posts.push(post);
                Some(id)
            }
            Err(e) => {
                error!("❌ Publish failed: {:#}", e);
                report.failures.push(format!("publish failed: {:#}", e));
                None
            }
        }
    }

    async fn publish_follow_up(&self, parent: &str, follow_up: Option<&str>, report: &mut RunReport) {
        let Some(reply) = follow_up else {
            return;
        };
        match with_retry(self.retry, "publish follow-up", || self.publisher.publish(reply, Some(parent))).await {
            Ok(post) => report.posts.push(post),
            Err(e) => {
                warn!("🧵 Follow-up failed: {:#}", e);
                report.failures.push(format!("follow-up failed: {:#}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::bot_profile::GateConfig;
    use crate::modules::brain::{QualityGate, TextProvider};
    use crate::modules::perception::{CoinQuote, NewsItem};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    const XRP_POST: &str = "The ETF approval for XRP is finally here and institutions are lining up. Is this the start of a new run? #XRP #Crypto";
    const XRP_THREAD: &str = "The ETF approval for XRP is finally here and institutions are lining up. Is this the start of a new run? #XRP #Crypto\nTHREAD: Trading starts Monday, watch the spot flows.";

    struct StaticQuotes(Vec<CoinQuote>);

    #[async_trait]
    impl QuoteSource for StaticQuotes {
        async fn top_assets(&self) -> Result<Vec<CoinQuote>> {
            if self.0.is_empty() {
                return Err(anyhow!("coingecko down"));
            }
            Ok(self.0.clone())
        }
    }

    struct StaticHeadlines(Vec<&'static str>);

    #[async_trait]
    impl HeadlineSource for StaticHeadlines {
        async fn latest(&self) -> Result<Vec<NewsItem>> {
            Ok(self.0.iter().map(|t| NewsItem::headline(*t)).collect())
        }
    }

    struct Writer(&'static str);

    #[async_trait]
    impl TextProvider for Writer {
        fn name(&self) -> &str {
            "writer"
        }

        async fn generate(&self, item: &NewsItem) -> Result<String> {
            if item.title.contains("XRP") {
                Ok(self.0.to_string())
            } else {
                Ok(format!("Big story today: {} and the market is watching closely #Crypto", item.title))
            }
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        posts: Mutex<Vec<(String, Option<String>)>>,
        locked_out: bool,
        failing: bool,
        stalled_replies: bool,
    }

    impl RecordingPublisher {
        fn sent(&self) -> Vec<(String, Option<String>)> {
            self.posts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, text: &str, reply_to: Option<&str>) -> Result<PostRecord> {
            if self.failing {
                return Err(anyhow!("503 from X"));
            }
            if self.stalled_replies && reply_to.is_some() {
                std::future::pending::<()>().await;
            }
            let mut posts = self.posts.lock().unwrap();
            posts.push((text.to_string(), reply_to.map(str::to_string)));
            Ok(PostRecord {
                id: format!("post-{}", posts.len()),
                reply_to: reply_to.map(str::to_string),
                content: text.to_string(),
            })
        }

        async fn fetch_engagement(&self, _post_id: &str) -> Result<u64> {
            Ok(7)
        }

        async fn verify_identity(&self) -> bool {
            !self.locked_out
        }
    }

    fn quote(name: &str, change: f64) -> CoinQuote {
        CoinQuote {
            id: name.to_lowercase(),
            symbol: name[..3].to_lowercase(),
            name: name.to_string(),
            price: 100.0,
            change_24h_pct: change,
            market_cap_rank: None,
        }
    }

    fn cycle(
        headlines: Vec<&'static str>,
        quotes: Vec<CoinQuote>,
        publisher: Arc<RecordingPublisher>,
        profile: BotProfile,
    ) -> BotCycle {
        cycle_writing(XRP_POST, headlines, quotes, publisher, profile)
    }

    fn cycle_writing(
        xrp_text: &'static str,
        headlines: Vec<&'static str>,
        quotes: Vec<CoinQuote>,
        publisher: Arc<RecordingPublisher>,
        profile: BotProfile,
    ) -> BotCycle {
        let retry = RetryPolicy::immediate(2);
        let chain = FallbackChain::new(
            vec![Arc::new(Writer(xrp_text)) as Arc<dyn TextProvider>],
            QualityGate::new(profile.gate.clone()),
            retry,
        );
        BotCycle::new(
            Arc::new(StaticQuotes(quotes)),
            Arc::new(StaticHeadlines(headlines)),
            chain,
            publisher,
            profile,
            retry,
        )
    }

    #[tokio::test]
    async fn new_headline_is_posted_once_and_remembered() {
        let publisher = Arc::new(RecordingPublisher::default());
        let bot = cycle(vec!["ETF Approved for XRP"], vec![], publisher.clone(), BotProfile::default());
        let mut ledger = Ledger::new(50, 200);
        assert!(ledger.is_new("ETF Approved for XRP"));

        let report = bot.run(Mode::News, &mut ledger).await;

        let sent = publisher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, XRP_POST);
        assert!(sent[0].0.contains("#XRP"));
        assert!(sent[0].0.chars().count() <= GateConfig::default().max_chars);
        assert!(!report.has_failures());
        assert!(!ledger.is_new("ETF Approved for XRP"));
        assert_eq!(ledger.metric("post-1").map(|m| m.engagement_count), Some(7));

        let next = bot.run(Mode::News, &mut ledger).await;
        assert_eq!(publisher.sent().len(), 1);
        assert_eq!(next.skipped.as_deref(), Some("no new headlines"));
    }

    #[tokio::test]
    async fn seen_headlines_are_passed_over() {
        let publisher = Arc::new(RecordingPublisher::default());
        let bot = cycle(
            vec!["ETF Approved for XRP", "Solana hits new all time high"],
            vec![],
            publisher.clone(),
            BotProfile::default(),
        );
        let mut ledger = Ledger::new(50, 200);
        ledger.record("ETF Approved for XRP");

        bot.run(Mode::News, &mut ledger).await;
        let sent = publisher.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("Solana hits new all time high"));
        assert!(!ledger.is_new("Solana hits new all time high"));
    }

    #[tokio::test]
    async fn failed_publish_leaves_headline_unrecorded() {
        let publisher = Arc::new(RecordingPublisher { failing: true, ..Default::default() });
        let bot = cycle(vec!["ETF Approved for XRP"], vec![], publisher, BotProfile::default());
        let mut ledger = Ledger::new(50, 200);

        let report = bot.run(Mode::News, &mut ledger).await;
        assert!(report.has_failures());
        assert!(report.posts.is_empty());
        assert!(ledger.is_new("ETF Approved for XRP"));
    }

    #[tokio::test]
    async fn headline_is_remembered_even_if_follow_up_never_lands() {
        let publisher = Arc::new(RecordingPublisher { stalled_replies: true, ..Default::default() });
        let mut profile = BotProfile::default();
        profile.threads.enabled = true;
        let bot = cycle_writing(XRP_THREAD, vec!["ETF Approved for XRP"], vec![], publisher.clone(), profile);
        let mut ledger = Ledger::new(50, 200);

        let run = tokio::time::timeout(Duration::from_millis(200), bot.run(Mode::News, &mut ledger)).await;

        assert!(run.is_err());
        let sent = publisher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, XRP_POST);
        assert_eq!(sent[0].1, None);
        assert!(!ledger.is_new("ETF Approved for XRP"));
    }

    #[tokio::test]
    async fn auth_failure_skips_publishing() {
        let publisher = Arc::new(RecordingPublisher { locked_out: true, ..Default::default() });
        let bot = cycle(vec!["ETF Approved for XRP"], vec![quote("Bitcoin", 1.0)], publisher.clone(), BotProfile::default());
        let mut ledger = Ledger::new(50, 200);

        let report = bot.run(Mode::News, &mut ledger).await;
        assert_eq!(report.skipped.as_deref(), Some("not authenticated"));
        assert!(report.has_failures());
        assert!(publisher.sent().is_empty());
        assert!(ledger.is_new("ETF Approved for XRP"));
    }

    #[tokio::test]
    async fn market_run_threads_movers_and_honours_reset_policy() {
        let publisher = Arc::new(RecordingPublisher::default());
        let mut profile = BotProfile::default();
        profile.ledger.reset_policy = ResetPolicy::OnMarketRun;
        let bot = cycle(vec![], vec![quote("Bitcoin", 2.5), quote("Dogecoin", -4.0)], publisher.clone(), profile);
        let mut ledger = Ledger::new(50, 200);
        ledger.record("old headline");

        let report = bot.run(Mode::Market, &mut ledger).await;
        let sent = publisher.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].0.starts_with("📊 Crypto Market Update:"));
        assert_eq!(sent[1].1.as_deref(), Some("post-1"));
        assert!(sent[1].0.contains("#DOGECOIN -4.00%"));
        assert_eq!(report.posts.len(), 2);
        assert_eq!(ledger.len(), 0);
    }

    #[tokio::test]
    async fn market_outage_skips_without_posting() {
        let publisher = Arc::new(RecordingPublisher::default());
        let bot = cycle(vec![], vec![], publisher.clone(), BotProfile::default());
        let mut ledger = Ledger::new(50, 200);
        ledger.record("kept headline");

        let report = bot.run(Mode::Market, &mut ledger).await;
        assert_eq!(report.skipped.as_deref(), Some("no market data"));
        assert!(publisher.sent().is_empty());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn resolves_mode_from_argument_or_schedule() {
        let schedule = ScheduleConfig::default();
        assert_eq!(Mode::resolve(Some("market"), &schedule), Mode::Market);
        assert_eq!(Mode::resolve(Some(" NEWS "), &schedule), Mode::News);
        assert_eq!(Mode::resolve(Some("0 */6 * * *"), &schedule), Mode::Market);
        assert_eq!(Mode::resolve(Some("30 */2 * * *"), &schedule), Mode::News);
        assert_eq!(Mode::resolve(Some("15 3 * * *"), &schedule), Mode::News);
        assert_eq!(Mode::resolve(None, &schedule), Mode::News);

        let market_default = ScheduleConfig { default_mode: "market".to_string(), ..ScheduleConfig::default() };
        assert_eq!(Mode::resolve(None, &market_default), Mode::Market);
    }

    #[test]
    fn summary_lists_failures() {
        let mut report = RunReport::new(Mode::News);
        report.failures.push("publish failed: 503".to_string());
        assert_eq!(report.summary(), "news run: 0 posted\n- publish failed: 503");
    }
}
