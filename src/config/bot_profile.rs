use serde::Deserialize;
use config::{Config, Environment, File};
use anyhow::Result;
use std::time::Duration;
use tracing::warn;

use crate::utils::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Headlines only leave the ledger through FIFO eviction.
    #[default]
    Never,
    /// Every market run starts the headline window from scratch.
    OnMarketRun,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: String,
    pub capacity: usize,
    pub max_tracked_posts: usize,
    pub reset_policy: ResetPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: "bot_memory.json".to_string(),
            capacity: 50,
            max_tracked_posts: 200,
            reset_policy: ResetPolicy::Never,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { attempts: 3, delay_secs: 5 }
    }
}

/// Words every local template reaches with an empty headline.
pub const TEMPLATE_MIN_WORDS: usize = 10;
/// Longest template skeleton with three hashtags, plus room for a headline.
const MIN_MAX_CHARS: usize = 120;
const MIN_MAX_WORDS: usize = 20;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    pub max_chars: usize,
    pub min_words: usize,
    pub max_words: usize,
    pub require_hashtag: bool,
    pub code_tolerance: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_chars: 280,
            min_words: 8,
            max_words: 55,
            require_hashtag: true,
            code_tolerance: 1,
        }
    }
}

impl GateConfig {
    /// Pulls limits back into the range the local template can always meet.
    pub fn clamped(mut self) -> Self {
        if self.max_chars < MIN_MAX_CHARS {
            warn!("⚙️ gate.max_chars {} too small, raising to {}", self.max_chars, MIN_MAX_CHARS);
            self.max_chars = MIN_MAX_CHARS;
        }
        if self.max_words < MIN_MAX_WORDS {
            warn!("⚙️ gate.max_words {} too small, raising to {}", self.max_words, MIN_MAX_WORDS);
            self.max_words = MIN_MAX_WORDS;
        }
        if self.min_words > TEMPLATE_MIN_WORDS {
            warn!("⚙️ gate.min_words {} too large, lowering to {}", self.min_words, TEMPLATE_MIN_WORDS);
            self.min_words = TEMPLATE_MIN_WORDS;
        }
        self
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketConfig {
    pub base_url: String,
    pub vs_currency: String,
    pub top_n: usize,
    /// Explicit CoinGecko ids. Empty means "top N by market cap".
    pub coins: Vec<String>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            vs_currency: "usd".to_string(),
            top_n: 6,
            coins: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NewsConfig {
    pub feeds: Vec<String>,
    pub cryptopanic_url: String,
    pub max_items: usize,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            feeds: vec![
                "https://www.coindesk.com/arc/outboundfeeds/rss/".to_string(),
                "https://cointelegraph.com/rss".to_string(),
            ],
            cryptopanic_url: "https://cryptopanic.com/api/v1/posts/".to_string(),
            max_items: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Any `/chat/completions` endpoint (DeepSeek, OpenAI, Groq, xAI ...)
    Openai,
    Gemini,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub require_subject: bool,
}

fn default_temperature() -> f64 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    pub market: Vec<String>,
    pub news: Vec<String>,
    pub default_mode: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            market: vec!["0 */6 * * *".to_string()],
            news: vec!["30 */2 * * *".to_string()],
            default_mode: "news".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ThreadConfig {
    pub enabled: bool,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrackingConfig {
    pub refresh_recent: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self { refresh_recent: 3 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertFormat {
    #[default]
    Dingtalk,
    Slack,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AlertConfig {
    pub format: AlertFormat,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BotProfile {
    pub ledger: LedgerConfig,
    pub retry: RetryConfig,
    pub gate: GateConfig,
    pub market: MarketConfig,
    pub news: NewsConfig,
    pub providers: Vec<ProviderConfig>,
    pub schedule: ScheduleConfig,
    pub threads: ThreadConfig,
    pub tracking: TrackingConfig,
    pub alerts: AlertConfig,
}

impl BotProfile {
    /// `bot_config.toml` is optional; `BOT__SECTION__KEY` env vars override it.
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name("bot_config").required(false))
            .add_source(Environment::with_prefix("BOT").separator("__"))
            .build()?;

        Self::from_settings(settings)
    }

    fn from_settings(settings: Config) -> Result<Self> {
        let mut profile: BotProfile = settings.try_deserialize()?;
        profile.gate = profile.gate.clamped();
        Ok(profile)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.attempts, Duration::from_secs(self.retry.delay_secs))
    }
}
