use reqwest::Client;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::env;
use tracing::info;

use super::structs::CoinQuote;
use crate::config::bot_profile::MarketConfig;
use crate::error::BotError;
use crate::utils::http_client::ensure_success;

#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Assets ordered by market cap, with price and 24h change.
    async fn top_assets(&self) -> Result<Vec<CoinQuote>>;
}

#[derive(Debug, Deserialize)]
struct MarketRow {
    id: String,
    symbol: String,
    name: String,
    current_price: Option<f64>,
    market_cap_rank: Option<u32>,
    price_change_percentage_24h: Option<f64>,
}

pub struct MarketDataFetcher {
    client: Client,
    cfg: MarketConfig,
    api_key: String,
}

impl MarketDataFetcher {
    pub fn new(client: Client, cfg: MarketConfig) -> Self {
        Self {
            client,
            cfg,
            api_key: env::var("COINGECKO_API_KEY").unwrap_or_default(),
        }
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("vs_currency", self.cfg.vs_currency.clone()),
            ("order", "market_cap_desc".to_string()),
            ("page", "1".to_string()),
            ("price_change_percentage", "24h".to_string()),
        ];
        if self.cfg.coins.is_empty() {
            params.push(("per_page", self.cfg.top_n.max(1).to_string()));
        } else {
            params.push(("ids", self.cfg.coins.join(",")));
            params.push(("per_page", self.cfg.coins.len().to_string()));
        }
        params
    }
}

/// Rows without a price are dropped; a missing 24h change reads as flat.
pub fn parse_markets(payload: Value) -> Result<Vec<CoinQuote>> {
    let rows: Vec<MarketRow> = serde_json::from_value(payload)
        .map_err(|e| BotError::malformed("coingecko", e.to_string()))?;

    let quotes = rows
        .into_iter()
        .filter_map(|row| {
            let price = row.current_price?;
            Some(CoinQuote {
                id: row.id,
                symbol: row.symbol,
                name: row.name,
                price,
                change_24h_pct: row.price_change_percentage_24h.unwrap_or(0.0),
                market_cap_rank: row.market_cap_rank,
            })
        })
        .collect();
    Ok(quotes)
}

#[async_trait]
impl QuoteSource for MarketDataFetcher {
    async fn top_assets(&self) -> Result<Vec<CoinQuote>> {
        let url = format!("{}/coins/markets", self.cfg.base_url.trim_end_matches('/'));
        let mut req = self.client.get(&url).query(&self.query());
        if !self.api_key.is_empty() {
            req = req.header("x-cg-demo-api-key", &self.api_key);
        }

        let resp = ensure_success("coingecko", req.send().await?).await?;
        let payload: Value = resp.json().await?;
        let quotes = parse_markets(payload)?;

        info!("📈 CoinGecko returned {} quotes", quotes.len());
        Ok(quotes)
    }
}
