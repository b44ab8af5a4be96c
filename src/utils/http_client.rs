use reqwest::{Client, Response};
use std::time::Duration;
use anyhow::Result;
use tracing::info;

use crate::error::BotError;

const USER_AGENT: &str = concat!("market_update_bot/", env!("CARGO_PKG_VERSION"));

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Client for short data calls: CoinGecko, RSS feeds, CryptoPanic, the X API.
    pub fn create() -> Result<Client> {
        let builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(30)));

        info!("🌐 [Http Client] data client ready");

        let client = builder.build()?;
        Ok(client)
    }

    /// Client for text-generation providers: long timeout, HTTP/1.1, no pooling.
    pub fn create_llm() -> Result<Client> {
        let builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(180))
            .connect_timeout(Duration::from_secs(30))
            .http1_only()
            .pool_max_idle_per_host(0);

        let client = builder.build()?;
        Ok(client)
    }
}

/// Turns a non-2xx response into a classified `BotError`.
pub async fn ensure_success(service: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let body: String = body.chars().take(300).collect();
    Err(BotError::from_status(service, status, body).into())
}
