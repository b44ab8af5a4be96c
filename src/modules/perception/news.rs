use reqwest::Client;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::env;
use tracing::{info, warn};

use super::structs::NewsItem;
use crate::config::bot_profile::NewsConfig;
use crate::error::BotError;
use crate::utils::http_client::ensure_success;
use crate::utils::text::headline_key;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

#[async_trait]
pub trait HeadlineSource: Send + Sync {
    /// Newest first, titles unique within the batch.
    async fn latest(&self) -> Result<Vec<NewsItem>>;
}

pub struct NewsSentinel {
    client: Client,
    cfg: NewsConfig,
    cryptopanic_token: String,
}

impl NewsSentinel {
    pub fn new(client: Client, cfg: NewsConfig) -> Self {
        Self {
            client,
            cfg,
            cryptopanic_token: env::var("CRYPTOPANIC_TOKEN").unwrap_or_default(),
        }
    }

    async fn fetch_feed(&self, url: &str) -> Result<Vec<NewsItem>> {
        let resp = ensure_success("rss", self.client.get(url).send().await?).await?;
        let body = resp.text().await?;
        let source = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        Ok(parse_rss_items(&body, &source, self.cfg.max_items))
    }

    async fn fetch_cryptopanic(&self) -> Result<Vec<NewsItem>> {
        let resp = self.client.get(&self.cfg.cryptopanic_url)
            .query(&[("auth_token", self.cryptopanic_token.as_str()), ("public", "true"), ("kind", "news")])
            .send()
            .await?;
        let payload: Value = ensure_success("cryptopanic", resp).await?.json().await?;
        parse_cryptopanic(&payload, self.cfg.max_items)
    }
}

#[async_trait]
impl HeadlineSource for NewsSentinel {
    /// One failing source is tolerated; the call only fails if all of them do.
    async fn latest(&self) -> Result<Vec<NewsItem>> {
        let mut batches = Vec::new();
        let mut failures = 0usize;

        if !self.cryptopanic_token.is_empty() {
            match self.fetch_cryptopanic().await {
                Ok(items) => batches.push(items),
                Err(e) => {
                    failures += 1;
                    warn!("📰 CryptoPanic fetch failed: {:#}", e);
                }
            }
        }

        for feed in &self.cfg.feeds {
            match self.fetch_feed(feed).await {
                Ok(items) => batches.push(items),
                Err(e) => {
                    failures += 1;
                    warn!("📰 Feed {} failed: {:#}", feed, e);
                }
            }
        }

        if batches.is_empty() && failures > 0 {
            return Err(anyhow!("all {} news sources failed", failures));
        }

        let items = merge_unique(batches, self.cfg.max_items);
        info!("📰 {} headlines collected ({} source failures)", items.len(), failures);
        Ok(items)
    }
}

/// Concatenates batches in source order, dropping repeated titles.
pub fn merge_unique(batches: Vec<Vec<NewsItem>>, limit: usize) -> Vec<NewsItem> {
    let mut seen = HashSet::new();
    batches
        .into_iter()
        .flatten()
        .filter(|item| seen.insert(headline_key(&item.title)))
        .take(limit)
        .collect()
}

fn extract_tag<'a>(block: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let start = block.find(&open)?;
    let after_open = &block[start..];
    let content_start = start + after_open.find('>')? + 1;
    let end = block[content_start..].find(&close)? + content_start;
    Some(&block[content_start..end])
}

fn clean_text(raw: &str) -> String {
    let unwrapped = raw.replace("<![CDATA[", "").replace("]]>", "");
    let decoded = unwrapped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&#8217;", "'")
        .replace("&#8216;", "'")
        .replace("&#8220;", "\"")
        .replace("&#8221;", "\"")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");
    let stripped = TAG_RE.replace_all(&decoded, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pulls `<item>` entries out of an RSS document.
pub fn parse_rss_items(xml: &str, source: &str, limit: usize) -> Vec<NewsItem> {
    xml.split("<item").skip(1)
        .filter_map(|block| {
            let block = block.split("</item>").next().unwrap_or(block);
            let title = clean_text(extract_tag(block, "title")?);
            if title.is_empty() {
                return None;
            }
            let link = extract_tag(block, "link").map(clean_text).filter(|l| !l.is_empty());
            let summary = extract_tag(block, "description")
                .map(clean_text)
                .filter(|s| !s.is_empty())
                .map(|s| s.chars().take(300).collect());
            Some(NewsItem { title, link, summary, source: source.to_string() })
        })
        .take(limit)
        .collect()
}

pub fn parse_cryptopanic(payload: &Value, limit: usize) -> Result<Vec<NewsItem>> {
    let results = payload["results"]
        .as_array()
        .ok_or_else(|| BotError::malformed("cryptopanic", "missing `results` array"))?;

    Ok(results
        .iter()
        .filter_map(|post| {
            let title = clean_text(post["title"].as_str()?);
            if title.is_empty() {
                return None;
            }
            Some(NewsItem {
                title,
                link: post["url"].as_str().map(str::to_string),
                summary: None,
                source: post["source"]["title"].as_str().unwrap_or("cryptopanic").to_string(),
            })
        })
        .take(limit)
        .collect())
}
