use reqwest::Client;
use serde_json::{json, Value};
use std::env;
use tracing::{error, info};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use url::form_urlencoded;

use crate::config::bot_profile::AlertFormat;

/// Operator webhook. With no `ALERT_WEBHOOK` every call is a no-op.
pub struct AlertNotifier {
    client: Client,
    webhook_url: String,
    secret: String,
    keyword: String,
    format: AlertFormat,
}

impl AlertNotifier {
    pub fn new(client: Client, format: AlertFormat) -> Self {
        Self {
            client,
            webhook_url: env::var("ALERT_WEBHOOK").unwrap_or_default(),
            secret: env::var("ALERT_SECRET").unwrap_or_default(),
            keyword: env::var("ALERT_KEYWORD").unwrap_or_default(),
            format,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    /// DingTalk "sign" mode: HMAC-SHA256 of `"{timestamp}\n{secret}"`.
    fn signed_url(&self, timestamp_ms: i64) -> String {
        if self.secret.is_empty() || self.format != AlertFormat::Dingtalk {
            return self.webhook_url.clone();
        }

        let string_to_sign = format!("{}\n{}", timestamp_ms, self.secret);
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(string_to_sign.as_bytes());
        let signature = general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        let encoded: String = form_urlencoded::byte_serialize(signature.as_bytes()).collect();

        let sep = if self.webhook_url.contains('?') { '&' } else { '?' };
        format!("{}{}timestamp={}&sign={}", self.webhook_url, sep, timestamp_ms, encoded)
    }

    /// DingTalk robots drop messages that lack their configured keyword.
    fn attach_keyword(&self, content: &str) -> String {
        if self.keyword.is_empty() || content.contains(&self.keyword) {
            return content.to_string();
        }
        format!("{}\n\n[{}]", content, self.keyword)
    }

    fn payload(&self, content: &str) -> Value {
        let text = format!("⚠️ [market_update_bot]\n{}", self.attach_keyword(content));
        match self.format {
            AlertFormat::Dingtalk => json!({ "msgtype": "text", "text": { "content": text } }),
            AlertFormat::Slack => json!({ "text": text }),
        }
    }

    pub async fn send_alert(&self, content: &str) {
        if !self.is_enabled() {
            return;
        }

        let url = self.signed_url(Utc::now().timestamp_millis());
        match self.client.post(&url).json(&self.payload(content)).send().await {
            Ok(resp) if !resp.status().is_success() => {
                error!("❌ Alert webhook returned {}", resp.status());
            }
            Ok(resp) => {
                if let Ok(body) = resp.json::<Value>().await {
                    if body["errcode"].as_i64().unwrap_or(0) != 0 {
                        error!("❌ Alert webhook error: {}", body);
                        return;
                    }
                }
                info!("📣 Operator alert sent");
            }
            Err(e) => error!("❌ Alert webhook network error: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier(url: &str, secret: &str, keyword: &str, format: AlertFormat) -> AlertNotifier {
        AlertNotifier {
            client: Client::new(),
            webhook_url: url.to_string(),
            secret: secret.to_string(),
            keyword: keyword.to_string(),
            format,
        }
    }

    #[test]
    fn dingtalk_url_is_signed() {
        let n = notifier("https://oapi.dingtalk.com/robot/send?access_token=abc", "SECtest", "", AlertFormat::Dingtalk);
        assert_eq!(
            n.signed_url(1_700_000_000_000),
            "https://oapi.dingtalk.com/robot/send?access_token=abc&timestamp=1700000000000&sign=aZLLrriXgn05YbwaGR7knYsLeJADjr9NwLaNNKpxh4g%3D"
        );

        let unsigned = notifier("https://hooks.slack.com/services/x", "SECtest", "", AlertFormat::Slack);
        assert_eq!(unsigned.signed_url(1), "https://hooks.slack.com/services/x");
    }

    #[test]
    fn keyword_is_attached_once() {
        let n = notifier("https://x", "", "Bot", AlertFormat::Dingtalk);
        assert_eq!(n.attach_keyword("run failed"), "run failed\n\n[Bot]");
        assert_eq!(n.attach_keyword("Bot run failed"), "Bot run failed");
    }

    #[test]
    fn payload_follows_format() {
        let ding = notifier("https://x", "", "", AlertFormat::Dingtalk).payload("boom");
        assert_eq!(ding["msgtype"], "text");
        assert!(ding["text"]["content"].as_str().unwrap().ends_with("boom"));

        let slack = notifier("https://x", "", "", AlertFormat::Slack).payload("boom");
        assert!(slack["text"].as_str().unwrap().ends_with("boom"));
    }

    #[tokio::test]
    async fn disabled_without_webhook() {
        let n = notifier("", "", "", AlertFormat::Dingtalk);
        assert!(!n.is_enabled());
        n.send_alert("nothing happens").await;
    }
}
