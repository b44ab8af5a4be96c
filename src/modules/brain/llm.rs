use reqwest::Client;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::env;
use tracing::{debug, info};

use crate::config::bot_profile::{GateConfig, ProviderConfig, ProviderKind};
use crate::error::BotError;
use crate::modules::perception::NewsItem;
use crate::utils::http_client::ensure_success;
use crate::utils::text::{derive_hashtags, subject_token};

/// One text-generation backend. Implementations make a single attempt;
/// retries and fallbacks belong to the chain.
#[async_trait]
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether output must mention the headline's leading token.
    fn requires_subject(&self) -> bool {
        false
    }

    async fn generate(&self, item: &NewsItem) -> Result<String>;
}

pub struct LlmProvider {
    client: Client,
    cfg: ProviderConfig,
    api_key: String,
    rules: GateConfig,
    threads: bool,
}

impl LlmProvider {
    pub fn new(client: Client, cfg: ProviderConfig, rules: GateConfig, threads: bool) -> Self {
        Self {
            api_key: env::var(&cfg.api_key_env).unwrap_or_default(),
            client,
            cfg,
            rules,
            threads,
        }
    }

    async fn call_chat(&self, sys_prompt: &str, user_prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.cfg.model,
            "messages": [
                {"role": "system", "content": sys_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": self.cfg.temperature,
        });

        let resp = self.client.post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;
        let payload: Value = ensure_success(&self.cfg.name, resp).await?.json().await?;
        parse_chat_completion(&self.cfg.name, &payload)
    }

    async fn call_gemini(&self, sys_prompt: &str, user_prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.cfg.base_url.trim_end_matches('/'),
            self.cfg.model
        );
        let body = json!({
            "systemInstruction": {"parts": [{"text": sys_prompt}]},
            "contents": [{"role": "user", "parts": [{"text": user_prompt}]}],
            "generationConfig": {"temperature": self.cfg.temperature},
        });

        let resp = self.client.post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let payload: Value = ensure_success(&self.cfg.name, resp).await?.json().await?;
        parse_gemini(&self.cfg.name, &payload)
    }
}

#[async_trait]
impl TextProvider for LlmProvider {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn requires_subject(&self) -> bool {
        self.cfg.require_subject
    }

    async fn generate(&self, item: &NewsItem) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(BotError::MissingCredential(format!("{} ({})", self.cfg.name, self.cfg.api_key_env)).into());
        }

        let (sys_prompt, user_prompt) = build_prompts(item, &self.rules, self.threads, self.cfg.require_subject);
        debug!("🧠 [{}] prompt:\n{}\n{}", self.cfg.name, sys_prompt, user_prompt);
        info!("🧠 [{}] drafting post with {}...", self.cfg.name, self.cfg.model);

        let raw = match self.cfg.kind {
            ProviderKind::Openai => self.call_chat(&sys_prompt, &user_prompt).await?,
            ProviderKind::Gemini => self.call_gemini(&sys_prompt, &user_prompt).await?,
        };
        Ok(clean_output(&raw))
    }
}

pub fn build_prompts(item: &NewsItem, rules: &GateConfig, threads: bool, require_subject: bool) -> (String, String) {
    let tags = derive_hashtags(&item.title).join(" ");
    let mut sys_prompt = format!(
        "You write posts for a crypto news account on X.\n\
        RULES:\n\
        - At most {} characters and between {} and {} words.\n\
        - Include 1-3 relevant hashtags, for example: {}\n\
        - No links, no code, no bracketed or placeholder text.\n\
        - Plain text; a couple of emojis are fine.\n\
        - Reply with the post text only.",
        rules.max_chars, rules.min_words, rules.max_words, tags
    );
    if threads {
        sys_prompt.push_str(&format!(
            "\n- You may add one follow-up reply on a new line starting with `THREAD:` (at most {} characters).",
            rules.max_chars
        ));
    }

    let mut user_prompt = format!("Headline: {}\n", item.title);
    if let Some(summary) = &item.summary {
        user_prompt.push_str(&format!("Context: {}\n", summary));
    }
    if require_subject {
        if let Some(subject) = subject_token(&item.title) {
            user_prompt.push_str(&format!("The post must mention \"{}\".\n", subject));
        }
    }
    user_prompt.push_str("Write the post.");
    (sys_prompt, user_prompt)
}

pub fn parse_chat_completion(service: &str, payload: &Value) -> Result<String> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| BotError::malformed(service, "no choices[0].message.content").into())
}

pub fn parse_gemini(service: &str, payload: &Value) -> Result<String> {
    payload["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| BotError::malformed(service, "no candidates[0].content.parts[0].text").into())
}

fn strip_reasoning(raw: &str) -> String {
    let mut clean = raw.to_string();
    while let (Some(start), Some(end)) = (clean.find("<think>"), clean.find("</think>")) {
        if end < start {
            break;
        }
        clean.replace_range(start..end + "</think>".len(), "");
    }
    clean
}

/// Removes reasoning blocks, code fences, labels and wrapping quotes.
pub fn clean_output(raw: &str) -> String {
    let without_think = strip_reasoning(raw);
    let lines: Vec<&str> = without_think
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect();
    let mut text = lines.join("\n").trim().to_string();

    for label in ["Tweet:", "Post:", "tweet:", "post:"] {
        if let Some(rest) = text.strip_prefix(label) {
            text = rest.trim_start().to_string();
        }
    }

    let quoted = (text.starts_with('"') && text.ends_with('"')) || (text.starts_with('“') && text.ends_with('”'));
    if quoted && text.chars().count() >= 2 {
        let inner: Vec<char> = text.chars().collect();
        text = inner[1..inner.len() - 1].iter().collect::<String>().trim().to_string();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> NewsItem {
        NewsItem {
            title: "ETF Approved for XRP".to_string(),
            link: Some("https://example.com/xrp".to_string()),
            summary: Some("Regulators signed off.".to_string()),
            source: "test".to_string(),
        }
    }

    #[test]
    fn prompts_carry_limits_and_context() {
        let (sys, user) = build_prompts(&item(), &GateConfig::default(), true, true);
        assert!(sys.contains("At most 280 characters"));
        assert!(sys.contains("#XRP #Crypto"));
        assert!(sys.contains("THREAD:"));
        assert!(user.contains("Headline: ETF Approved for XRP"));
        assert!(user.contains("Context: Regulators signed off."));
        assert!(user.contains("must mention \"ETF\""));

        let (sys, user) = build_prompts(&item(), &GateConfig::default(), false, false);
        assert!(!sys.contains("THREAD:"));
        assert!(!user.contains("must mention"));
    }

    #[test]
    fn parses_both_response_shapes() {
        let chat = json!({"choices": [{"message": {"content": "hello #XRP"}}]});
        assert_eq!(parse_chat_completion("deepseek", &chat).unwrap(), "hello #XRP");

        let gemini = json!({"candidates": [{"content": {"parts": [{"text": "gm #BTC"}]}}]});
        assert_eq!(parse_gemini("gemini", &gemini).unwrap(), "gm #BTC");

        let err = parse_chat_completion("deepseek", &json!({"error": "overloaded"})).unwrap_err();
        assert!(!crate::error::is_permanent(&err));
    }

    #[test]
    fn cleans_model_debris() {
        let raw = "<think>user wants a tweet</think>\n```\nTweet: \"XRP ETF is live! #XRP\"\n```";
        assert_eq!(clean_output(raw), "XRP ETF is live! #XRP");
        assert_eq!(clean_output("  plain text #BTC "), "plain text #BTC");
    }

    #[tokio::test]
    async fn missing_key_is_a_permanent_error() {
        let cfg = ProviderConfig {
            name: "ghost".to_string(),
            kind: ProviderKind::Openai,
            base_url: "http://127.0.0.1:9".to_string(),
            model: "none".to_string(),
            api_key_env: "MARKET_BOT_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            temperature: 0.7,
            require_subject: false,
        };
        let provider = LlmProvider::new(Client::new(), cfg, GateConfig::default(), false);
        let err = provider.generate(&item()).await.unwrap_err();
        assert!(crate::error::is_permanent(&err));
    }
}
