use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use sha1::Sha1;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::BotError;
use crate::utils::http_client::ensure_success;

const X_API_BASE: &str = "https://api.twitter.com";
const SERVICE: &str = "x";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub id: String,
    pub reply_to: Option<String>,
    pub content: String,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Posts `text`, threaded under `reply_to` when given.
    async fn publish(&self, text: &str, reply_to: Option<&str>) -> Result<PostRecord>;

    /// Likes + reposts + replies + quotes for one of our posts.
    async fn fetch_engagement(&self, post_id: &str) -> Result<u64>;

    /// True when the configured credentials are accepted.
    async fn verify_identity(&self) -> bool;
}

/// User-context credentials for OAuth 1.0a.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub token: String,
    pub token_secret: String,
}

impl OAuthCredentials {
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Some(Self {
            consumer_key: var("API_KEY")?,
            consumer_secret: var("API_SECRET")?,
            token: var("ACCESS_TOKEN")?,
            token_secret: var("ACCESS_TOKEN_SECRET")?,
        })
    }

    fn oauth_params(&self, nonce: &str, timestamp: i64) -> Vec<(String, String)> {
        vec![
            ("oauth_consumer_key".into(), self.consumer_key.clone()),
            ("oauth_nonce".into(), nonce.to_string()),
            ("oauth_signature_method".into(), "HMAC-SHA1".into()),
            ("oauth_timestamp".into(), timestamp.to_string()),
            ("oauth_token".into(), self.token.clone()),
            ("oauth_version".into(), "1.0".into()),
        ]
    }

    /// HMAC-SHA1 over the signature base string. `params` holds the oauth
    /// parameters plus any query or form parameters (JSON bodies are not signed).
    pub fn signature(&self, method: &str, base_url: &str, params: &[(String, String)]) -> String {
        let mut encoded: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (urlencoding::encode(k).into_owned(), urlencoding::encode(v).into_owned()))
            .collect();
        encoded.sort();
        let param_string = encoded
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let base = format!(
            "{}&{}&{}",
            method.to_uppercase(),
            urlencoding::encode(base_url),
            urlencoding::encode(&param_string)
        );
        let key = format!(
            "{}&{}",
            urlencoding::encode(&self.consumer_secret),
            urlencoding::encode(&self.token_secret)
        );

        let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(base.as_bytes());
        general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    pub fn authorization_header(&self, method: &str, base_url: &str, query: &[(String, String)]) -> String {
        let nonce = Uuid::new_v4().simple().to_string();
        self.authorization_header_with(method, base_url, query, &nonce, Utc::now().timestamp())
    }

    fn authorization_header_with(
        &self,
        method: &str,
        base_url: &str,
        query: &[(String, String)],
        nonce: &str,
        timestamp: i64,
    ) -> String {
        let mut oauth = self.oauth_params(nonce, timestamp);
        let mut all = oauth.clone();
        all.extend_from_slice(query);
        oauth.push(("oauth_signature".into(), self.signature(method, base_url, &all)));

        let fields = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {}", fields)
    }
}

/// X API v2 publisher. In dry-run mode nothing leaves the process.
pub struct XPublisher {
    client: Client,
    credentials: Option<OAuthCredentials>,
    api_base: String,
    dry_run: bool,
    dry_run_seq: AtomicU64,
}

impl XPublisher {
    pub fn new(client: Client, dry_run: bool) -> Self {
        let credentials = OAuthCredentials::from_env();
        if credentials.is_none() && !dry_run {
            warn!("🔑 X credentials incomplete (API_KEY / API_SECRET / ACCESS_TOKEN / ACCESS_TOKEN_SECRET)");
        }
        Self {
            client,
            credentials,
            api_base: X_API_BASE.to_string(),
            dry_run,
            dry_run_seq: AtomicU64::new(0),
        }
    }

    fn credentials(&self) -> Result<&OAuthCredentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| BotError::MissingCredential("X API_KEY/API_SECRET/ACCESS_TOKEN/ACCESS_TOKEN_SECRET".into()).into())
    }

    async fn signed(&self, method: Method, path: &str, query: &[(String, String)], body: Option<&Value>) -> Result<Value> {
        let creds = self.credentials()?;
        let url = format!("{}{}", self.api_base, path);
        let auth = creds.authorization_header(method.as_str(), &url, query);

        let mut req = self.client.request(method, &url).header("Authorization", auth);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = ensure_success(SERVICE, req.send().await?).await?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Publisher for XPublisher {
    async fn publish(&self, text: &str, reply_to: Option<&str>) -> Result<PostRecord> {
        if self.dry_run {
            let n = self.dry_run_seq.fetch_add(1, Ordering::SeqCst) + 1;
            info!("🧪 [DRY RUN] would post (reply_to={:?}):\n{}", reply_to, text);
            return Ok(PostRecord {
                id: format!("dry-run-{}", n),
                reply_to: reply_to.map(str::to_string),
                content: text.to_string(),
            });
        }

        let mut body = json!({ "text": text });
        if let Some(parent) = reply_to {
            body["reply"] = json!({ "in_reply_to_tweet_id": parent });
        }

        let payload = self.signed(Method::POST, "/2/tweets", &[], Some(&body)).await?;
        let id = parse_created_id(&payload)?;
        info!("🐦 Posted {} ({} chars)", id, text.chars().count());
        Ok(PostRecord {
            id,
            reply_to: reply_to.map(str::to_string),
            content: text.to_string(),
        })
    }

    async fn fetch_engagement(&self, post_id: &str) -> Result<u64> {
        if self.dry_run {
            return Ok(0);
        }
        let query = vec![("tweet.fields".to_string(), "public_metrics".to_string())];
        let path = format!("/2/tweets/{}", urlencoding::encode(post_id));
        let payload = self.signed(Method::GET, &path, &query, None).await?;
        parse_engagement(&payload)
    }

    async fn verify_identity(&self) -> bool {
        if self.dry_run {
            return true;
        }
        match self.signed(Method::GET, "/2/users/me", &[], None).await {
            Ok(payload) => {
                let username = payload["data"]["username"].as_str().unwrap_or("?");
                info!("🔐 Authenticated as @{}", username);
                true
            }
            Err(e) => {
                error!("🔐 X authentication failed: {:#}", e);
                false
            }
        }
    }
}

pub fn parse_created_id(payload: &Value) -> Result<String> {
    payload["data"]["id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| BotError::malformed(SERVICE, "no data.id in create response").into())
}

pub fn parse_engagement(payload: &Value) -> Result<u64> {
    let metrics = &payload["data"]["public_metrics"];
    if !metrics.is_object() {
        return Err(BotError::malformed(SERVICE, "no data.public_metrics").into());
    }
    Ok(["like_count", "retweet_count", "reply_count", "quote_count"]
        .iter()
        .map(|k| metrics[*k].as_u64().unwrap_or(0))
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs_credentials() -> OAuthCredentials {
        OAuthCredentials {
            consumer_key: "xvz1evFS4wEEPTGEFPHBog".into(),
            consumer_secret: "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw".into(),
            token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".into(),
            token_secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE".into(),
        }
    }

    #[test]
    fn signature_matches_reference_vector() {
        let creds = docs_credentials();
        let mut params = creds.oauth_params("kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg", 1318622958);
        params.push(("include_entities".into(), "true".into()));
        params.push(("status".into(), "Hello Ladies + Gentlemen, a signed OAuth request!".into()));

        let sig = creds.signature("POST", "https://api.twitter.com/1.1/statuses/update.json", &params);
        assert_eq!(sig, "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
    }

    #[test]
    fn header_carries_encoded_signature() {
        let creds = docs_credentials();
        let header = creds.authorization_header_with(
            "GET",
            "https://api.twitter.com/2/users/me",
            &[],
            "abc123",
            1_700_000_000,
        );
        assert!(header.starts_with("OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\""));
        assert!(header.contains("oauth_nonce=\"abc123\""));
        assert!(header.contains("oauth_signature=\""));
        let sig_field = header.split("oauth_signature=\"").nth(1).unwrap();
        assert!(!sig_field.split('"').next().unwrap().contains('+'));
    }

    #[test]
    fn parses_api_payloads() {
        let created = json!({"data": {"id": "1790000000000000001", "text": "gm"}});
        assert_eq!(parse_created_id(&created).unwrap(), "1790000000000000001");
        assert!(parse_created_id(&json!({"errors": []})).is_err());

        let metrics = json!({"data": {"id": "1", "public_metrics": {
            "like_count": 10, "retweet_count": 3, "reply_count": 2, "quote_count": 1, "impression_count": 999
        }}});
        assert_eq!(parse_engagement(&metrics).unwrap(), 16);
        assert!(parse_engagement(&json!({"data": {"id": "1"}})).is_err());
    }

    #[tokio::test]
    async fn dry_run_never_touches_the_network() {
        let publisher = XPublisher::new(Client::new(), true);
        assert!(publisher.verify_identity().await);

        let first = publisher.publish("hello #Crypto", None).await.unwrap();
        let reply = publisher.publish("more", Some(&first.id)).await.unwrap();
        assert_eq!(first.id, "dry-run-1");
        assert_eq!(reply.id, "dry-run-2");
        assert_eq!(reply.reply_to.as_deref(), Some("dry-run-1"));
        assert_eq!(publisher.fetch_engagement("dry-run-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn live_publish_without_credentials_is_permanent() {
        let publisher = XPublisher {
            client: Client::new(),
            credentials: None,
            api_base: "http://127.0.0.1:9".to_string(),
            dry_run: false,
            dry_run_seq: AtomicU64::new(0),
        };
        let err = publisher.publish("hello", None).await.unwrap_err();
        assert!(crate::error::is_permanent(&err));
        assert!(!publisher.verify_identity().await);
    }
}
