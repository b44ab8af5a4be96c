use std::sync::Arc;
use tracing::{info, warn};

use super::gate::QualityGate;
use super::llm::TextProvider;
use super::template::LocalTemplate;
use crate::modules::perception::NewsItem;
use crate::error::is_auth_failure;
use crate::utils::retry::{with_retry, RetryPolicy};

const THREAD_MARKER: &str = "THREAD:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderUsed {
    Primary,
    /// Position in the configured provider list (1 = first alternate).
    Fallback(usize),
    Local,
}

/// Text chosen for one headline. Lives for a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub source_headline: String,
    pub text: String,
    pub follow_up: Option<String>,
    pub provider_used: ProviderUsed,
}

/// Ordered providers, each retried on transient errors, each output gated;
/// the local template closes the chain.
pub struct FallbackChain {
    providers: Vec<Arc<dyn TextProvider>>,
    gate: QualityGate,
    local: LocalTemplate,
    retry: RetryPolicy,
}

impl FallbackChain {
    pub fn new(providers: Vec<Arc<dyn TextProvider>>, gate: QualityGate, retry: RetryPolicy) -> Self {
        let local = LocalTemplate::new(gate.rules().clone());
        Self { providers, gate, local, retry }
    }

    pub async fn generate(&self, item: &NewsItem) -> Candidate {
        for (idx, provider) in self.providers.iter().enumerate() {
            let label = format!("{} generation", provider.name());
            let raw = match with_retry(self.retry, &label, || provider.generate(item)).await {
                Ok(raw) => raw,
                Err(e) if is_auth_failure(&e) => {
                    warn!("🔑 [{}] credentials rejected, skipping: {:#}", provider.name(), e);
                    continue;
                }
                Err(e) => {
                    warn!("🔁 [{}] unavailable, moving on: {:#}", provider.name(), e);
                    continue;
                }
            };

            let (text, follow_up) = split_thread(&raw);
            match self.gate.check(&text, &item.title, provider.requires_subject()) {
                Ok(()) => {
                    info!("✅ [{}] draft accepted ({} chars)", provider.name(), text.chars().count());
                    return Candidate {
                        source_headline: item.title.clone(),
                        text,
                        follow_up: self.vet_follow_up(follow_up),
                        provider_used: if idx == 0 { ProviderUsed::Primary } else { ProviderUsed::Fallback(idx) },
                    };
                }
                Err(reason) => warn!("🚫 [{}] draft rejected: {}", provider.name(), reason),
            }
        }

        info!("🧩 All providers exhausted, using local template");
        let (text, follow_up) = self.local.generate(item);
        Candidate {
            source_headline: item.title.clone(),
            text,
            follow_up: self.vet_follow_up(follow_up),
            provider_used: ProviderUsed::Local,
        }
    }

    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    fn vet_follow_up(&self, follow_up: Option<String>) -> Option<String> {
        let reply = follow_up?;
        match self.gate.check_reply(&reply) {
            Ok(()) => Some(reply),
            Err(reason) => {
                warn!("✂️ Dropping follow-up: {}", reason);
                None
            }
        }
    }
}

/// Splits provider output at a line starting with `THREAD:`.
pub fn split_thread(raw: &str) -> (String, Option<String>) {
    let mut primary = Vec::new();
    let mut reply: Option<Vec<&str>> = None;

    for line in raw.lines() {
        match reply.as_mut() {
            Some(lines) => lines.push(line),
            None => {
                let trimmed = line.trim_start();
                let is_marker = trimmed
                    .get(..THREAD_MARKER.len())
                    .map_or(false, |head| head.eq_ignore_ascii_case(THREAD_MARKER));
                if is_marker {
                    reply = Some(vec![&trimmed[THREAD_MARKER.len()..]]);
                } else {
                    primary.push(line);
                }
            }
        }
    }

    let follow_up = reply
        .map(|lines| lines.join("\n").trim().to_string())
        .filter(|r| !r.is_empty());
    (primary.join("\n").trim().to_string(), follow_up)
}
