use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::error::is_permanent;

/// Bounded retry with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts: attempts.max(1), delay }
    }

    #[cfg(test)]
    pub fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO)
    }
}

/// Runs `op` until it succeeds, fails permanently, or the policy is exhausted.
///
/// The last error is returned with the label and attempt count attached.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_permanent(&e) => {
                warn!("⛔ {} failed permanently: {:#}", label, e);
                return Err(e);
            }
            Err(e) => {
                if attempt >= attempts {
                    return Err(e.context(format!("{} failed after {} attempts", label, attempts)));
                }
                warn!("⚠️ {} failed (Attempt {}/{}): {:#}. Retrying in {:?}...", label, attempt, attempts, e, policy.delay);
                sleep(policy.delay).await;
            }
        }
    }
}

/// Like [`with_retry`], but swaps the final failure for `default`.
pub async fn retry_or<T, F, Fut>(policy: RetryPolicy, label: &str, default: T, op: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match with_retry(policy, label, op).await {
        Ok(value) => value,
        Err(e) => {
            error!("❌ {} exhausted, using fallback value: {:#}", label, e);
            default
        }
    }
}
