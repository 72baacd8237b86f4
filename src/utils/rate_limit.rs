// src/utils/rate_limit.rs - Provider pacing and retry with exponential backoff
use anyhow::{anyhow, Result};
use log::{debug, warn};
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::utils::constants::MAX_BACKOFF_MS;

/// Enforces a minimum gap between consecutive calls to one provider.
pub struct RateLimiter {
    name: String,
    min_delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(name: &str, min_delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            min_delay,
            last_call: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits until `min_delay` has passed since the previous call, then
    /// claims the slot.
    pub async fn acquire(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// `base * 2^attempt` plus up to half a base of jitter, capped.
pub fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let exponential = base_ms.saturating_mul(1u64 << attempt.min(16));
    let jitter = if base_ms >= 2 {
        rand::thread_rng().gen_range(0..=base_ms / 2)
    } else {
        0
    };
    Duration::from_millis(exponential.saturating_add(jitter).min(MAX_BACKOFF_MS))
}

/// Runs `op` through `limiter`, retrying failures up to `max_retries` times
/// with exponential backoff. Returns the last error once retries run out.
pub async fn retry_with_backoff<T, F, Fut>(
    label: &str,
    limiter: &RateLimiter,
    max_retries: u32,
    base_ms: u64,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        limiter.acquire().await;
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{} call '{}' succeeded after {} retries", limiter.name(), label, attempt);
                }
                return Ok(value);
            }
            Err(e) if attempt < max_retries => {
                let delay = backoff_delay(attempt, base_ms);
                warn!(
                    "{} call '{}' failed (attempt {}/{}): {}. Retrying in {:?}",
                    limiter.name(),
                    label,
                    attempt + 1,
                    max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(anyhow!(
                    "{} call '{}' failed after {} attempts: {}",
                    limiter.name(),
                    label,
                    attempt + 1,
                    e
                ));
            }
        }
    }
}
