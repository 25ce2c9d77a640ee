//! Sliding-window rate limiting keyed by (user, endpoint, window)

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error, Clone)]
pub enum CounterError {
    #[error("Counter backend error: {0}")]
    Backend(String),
}

/// Atomic counter backend with per-key TTL.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the key and return the post-increment count. A missing
    /// or expired key counts from zero.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CounterError>;

    /// Delete the key. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), CounterError>;
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl RateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn reject(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

fn minute_key(user_id: Uuid, endpoint: &str) -> String {
    format!(
        "rate_limit:{}:{}:minute:{}",
        user_id,
        endpoint,
        Utc::now().format("%Y-%m-%d-%H-%M")
    )
}

fn hour_key(user_id: Uuid, endpoint: &str) -> String {
    format!(
        "rate_limit:{}:{}:hour:{}",
        user_id,
        endpoint,
        Utc::now().format("%Y-%m-%d-%H")
    )
}

/// Per-user, per-endpoint request limiter over two calendar-bucketed
/// windows (minute and hour).
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// A window rejects when its post-increment count exceeds the
    /// ceiling. The hour counter is untouched once the minute window has
    /// rejected. Backend failure allows the request.
    pub async fn check(
        &self,
        user_id: Uuid,
        endpoint: &str,
        per_minute: u64,
        per_hour: u64,
    ) -> RateDecision {
        let minute = minute_key(user_id, endpoint);
        match self.store.increment(&minute, Duration::from_secs(60)).await {
            Ok(count) if count > per_minute => {
                return RateDecision::reject(format!(
                    "Rate limit exceeded: {} requests per minute",
                    per_minute
                ));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Counter backend failed ({}), allowing request: {}", minute, e);
                return RateDecision::allow();
            }
        }

        let hour = hour_key(user_id, endpoint);
        match self.store.increment(&hour, Duration::from_secs(3600)).await {
            Ok(count) if count > per_hour => RateDecision::reject(format!(
                "Rate limit exceeded: {} requests per hour",
                per_hour
            )),
            Ok(_) => RateDecision::allow(),
            Err(e) => {
                tracing::warn!("Counter backend failed ({}), allowing request: {}", hour, e);
                RateDecision::allow()
            }
        }
    }

    /// Administrative reset: drops the current minute and hour windows
    /// for the (user, endpoint) pair.
    pub async fn reset(&self, user_id: Uuid, endpoint: &str) -> Result<(), CounterError> {
        self.store.remove(&minute_key(user_id, endpoint)).await?;
        self.store.remove(&hour_key(user_id, endpoint)).await?;
        Ok(())
    }
}

/// In-process counter backend: count plus expiry instant per key.
pub struct InMemoryCounterStore {
    counters: Arc<RwLock<HashMap<String, (u64, Instant)>>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Drop keys whose TTL has lapsed (call periodically).
    pub async fn purge_expired(&self) {
        let mut counters = self.counters.write().await;
        let now = Instant::now();
        counters.retain(|_, (_, expires_at)| *expires_at > now);
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CounterError> {
        let mut counters = self.counters.write().await;
        let now = Instant::now();

        let entry = counters
            .entry(key.to_string())
            .or_insert_with(|| (0, now + ttl));
        if entry.1 <= now {
            // Expired bucket restarts from zero
            *entry = (0, now + ttl);
        }

        entry.0 += 1;
        Ok(entry.0)
    }

    async fn remove(&self, key: &str) -> Result<(), CounterError> {
        self.counters.write().await.remove(key);
        Ok(())
    }
}
