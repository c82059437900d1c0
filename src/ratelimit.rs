//! Per-user token bucket in front of the chat navigation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::RateLimitConfig;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    warnings_sent: u32,
    last_warning_at: Option<Instant>,
}

/// Whether an action may go ahead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Over the limit. `warning` carries the escalation level (1-based) when
    /// the user should be told, and is `None` while a recent warning stands.
    Throttled { warning: Option<u32> },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Text for the n-th consecutive warning
pub fn warning_message(level: u32) -> &'static str {
    match level {
        0 | 1 => "You are sending messages too fast. Please slow down.",
        2 => "Still too many messages. Please wait a moment before continuing.",
        _ => "Rate limit exceeded repeatedly. Please wait a minute before trying again.",
    }
}

/// Buckets refill continuously at `per_minute / 60` tokens per second up to
/// `per_minute`. New users start with `burst` tokens.
pub struct RateLimiter {
    buckets: RwLock<HashMap<i64, Arc<Mutex<Bucket>>>>,
    max_tokens: f64,
    refill_per_sec: f64,
    initial_tokens: f64,
    warning_interval: Duration,
    idle_ttl: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let per_minute = f64::from(config.per_minute.max(1));
        Self {
            buckets: RwLock::new(HashMap::new()),
            max_tokens: per_minute,
            refill_per_sec: per_minute / 60.0,
            initial_tokens: f64::from(config.burst.max(1)).min(per_minute),
            warning_interval: Duration::from_secs(config.warning_interval_secs),
            idle_ttl: Duration::from_secs(config.idle_ttl_secs),
        }
    }

    pub async fn check(&self, user_id: i64) -> Admission {
        self.check_at(user_id, Instant::now()).await
    }

    pub async fn check_at(&self, user_id: i64, now: Instant) -> Admission {
        let bucket = self.bucket(user_id, now).await;
        let mut bucket = bucket.lock().await;

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.max_tokens);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            bucket.warnings_sent = 0;
            return Admission::Allowed;
        }

        let warn = bucket
            .last_warning_at
            .map_or(true, |at| now.saturating_duration_since(at) > self.warning_interval);
        if !warn {
            return Admission::Throttled { warning: None };
        }
        bucket.warnings_sent += 1;
        bucket.last_warning_at = Some(now);
        tracing::warn!(user_id, warnings = bucket.warnings_sent, "User rate limited");
        Admission::Throttled {
            warning: Some(bucket.warnings_sent),
        }
    }

    async fn bucket(&self, user_id: i64, now: Instant) -> Arc<Mutex<Bucket>> {
        if let Some(bucket) = self.buckets.read().await.get(&user_id) {
            return bucket.clone();
        }
        self.buckets
            .write()
            .await
            .entry(user_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(Bucket {
                    tokens: self.initial_tokens,
                    last_refill: now,
                    warnings_sent: 0,
                    last_warning_at: None,
                }))
            })
            .clone()
    }

    /// Drop buckets idle for longer than the TTL; returns how many went
    pub async fn sweep_at(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        let mut idle = Vec::new();
        for (user_id, bucket) in buckets.iter() {
            // A locked bucket is in use
            if let Ok(bucket) = bucket.try_lock() {
                if now.saturating_duration_since(bucket.last_refill) > self.idle_ttl {
                    idle.push(*user_id);
                }
            }
        }
        for user_id in idle {
            buckets.remove(&user_id);
        }
        let removed = before - buckets.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = buckets.len(), "Rate limiter swept");
        }
        removed
    }

    pub async fn tracked_users(&self) -> usize {
        self.buckets.read().await.len()
    }

    /// Sweep periodically for as long as the limiter is alive
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                limiter.sweep_at(Instant::now()).await;
            }
        })
    }
}
