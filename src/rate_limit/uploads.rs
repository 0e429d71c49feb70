//! Sliding-window upload limiter keyed by user id.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::UploadLimitConfig;
use crate::error::ExtractError;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Upload counts for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadStats {
    pub last_minute: u32,
    pub last_hour: u32,
    pub per_minute_limit: u32,
    pub per_hour_limit: u32,
}

impl UploadStats {
    pub fn remaining_this_minute(&self) -> u32 {
        self.per_minute_limit.saturating_sub(self.last_minute)
    }

    pub fn remaining_this_hour(&self) -> u32 {
        self.per_hour_limit.saturating_sub(self.last_hour)
    }
}

/// Upload timestamps within the last hour, oldest first.
#[derive(Debug, Default)]
struct UserWindow {
    uploads: VecDeque<Instant>,
}

impl UserWindow {
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.uploads.front() {
            if now.saturating_duration_since(oldest) >= HOUR {
                self.uploads.pop_front();
            } else {
                break;
            }
        }
    }

    fn count_within(&self, now: Instant, window: Duration) -> u32 {
        self.uploads
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < window)
            .count() as u32
    }

    /// Seconds until the oldest upload inside `window` falls out of it.
    fn wait_for(&self, now: Instant, window: Duration) -> u64 {
        self.uploads
            .iter()
            .find(|&&t| now.saturating_duration_since(t) < window)
            .map(|&t| {
                let remaining = window.saturating_sub(now.saturating_duration_since(t));
                remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
            })
            .unwrap_or(0)
            .max(1)
    }

    fn retry_after(&self, now: Instant, config: &UploadLimitConfig) -> Option<u64> {
        let mut wait = None;
        if self.count_within(now, MINUTE) >= config.per_minute {
            wait = Some(self.wait_for(now, MINUTE));
        }
        if self.count_within(now, HOUR) >= config.per_hour {
            let hour_wait = self.wait_for(now, HOUR);
            wait = Some(wait.map_or(hour_wait, |w: u64| w.max(hour_wait)));
        }
        wait
    }
}

/// In-memory per-user upload limiter.
#[derive(Clone)]
pub struct UploadLimiter {
    users: Arc<RwLock<HashMap<String, UserWindow>>>,
    config: UploadLimitConfig,
}

impl UploadLimiter {
    pub fn new(config: UploadLimitConfig) -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Fail with `UploadRateLimited` if `user_id` is at either limit.
    pub async fn check(&self, user_id: &str) -> Result<(), ExtractError> {
        self.check_at(user_id, Instant::now()).await
    }

    /// Count one upload for `user_id`.
    pub async fn record(&self, user_id: &str) {
        self.record_at(user_id, Instant::now()).await
    }

    /// Check and record in one step.
    pub async fn acquire(&self, user_id: &str) -> Result<(), ExtractError> {
        self.acquire_at(user_id, Instant::now()).await
    }

    pub async fn stats(&self, user_id: &str) -> UploadStats {
        self.stats_at(user_id, Instant::now()).await
    }

    async fn check_at(&self, user_id: &str, now: Instant) -> Result<(), ExtractError> {
        let users = self.users.read().await;
        match users
            .get(user_id)
            .and_then(|w| w.retry_after(now, &self.config))
        {
            Some(retry_after_secs) => Err(ExtractError::UploadRateLimited { retry_after_secs }),
            None => Ok(()),
        }
    }

    async fn record_at(&self, user_id: &str, now: Instant) {
        let mut users = self.users.write().await;
        let window = users.entry(user_id.to_string()).or_default();
        window.prune(now);
        window.uploads.push_back(now);
    }

    async fn acquire_at(&self, user_id: &str, now: Instant) -> Result<(), ExtractError> {
        let mut users = self.users.write().await;
        let window = users.entry(user_id.to_string()).or_default();
        window.prune(now);
        if let Some(retry_after_secs) = window.retry_after(now, &self.config) {
            debug!(user_id, retry_after_secs, "Upload rate limited");
            return Err(ExtractError::UploadRateLimited { retry_after_secs });
        }
        window.uploads.push_back(now);
        Ok(())
    }

    async fn stats_at(&self, user_id: &str, now: Instant) -> UploadStats {
        let users = self.users.read().await;
        let (last_minute, last_hour) = users
            .get(user_id)
            .map(|w| (w.count_within(now, MINUTE), w.count_within(now, HOUR)))
            .unwrap_or((0, 0));
        UploadStats {
            last_minute,
            last_hour,
            per_minute_limit: self.config.per_minute,
            per_hour_limit: self.config.per_hour,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_minute: u32, per_hour: u32) -> UploadLimiter {
        UploadLimiter::new(UploadLimitConfig {
            per_minute,
            per_hour,
        })
    }

    #[tokio::test]
    async fn test_minute_limit() {
        let limiter = limiter(2, 100);
        let start = Instant::now();

        limiter.acquire_at("alice", start).await.unwrap();
        limiter
            .acquire_at("alice", start + Duration::from_secs(10))
            .await
            .unwrap();

        let err = limiter
            .acquire_at("alice", start + Duration::from_secs(20))
            .await
            .unwrap_err();
        match err {
            ExtractError::UploadRateLimited { retry_after_secs } => {
                assert_eq!(retry_after_secs, 40)
            }
            other => panic!("unexpected error: {other}"),
        }

        // Other users are unaffected.
        limiter.check_at("bob", start).await.unwrap();

        // The oldest upload leaves the window after a minute.
        limiter
            .acquire_at("alice", start + Duration::from_secs(61))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hour_limit() {
        let limiter = limiter(10, 3);
        let start = Instant::now();
        for i in 0..3 {
            limiter
                .record_at("alice", start + Duration::from_secs(i * 120))
                .await;
        }

        let now = start + Duration::from_secs(600);
        let err = limiter.check_at("alice", now).await.unwrap_err();
        assert!(matches!(
            err,
            ExtractError::UploadRateLimited {
                retry_after_secs: 3000
            }
        ));

        let stats = limiter.stats_at("alice", now).await;
        assert_eq!(stats.last_minute, 0);
        assert_eq!(stats.last_hour, 3);
        assert_eq!(stats.remaining_this_hour(), 0);
        assert_eq!(stats.remaining_this_minute(), 10);
    }

    #[tokio::test]
    async fn test_rejected_upload_not_counted() {
        let limiter = limiter(1, 100);
        let start = Instant::now();
        limiter.acquire_at("alice", start).await.unwrap();
        assert!(limiter.acquire_at("alice", start).await.is_err());
        assert_eq!(limiter.stats_at("alice", start).await.last_minute, 1);
    }
}
