//! Fixed-window rate limiting keyed by user and model.

use std::sync::Arc;

use tracing::warn;

use crate::cache::CacheStore;
use crate::error::{PlatformError, Result};

pub const DEFAULT_REQUESTS_PER_MINUTE: i64 = 60;
pub const DEFAULT_WINDOW_SECS: i64 = 60;

/// Per-user, per-model fixed-window limiter backed by a [`CacheStore`].
pub struct RateLimiter {
    cache: Arc<dyn CacheStore>,
    limit: i64,
    window_secs: i64,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self::with_limit(cache, DEFAULT_REQUESTS_PER_MINUTE, DEFAULT_WINDOW_SECS)
    }

    pub fn with_limit(cache: Arc<dyn CacheStore>, limit: i64, window_secs: i64) -> Self {
        Self {
            cache,
            limit,
            window_secs,
        }
    }

    fn key(user_id: &str, model_id: &str) -> String {
        format!("rate_limit:{}:{}", user_id, model_id)
    }

    /// Count this request against the window and reject it if over the limit.
    ///
    /// The increment and the check are a single cache operation, so two
    /// concurrent requests at the boundary cannot both observe a count under
    /// the limit and slip past it.
    pub fn check_and_increment(&self, user_id: &str, model_id: &str) -> Result<()> {
        let key = Self::key(user_id, model_id);
        let count = self.cache.increment(&key, 1, Some(self.window_secs));

        if count > self.limit {
            warn!(
                user_id,
                model_id, count, limit = self.limit, "Rate limit exceeded"
            );
            return Err(PlatformError::RateLimitExceeded {
                retry_after_secs: self.window_secs,
            });
        }

        Ok(())
    }

    /// Requests left in the current window, clamped at zero
    pub fn remaining(&self, user_id: &str, model_id: &str) -> i64 {
        let key = Self::key(user_id, model_id);
        let used: i64 = self
            .cache
            .get(&key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        (self.limit - used).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use std::time::Duration;

    fn limiter(limit: i64, window_secs: i64) -> RateLimiter {
        RateLimiter::with_limit(Arc::new(InMemoryCache::new()), limit, window_secs)
    }

    #[test]
    fn test_allows_up_to_limit_then_rejects() {
        let limiter = limiter(3, 60);

        for _ in 0..3 {
            assert!(limiter.check_and_increment("user-1", "model-1").is_ok());
        }

        let err = limiter.check_and_increment("user-1", "model-1").unwrap_err();
        match err {
            PlatformError::RateLimitExceeded { retry_after_secs } => {
                assert_eq!(retry_after_secs, 60);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_remaining_decreases_per_request() {
        let limiter = limiter(5, 60);

        assert_eq!(limiter.remaining("user-1", "model-1"), 5);
        limiter.check_and_increment("user-1", "model-1").unwrap();
        limiter.check_and_increment("user-1", "model-1").unwrap();
        assert_eq!(limiter.remaining("user-1", "model-1"), 3);
    }

    #[test]
    fn test_users_and_models_have_independent_windows() {
        let limiter = limiter(1, 60);

        assert!(limiter.check_and_increment("user-1", "model-1").is_ok());
        assert!(limiter.check_and_increment("user-1", "model-1").is_err());

        // Different user and different model both still have room
        assert!(limiter.check_and_increment("user-2", "model-1").is_ok());
        assert!(limiter.check_and_increment("user-1", "model-2").is_ok());
    }

    #[tokio::test]
    async fn test_window_resets_after_expiry() {
        let limiter = limiter(1, 1);

        assert!(limiter.check_and_increment("user-1", "model-1").is_ok());
        assert!(limiter.check_and_increment("user-1", "model-1").is_err());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(limiter.check_and_increment("user-1", "model-1").is_ok());
    }
}
