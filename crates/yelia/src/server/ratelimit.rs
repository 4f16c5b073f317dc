//! Fixed-window request limiting per route and caller

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

/// Buckets kept before the least recently used one is evicted
const MAX_BUCKETS: usize = 10_000;

#[derive(Debug)]
struct Window {
  started: Instant,
  count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
  limit: u32,
  window: Duration,
  buckets: Mutex<LruCache<(String, String), Window>>,
}

impl RateLimiter {
  pub fn new(limit: u32, window: Duration) -> Self {
    Self::with_capacity(limit, window, MAX_BUCKETS)
  }

  pub fn with_capacity(limit: u32, window: Duration, capacity: usize) -> Self {
    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    Self { limit, window, buckets: Mutex::new(LruCache::new(capacity)) }
  }

  pub fn per_minute(limit: u32) -> Self {
    Self::new(limit, Duration::from_secs(60))
  }

  /// Count one request; false once the window's allowance is used up
  pub async fn check(&self, route: &str, key: &str) -> bool {
    let now = Instant::now();
    let mut buckets = self.buckets.lock().await;

    let bucket = buckets
      .get_or_insert_mut((route.to_string(), key.to_string()), || Window { started: now, count: 0 });
    if now.duration_since(bucket.started) >= self.window {
      bucket.started = now;
      bucket.count = 0;
    }

    if bucket.count >= self.limit {
      warn!("Rate limit exceeded on {route} for {key}");
      return false;
    }
    bucket.count += 1;
    true
  }
}
