//! Read-through cache of deep-analysis decisions, keyed by URL.
//!
//! Entries carry their creation time and are treated as absent once older
//! than the TTL, whether or not they have been purged yet. Writes are
//! last-write-wins with no per-key locking.

use crate::clock::{Clock, SystemClock};
use crate::verdict::DeepVerdict;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAnalysis {
    pub url: String,
    pub result: DeepVerdict,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ResultCache {
    entries: Arc<RwLock<HashMap<String, CachedAnalysis>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            clock,
        }
    }

    pub async fn get(&self, url: &str) -> Option<DeepVerdict> {
        let entries = self.entries.read().await;
        let cached = entries.get(url)?;
        if self.is_expired(cached) {
            log::debug!("Cached analysis for {url} expired at {}", cached.created_at + self.ttl);
            return None;
        }
        log::debug!("Using cached analysis for: {url}");
        Some(cached.result.clone())
    }

    pub async fn put(&self, url: &str, result: DeepVerdict) {
        let entry = CachedAnalysis {
            url: url.to_string(),
            result,
            created_at: self.clock.now(),
        };
        self.entries.write().await.insert(url.to_string(), entry);
    }

    /// Physically drop stale entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let now = self.clock.now();
        let ttl = self.ttl;
        entries.retain(|_, cached| now - cached.created_at < ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn is_expired(&self, cached: &CachedAnalysis) -> bool {
        self.clock.now() - cached.created_at >= self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::verdict::VulnerabilityFinding;

    fn decision(score: u8) -> DeepVerdict {
        DeepVerdict {
            safe: score < 50,
            vulnerabilities: vec![VulnerabilityFinding {
                name: "XSS".to_string(),
                confidence: "High".to_string(),
                explanation: "reflected parameter".to_string(),
                recommendation: "encode output".to_string(),
            }],
            score,
        }
    }

    #[tokio::test]
    async fn test_get_put() {
        let cache = ResultCache::new(Duration::hours(24));
        assert!(cache.get("https://example.com/").await.is_none());

        cache.put("https://example.com/", decision(80)).await;
        assert_eq!(cache.get("https://example.com/").await, Some(decision(80)));
        assert!(cache.get("https://example.org/").await.is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = ResultCache::new(Duration::hours(24));
        cache.put("https://example.com/", decision(80)).await;
        cache.put("https://example.com/", decision(10)).await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("https://example.com/").await, Some(decision(10)));
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let clock = Arc::new(ManualClock::default());
        let cache = ResultCache::with_clock(Duration::hours(24), clock.clone());
        cache.put("https://example.com/", decision(80)).await;

        clock.advance(Duration::hours(23));
        assert!(cache.get("https://example.com/").await.is_some());

        clock.advance(Duration::hours(1));
        assert!(cache.get("https://example.com/").await.is_none());
        // still physically present until purged
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.purge_expired().await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_rewrite_refreshes_age() {
        let clock = Arc::new(ManualClock::default());
        let cache = ResultCache::with_clock(Duration::hours(24), clock.clone());
        cache.put("https://example.com/", decision(80)).await;
        clock.advance(Duration::hours(20));
        cache.put("https://example.com/", decision(80)).await;
        clock.advance(Duration::hours(20));
        assert!(cache.get("https://example.com/").await.is_some());
        assert_eq!(cache.purge_expired().await, 0);
    }
}
