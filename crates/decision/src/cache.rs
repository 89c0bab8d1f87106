//! Bounded TTL decision cache
//!
//! Entries become invisible once `now > stored_at + ttl`. When the store is
//! full, expired entries are purged first and the least recently used entry is
//! evicted after that. Individual `get`/`set` calls are atomic; a get/set pair
//! is not, so concurrent misses for the same key may compute twice.

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

use sales_agent_config::OptimizationMode;
use sales_agent_core::{ConversationContext, CustomerProfile, Message};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.stored_at + self.ttl
    }
}

/// Cache lookup statistics, as counted by the decision engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

pub struct DecisionCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> DecisionCache<V> {
    pub fn new(max_entries: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(max_entries)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the live value for `key`, dropping it if it has expired
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        let now = Instant::now();
        let key = key.into();
        let mut entries = self.entries.lock();

        if entries.len() == entries.cap().get() && !entries.contains(&key) {
            let stale: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            for k in &stale {
                entries.pop(k);
            }
        }

        if let Some((evicted, _)) = entries.push(
            key.clone(),
            CacheEntry {
                value,
                stored_at: now,
                ttl: self.ttl,
            },
        ) {
            if evicted != key {
                tracing::debug!(key = %evicted, "Evicted least recently used decision");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Deterministic request fingerprint
///
/// SHA-256 over the engine identity, the optimisation mode, the last `window`
/// messages (role and the first `truncate` characters of content), the
/// profile's conversation identifier and the caller-supplied context, if any.
/// Fields are length-prefixed so adjacent values cannot run together.
pub fn fingerprint(
    engine_id: &str,
    mode: OptimizationMode,
    messages: &[Message],
    profile: &CustomerProfile,
    context: Option<&ConversationContext>,
    window: usize,
    truncate: usize,
) -> String {
    let mut hasher = Sha256::new();
    let mut field = |bytes: &[u8]| {
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    };

    field(engine_id.as_bytes());
    field(mode.as_str().as_bytes());

    let start = messages.len().saturating_sub(window);
    for message in &messages[start..] {
        field(message.role.as_str().as_bytes());
        let content: String = message.content.chars().take(truncate).collect();
        field(content.as_bytes());
    }
    field(profile.conversation_id().as_bytes());

    match context {
        Some(context) => {
            // Value maps are key-sorted, unlike the profile's HashMap
            let bytes = serde_json::to_value(context)
                .map(|value| value.to_string().into_bytes())
                .unwrap_or_else(|_| format!("{:?}", context).into_bytes());
            field(b"context");
            field(&bytes);
        },
        None => field(b""),
    }

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize, ttl_secs: u64) -> DecisionCache<u32> {
        DecisionCache::new(
            NonZeroUsize::new(capacity).unwrap(),
            Duration::from_secs(ttl_secs),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl_miss_after() {
        let cache = cache(10, 300);
        cache.set("k", 42);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("k"), Some(42));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 1,
            misses: 3,
            entries: 2,
        };
        assert!((stats.hit_rate() - 0.25).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_least_recently_used() {
        let cache = cache(2, 300);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get("a"), Some(1));

        cache.set("c", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_purged_before_eviction() {
        let cache = DecisionCache::new(NonZeroUsize::new(2).unwrap(), Duration::from_secs(10));
        cache.set("old", 1);
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("fresh", 2);
        assert_eq!(cache.get("old"), Some(1));
        tokio::time::advance(Duration::from_secs(3)).await;

        // "old" is most recently used but expired; "fresh" survives
        cache.set("new", 3);
        assert_eq!(cache.get("fresh"), Some(2));
        assert_eq!(cache.get("new"), Some(3));
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let cache = cache(2, 60);
        cache.set("k", 1);
        cache.set("k", 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let messages = vec![Message::user("hello"), Message::assistant("hi, how can I help?")];
        let profile = CustomerProfile::new().with_session("s-1");

        let a = fingerprint("engine", OptimizationMode::Standard, &messages, &profile, None, 5, 200);
        let b = fingerprint("engine", OptimizationMode::Standard, &messages, &profile, None, 5, 200);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_distinguishes_inputs() {
        let messages = vec![Message::user("hello")];
        let profile = CustomerProfile::new().with_session("s-1");
        let base = fingerprint("engine", OptimizationMode::Standard, &messages, &profile, None, 5, 200);

        let other_session = CustomerProfile::new().with_session("s-2");
        assert_ne!(
            base,
            fingerprint("engine", OptimizationMode::Standard, &messages, &other_session, None, 5, 200)
        );
        assert_ne!(
            base,
            fingerprint("engine", OptimizationMode::Fast, &messages, &profile, None, 5, 200)
        );
        assert_ne!(
            base,
            fingerprint("engine", OptimizationMode::Standard, &[Message::assistant("hello")], &profile, None, 5, 200)
        );
    }

    #[test]
    fn test_fingerprint_includes_supplied_context() {
        let messages = vec![Message::user("what does the premium plan cost?")];
        let profile = CustomerProfile::new().with_session("s-1");
        let hot = ConversationContext {
            conversion_probability: 0.9,
            ..ConversationContext::default()
        };
        let cold = ConversationContext {
            conversion_probability: 0.1,
            ..ConversationContext::default()
        };
        let key = |context: Option<&ConversationContext>| {
            fingerprint("engine", OptimizationMode::Standard, &messages, &profile, context, 5, 200)
        };

        assert_ne!(key(Some(&hot)), key(Some(&cold)));
        assert_ne!(key(None), key(Some(&hot)));
        assert_eq!(key(Some(&hot)), key(Some(&hot.clone())));
    }

    #[test]
    fn test_fingerprint_window_and_truncation() {
        let profile = CustomerProfile::new();
        let long = "x".repeat(500);
        let a = vec![Message::user("ignored"), Message::user(format!("{}a", long))];
        let b = vec![Message::user("different"), Message::user(format!("{}b", long))];

        // Only the last message, truncated before the differing suffix
        assert_eq!(
            fingerprint("e", OptimizationMode::Standard, &a, &profile, None, 1, 200),
            fingerprint("e", OptimizationMode::Standard, &b, &profile, None, 1, 200)
        );
        assert_ne!(
            fingerprint("e", OptimizationMode::Standard, &a, &profile, None, 2, 200),
            fingerprint("e", OptimizationMode::Standard, &b, &profile, None, 2, 200)
        );
    }
}
