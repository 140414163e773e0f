use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;

/// Map whose entries lapse a fixed time after insertion.
///
/// Owned by whoever reads it; there is no background eviction; expired
/// entries are dropped on access or by [`TtlCache::purge_expired`].
///
/// Each key carries a generation that [`TtlCache::invalidate`] bumps. A
/// caller that loads a value without holding the cache reads the generation
/// first and stores through [`TtlCache::insert_if_current`], so a load that
/// raced an invalidation is discarded.
pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: HashMap<K, (V, DateTime<Utc>)>,
    generations: HashMap<K, u64>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: HashMap::new(),
            generations: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let fresh = match self.entries.get(key) {
            Some((_, inserted_at)) => now - *inserted_at < self.ttl,
            None => return None,
        };

        if !fresh {
            self.entries.remove(key);
            return None;
        }

        self.entries.get(key).map(|(value, _)| value.clone())
    }

    pub fn insert(&mut self, key: K, value: V) {
        let now = self.clock.now();
        self.entries.insert(key, (value, now));
    }

    pub fn generation(&self, key: &K) -> u64 {
        self.generations.get(key).copied().unwrap_or(0)
    }

    /// Inserts only when `key` has not been invalidated since `generation`
    /// was read. Returns whether the value was stored.
    pub fn insert_if_current(&mut self, key: K, value: V, generation: u64) -> bool {
        if self.generation(&key) != generation {
            return false;
        }
        self.insert(key, value);
        true
    }

    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
        *self.generations.entry(key.clone()).or_insert(0) += 1;
    }

    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, (_, inserted_at)| now - *inserted_at < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::clock::ManualClock;

    fn cache_with_clock() -> (TtlCache<&'static str, u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        ));
        let cache = TtlCache::new(Duration::minutes(5), clock.clone());
        (cache, clock)
    }

    #[test]
    fn entry_is_served_until_ttl_elapses() {
        let (mut cache, clock) = cache_with_clock();
        cache.insert("client-a", 3);

        clock.advance(Duration::minutes(4));
        assert_eq!(cache.get(&"client-a"), Some(3));

        clock.advance(Duration::minutes(1));
        assert_eq!(cache.get(&"client-a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn reinsert_restarts_the_window() {
        let (mut cache, clock) = cache_with_clock();
        cache.insert("client-a", 1);
        clock.advance(Duration::minutes(4));
        cache.insert("client-a", 2);
        clock.advance(Duration::minutes(4));

        assert_eq!(cache.get(&"client-a"), Some(2));
    }

    #[test]
    fn purge_drops_only_stale_entries() {
        let (mut cache, clock) = cache_with_clock();
        cache.insert("old", 1);
        clock.advance(Duration::minutes(3));
        cache.insert("new", 2);
        clock.advance(Duration::minutes(3));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"new"), Some(2));
    }

    #[test]
    fn load_that_raced_an_invalidation_is_discarded() {
        let (mut cache, _clock) = cache_with_clock();
        let seen = cache.generation(&"client-a");

        cache.invalidate(&"client-a");
        assert!(!cache.insert_if_current("client-a", 1, seen));
        assert_eq!(cache.get(&"client-a"), None);

        let seen = cache.generation(&"client-a");
        assert!(cache.insert_if_current("client-a", 2, seen));
        assert_eq!(cache.get(&"client-a"), Some(2));
    }

    #[test]
    fn invalidate_removes_entry() {
        let (mut cache, _clock) = cache_with_clock();
        cache.insert("client-a", 1);
        cache.invalidate(&"client-a");
        assert_eq!(cache.get(&"client-a"), None);
    }
}
