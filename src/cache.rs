/*
 * src/cache.rs
 *
 * LRU + TTL cache shared by the POI-query and route lookups: an [LruCache]
 * behind a mutex (the crate's `get` promotes recency and needs exclusive
 * access), with an insertion timestamp per entry so stale hits read as
 * misses and get evicted on touch.
 */

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::global::{CACHE_CAPACITY, CACHE_TTL_SECS};

struct Entry<V> {
	value: V,
	inserted: Instant,
}

pub struct LruTtlCache<K: Hash + Eq, V> {
	entries: Mutex<LruCache<K, Entry<V>>>,
	ttl: Duration,
	hits: AtomicU64,
	misses: AtomicU64,
}

impl<K: Hash + Eq, V: Clone> LruTtlCache<K, V> {
	pub fn new(capacity: usize, ttl: Duration) -> Self {
		let capacity = NonZeroUsize::new(capacity.max(1)).expect("cache capacity is nonzero");
		Self {
			entries: Mutex::new(LruCache::new(capacity)),
			ttl,
			hits: AtomicU64::new(0),
			misses: AtomicU64::new(0),
		}
	}

	pub fn with_defaults() -> Self {
		Self::new(CACHE_CAPACITY, Duration::from_secs(CACHE_TTL_SECS))
	}

	pub fn get(&self, key: &K) -> Option<V> {
		let mut entries = self.entries.lock().expect("cache lock poisoned");
		let expired = match entries.get(key) {
			Some(entry) if entry.inserted.elapsed() < self.ttl => {
				self.hits.fetch_add(1, Ordering::Relaxed);
				return Some(entry.value.clone());
			}
			Some(_) => true,
			None => false,
		};
		if expired {
			entries.pop(key);
		}
		self.misses.fetch_add(1, Ordering::Relaxed);
		None
	}

	pub fn put(&self, key: K, value: V) {
		let mut entries = self.entries.lock().expect("cache lock poisoned");
		entries.put(
			key,
			Entry {
				value,
				inserted: Instant::now(),
			},
		);
	}

	pub fn len(&self) -> usize {
		self.entries.lock().expect("cache lock poisoned").len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// (hits, misses) since startup.
	pub fn stats(&self) -> (u64, u64) {
		(
			self.hits.load(Ordering::Relaxed),
			self.misses.load(Ordering::Relaxed),
		)
	}
}

/// Key for the POI-query cache.
pub fn poi_query_key(city: &str, themes: &[String]) -> String {
	let mut themes: Vec<String> = themes.iter().map(|t| t.to_ascii_lowercase()).collect();
	themes.sort();
	format!("{}|{}", city.trim().to_ascii_lowercase(), themes.join(","))
}

/// Key for the route cache. Coordinates are truncated so nearby lookups share
/// an entry.
pub fn route_key(origin: (f64, f64), dest: (f64, f64), mode: &str) -> String {
	format!(
		"{:.4},{:.4}|{:.4},{:.4}|{}",
		origin.0, origin.1, dest.0, dest.1, mode
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn get_put_roundtrip_and_stats() {
		let cache: LruTtlCache<String, u32> = LruTtlCache::new(4, Duration::from_secs(60));
		assert_eq!(cache.get(&"a".to_string()), None);
		cache.put("a".into(), 1);
		assert_eq!(cache.get(&"a".to_string()), Some(1));
		assert_eq!(cache.stats(), (1, 1));
	}

	#[test]
	fn evicts_least_recently_used_at_capacity() {
		let cache: LruTtlCache<u32, u32> = LruTtlCache::new(2, Duration::from_secs(60));
		cache.put(1, 10);
		cache.put(2, 20);
		cache.get(&1); // 2 is now the LRU
		cache.put(3, 30);
		assert_eq!(cache.get(&1), Some(10));
		assert_eq!(cache.get(&2), None);
		assert_eq!(cache.get(&3), Some(30));
	}

	#[test]
	fn ttl_expiry_reads_as_miss_and_evicts() {
		let cache: LruTtlCache<u32, u32> = LruTtlCache::new(2, Duration::from_millis(0));
		cache.put(1, 10);
		assert_eq!(cache.get(&1), None);
		assert!(cache.is_empty());
	}

	#[test]
	fn query_key_is_order_insensitive() {
		let a = poi_query_key("Beijing", &["food".into(), "history".into()]);
		let b = poi_query_key(" beijing ", &["history".into(), "food".into()]);
		assert_eq!(a, b);
	}
}
