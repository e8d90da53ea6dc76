/*
 * src/ratelimit.rs
 *
 * Global token bucket per client. A client is the bearer token when present,
 * else the peer address. Buckets refill continuously at max/window.
 */

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Bucket {
	tokens: f64,
	last_refill: Instant,
}

pub struct RateLimiter {
	buckets: Mutex<HashMap<String, Bucket>>,
	max_tokens: f64,
	window: Duration,
}

impl RateLimiter {
	pub fn new(max_tokens: u32, window: Duration) -> Self {
		Self {
			buckets: Mutex::new(HashMap::new()),
			max_tokens: max_tokens as f64,
			window,
		}
	}

	/// Takes one token for `client`; false means the caller should get a 429.
	pub fn try_acquire(&self, client: &str) -> bool {
		let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
		let now = Instant::now();
		let bucket = buckets.entry(client.to_string()).or_insert(Bucket {
			tokens: self.max_tokens,
			last_refill: now,
		});

		let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
		let refill_rate = self.max_tokens / self.window.as_secs_f64();
		bucket.tokens = (bucket.tokens + elapsed * refill_rate).min(self.max_tokens);
		bucket.last_refill = now;

		if bucket.tokens >= 1.0 {
			bucket.tokens -= 1.0;
			true
		} else {
			false
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exhausts_then_rejects() {
		let limiter = RateLimiter::new(3, Duration::from_secs(3600));
		assert!(limiter.try_acquire("c1"));
		assert!(limiter.try_acquire("c1"));
		assert!(limiter.try_acquire("c1"));
		assert!(!limiter.try_acquire("c1"));
		// Separate client has its own bucket.
		assert!(limiter.try_acquire("c2"));
	}

	#[test]
	fn refills_over_time() {
		let limiter = RateLimiter::new(1, Duration::from_millis(10));
		assert!(limiter.try_acquire("c1"));
		assert!(!limiter.try_acquire("c1"));
		std::thread::sleep(Duration::from_millis(25));
		assert!(limiter.try_acquire("c1"));
	}
}
