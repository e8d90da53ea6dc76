/*
 * src/providers/retry.rs
 *
 * The single deadline-aware call wrapper applied to every external call.
 * Transient failures (timeout, 5xx-equivalent, upstream rate limit) retry with
 * exponential backoff; malformed payloads do not. Nothing here may outlive the
 * request deadline.
 */

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::ProviderError;
use crate::global::{LLM_CALL_TIMEOUT_SECS, MAP_CALL_TIMEOUT_SECS, RETRY_BACKOFF_MS, RETRY_MAX_ATTEMPTS};

#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
	pub per_call_timeout: Duration,
	pub max_attempts: u32,
	pub backoff: [Duration; 2],
}

impl CallPolicy {
	pub fn map() -> Self {
		Self {
			per_call_timeout: Duration::from_secs(MAP_CALL_TIMEOUT_SECS),
			max_attempts: RETRY_MAX_ATTEMPTS,
			backoff: [
				Duration::from_millis(RETRY_BACKOFF_MS[0]),
				Duration::from_millis(RETRY_BACKOFF_MS[1]),
			],
		}
	}

	pub fn llm() -> Self {
		Self {
			per_call_timeout: Duration::from_secs(LLM_CALL_TIMEOUT_SECS),
			..Self::map()
		}
	}
}

/// Runs `call` under the policy, bounded by the request `deadline` when one is
/// set. Returns [ProviderError::Timeout] if the deadline is already spent.
pub async fn call_external<T, F, Fut>(
	name: &str,
	policy: CallPolicy,
	deadline: Option<Instant>,
	mut call: F,
) -> Result<T, ProviderError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, ProviderError>>,
{
	let mut last_err = ProviderError::Timeout;

	for attempt in 0..policy.max_attempts {
		let budget = match deadline {
			Some(deadline) => {
				let remaining = deadline.saturating_duration_since(Instant::now());
				if remaining.is_zero() {
					debug!(target: "providers", provider = name, "deadline spent before call");
					return Err(ProviderError::Timeout);
				}
				policy.per_call_timeout.min(remaining)
			}
			None => policy.per_call_timeout,
		};

		match tokio::time::timeout(budget, call()).await {
			Ok(Ok(value)) => return Ok(value),
			Ok(Err(e)) if e.is_transient() => {
				warn!(target: "providers", provider = name, attempt, error = %e, "transient provider error");
				last_err = e;
			}
			Ok(Err(e)) => return Err(e),
			Err(_) => {
				warn!(target: "providers", provider = name, attempt, "provider call timed out");
				last_err = ProviderError::Timeout;
			}
		}

		// Back off before the next attempt, but never sleep past the deadline.
		if attempt + 1 < policy.max_attempts {
			let mut pause = policy.backoff[(attempt as usize).min(policy.backoff.len() - 1)];
			if let Some(deadline) = deadline {
				let remaining = deadline.saturating_duration_since(Instant::now());
				if remaining.is_zero() {
					return Err(last_err);
				}
				pause = pause.min(remaining);
			}
			tokio::time::sleep(pause).await;
		}
	}

	Err(last_err)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	fn quick_policy() -> CallPolicy {
		CallPolicy {
			per_call_timeout: Duration::from_millis(50),
			max_attempts: 3,
			backoff: [Duration::from_millis(1), Duration::from_millis(2)],
		}
	}

	#[tokio::test]
	async fn retries_transient_then_succeeds() {
		let calls = AtomicU32::new(0);
		let result = call_external("test", quick_policy(), None, || {
			let n = calls.fetch_add(1, Ordering::SeqCst);
			async move {
				if n < 2 {
					Err(ProviderError::Unavailable("flaky".into()))
				} else {
					Ok(7u32)
				}
			}
		})
		.await;
		assert_eq!(result.unwrap(), 7);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn malformed_is_not_retried() {
		let calls = AtomicU32::new(0);
		let result: Result<u32, _> = call_external("test", quick_policy(), None, || {
			calls.fetch_add(1, Ordering::SeqCst);
			async { Err(ProviderError::Malformed("bad json".into())) }
		})
		.await;
		assert!(matches!(result, Err(ProviderError::Malformed(_))));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn spent_deadline_short_circuits() {
		let deadline = Instant::now() - Duration::from_millis(1);
		let result: Result<u32, _> =
			call_external("test", quick_policy(), Some(deadline), || async { Ok(1u32) }).await;
		assert!(matches!(result, Err(ProviderError::Timeout)));
	}

	#[tokio::test]
	async fn slow_call_times_out() {
		let result: Result<u32, _> = call_external("test", quick_policy(), None, || async {
			tokio::time::sleep(Duration::from_millis(200)).await;
			Ok(1u32)
		})
		.await;
		assert!(matches!(result, Err(ProviderError::Timeout)));
	}
}
