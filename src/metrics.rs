/*
 * src/metrics.rs
 *
 * Process-local counters for the metrics endpoints. Everything is atomic;
 * there is no registry dependency, just a JSON view and a Prometheus text
 * rendering of the same numbers.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde_json::{Value, json};

#[derive(Debug)]
pub struct Metrics {
	started: Instant,
	pub requests_total: AtomicU64,
	pub requests_done: AtomicU64,
	pub requests_clarifying: AtomicU64,
	pub requests_error: AtomicU64,
	pub requests_rate_limited: AtomicU64,
	/// Repair rounds used, bucketed 0..=3.
	pub repair_rounds: [AtomicU64; 4],
	pub pipeline_millis_total: AtomicU64,
	pub provider_retries: AtomicU64,
}

impl Default for Metrics {
	fn default() -> Self {
		Self {
			started: Instant::now(),
			requests_total: AtomicU64::new(0),
			requests_done: AtomicU64::new(0),
			requests_clarifying: AtomicU64::new(0),
			requests_error: AtomicU64::new(0),
			requests_rate_limited: AtomicU64::new(0),
			repair_rounds: Default::default(),
			pipeline_millis_total: AtomicU64::new(0),
			provider_retries: AtomicU64::new(0),
		}
	}
}

impl Metrics {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record_repair_rounds(&self, rounds: u32) {
		let idx = (rounds as usize).min(self.repair_rounds.len() - 1);
		self.repair_rounds[idx].fetch_add(1, Ordering::Relaxed);
	}

	pub fn uptime_secs(&self) -> u64 {
		self.started.elapsed().as_secs()
	}

	pub fn as_json(&self) -> Value {
		json!({
			"uptime_secs": self.uptime_secs(),
			"requests": {
				"total": self.requests_total.load(Ordering::Relaxed),
				"done": self.requests_done.load(Ordering::Relaxed),
				"clarifying": self.requests_clarifying.load(Ordering::Relaxed),
				"error": self.requests_error.load(Ordering::Relaxed),
				"rate_limited": self.requests_rate_limited.load(Ordering::Relaxed),
			},
			"repair_rounds": self
				.repair_rounds
				.iter()
				.map(|c| c.load(Ordering::Relaxed))
				.collect::<Vec<_>>(),
			"pipeline_millis_total": self.pipeline_millis_total.load(Ordering::Relaxed),
			"provider_retries": self.provider_retries.load(Ordering::Relaxed),
		})
	}

	pub fn render_prometheus(&self) -> String {
		let mut out = String::new();
		let mut gauge = |name: &str, help: &str, value: u64| {
			out.push_str(&format!(
				"# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
			));
		};
		gauge(
			"wayfarer_requests_total",
			"Planning requests received",
			self.requests_total.load(Ordering::Relaxed),
		);
		gauge(
			"wayfarer_requests_done_total",
			"Requests that produced an itinerary",
			self.requests_done.load(Ordering::Relaxed),
		);
		gauge(
			"wayfarer_requests_clarifying_total",
			"Requests answered with clarifying questions",
			self.requests_clarifying.load(Ordering::Relaxed),
		);
		gauge(
			"wayfarer_requests_error_total",
			"Requests that failed",
			self.requests_error.load(Ordering::Relaxed),
		);
		gauge(
			"wayfarer_requests_rate_limited_total",
			"Requests rejected by the rate limiter",
			self.requests_rate_limited.load(Ordering::Relaxed),
		);
		gauge(
			"wayfarer_pipeline_millis_total",
			"Cumulative pipeline wall time in ms",
			self.pipeline_millis_total.load(Ordering::Relaxed),
		);
		gauge(
			"wayfarer_provider_retries_total",
			"External call retries",
			self.provider_retries.load(Ordering::Relaxed),
		);
		for (rounds, counter) in self.repair_rounds.iter().enumerate() {
			out.push_str(&format!(
				"wayfarer_repair_rounds_total{{rounds=\"{rounds}\"}} {}\n",
				counter.load(Ordering::Relaxed)
			));
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn repair_round_buckets_saturate() {
		let metrics = Metrics::new();
		metrics.record_repair_rounds(0);
		metrics.record_repair_rounds(7);
		assert_eq!(metrics.repair_rounds[0].load(Ordering::Relaxed), 1);
		assert_eq!(metrics.repair_rounds[3].load(Ordering::Relaxed), 1);
	}

	#[test]
	fn prometheus_rendering_contains_counters() {
		let metrics = Metrics::new();
		metrics.requests_total.fetch_add(2, Ordering::Relaxed);
		let text = metrics.render_prometheus();
		assert!(text.contains("wayfarer_requests_total 2"));
		assert!(text.contains("rounds=\"3\""));
	}
}
