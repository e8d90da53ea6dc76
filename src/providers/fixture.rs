/*
 * src/providers/fixture.rs
 *
 * Deterministic, network-free providers. Selected when no key is configured
 * or `ROUTING_PROVIDER=fixture`; also what the test suite runs against.
 */

use async_trait::async_trait;

use super::{Generate, ProviderError, RouteBetween, RouteEstimate};
use crate::models::TransportMode;
use crate::pipeline::routing::haversine_km;

/// Route estimates straight from the haversine distance and mode speed.
pub struct FixtureRouteProvider;

pub const FIXTURE_ROUTING_CONFIDENCE: f64 = 0.5;

#[async_trait]
impl RouteBetween for FixtureRouteProvider {
	fn name(&self) -> &'static str {
		"fixture"
	}

	fn confidence(&self) -> f64 {
		FIXTURE_ROUTING_CONFIDENCE
	}

	async fn route_minutes(
		&self,
		origin: (f64, f64),
		dest: (f64, f64),
		mode: TransportMode,
	) -> Result<RouteEstimate, ProviderError> {
		let km = haversine_km(origin.0, origin.1, dest.0, dest.1);
		let minutes = (km / mode.speed_kmh() * 60.0).round() as i64;
		Ok(RouteEstimate {
			minutes: minutes.max(1),
			confidence: FIXTURE_ROUTING_CONFIDENCE,
		})
	}
}

/// Canned generator used by tests that need the LLM code paths exercised
/// without a network. Replies with whatever `reply` holds.
pub struct FixtureGenerator {
	pub reply: String,
}

#[async_trait]
impl Generate for FixtureGenerator {
	fn name(&self) -> &'static str {
		"fixture-llm"
	}

	async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
		Ok(self.reply.clone())
	}
}
