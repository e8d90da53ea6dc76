/*
 * src/providers/mod.rs
 *
 * Typed provider interface for everything external to the pipeline.
 *
 * Purpose:
 *   The pipeline only ever sees the [PoiSearch], [RouteBetween] and
 *   [Generate] capabilities. Concrete variants (curated, mapreal, llm,
 *   fixture) are selected from configuration by [ProviderSet::from_config];
 *   nothing is swapped at runtime.
 */

pub mod curated;
pub mod fixture;
pub mod llm;
pub mod mapreal;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::models::{Poi, TransportMode};

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
	#[error("call timed out")]
	Timeout,

	#[error("provider unavailable: {0}")]
	Unavailable(String),

	#[error("upstream rate limit")]
	RateLimited,

	#[error("malformed response: {0}")]
	Malformed(String),
}

impl ProviderError {
	/// Transient errors are retried by the call wrapper; malformed payloads
	/// are not (the caller decides whether to re-prompt).
	pub fn is_transient(&self) -> bool {
		matches!(
			self,
			ProviderError::Timeout | ProviderError::Unavailable(_) | ProviderError::RateLimited
		)
	}
}

/// Searches and enriches POIs for a city.
#[async_trait]
pub trait PoiSearch: Send + Sync {
	fn name(&self) -> &'static str;

	async fn search_pois(
		&self,
		city: &str,
		themes: &[String],
		limit: usize,
	) -> Result<Vec<Poi>, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEstimate {
	pub minutes: i64,
	/// How much the trust layer should believe this leg time, in [0, 1].
	pub confidence: f64,
}

/// Estimates travel time between two coordinates for a transport mode.
#[async_trait]
pub trait RouteBetween: Send + Sync {
	fn name(&self) -> &'static str;

	/// Confidence attached to estimates from this source.
	fn confidence(&self) -> f64;

	async fn route_minutes(
		&self,
		origin: (f64, f64),
		dest: (f64, f64),
		mode: TransportMode,
	) -> Result<RouteEstimate, ProviderError>;
}

/// Free-form text generation (intake parsing, clarify phrasing, POI fallback).
#[async_trait]
pub trait Generate: Send + Sync {
	fn name(&self) -> &'static str;

	async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// The concrete providers serving one process, chosen once at startup.
#[derive(Clone)]
pub struct ProviderSet {
	pub curated: Arc<curated::CuratedDataset>,
	/// Present only when a map key is configured and routing is not fixture.
	pub map_poi: Option<Arc<dyn PoiSearch>>,
	pub router: Arc<dyn RouteBetween>,
	/// Present only when an LLM key is configured.
	pub generator: Option<Arc<dyn Generate>>,
}

impl ProviderSet {
	pub fn from_config(config: &Config) -> Self {
		let curated = Arc::new(curated::CuratedDataset::load(&config.poi_dataset_path));

		let map_poi: Option<Arc<dyn PoiSearch>> = if config.map_provider_available() {
			Some(Arc::new(mapreal::MapPoiProvider::new(
				config.poi_provider_key.clone().unwrap(),
			)))
		} else {
			None
		};

		let router: Arc<dyn RouteBetween> = if config.real_routing() {
			Arc::new(mapreal::MapRouteProvider::new(
				config.poi_provider_key.clone().unwrap_or_default(),
			))
		} else {
			Arc::new(fixture::FixtureRouteProvider)
		};

		let generator: Option<Arc<dyn Generate>> = config.llm_provider_key.as_ref().map(|_| {
			Arc::new(llm::LlmProvider::from_priority(&config.llm_provider_priority))
				as Arc<dyn Generate>
		});

		info!(
			target: "providers",
			curated = curated.city_count(),
			map = map_poi.is_some(),
			router = router.name(),
			llm = generator.is_some(),
			"provider set assembled"
		);

		Self {
			curated,
			map_poi,
			router,
			generator,
		}
	}

	pub fn poi_provider_name(&self) -> String {
		match &self.map_poi {
			Some(p) => p.name().to_string(),
			None => self.curated.name().to_string(),
		}
	}

	pub fn route_provider_name(&self) -> String {
		self.router.name().to_string()
	}

	pub fn llm_provider_name(&self) -> String {
		match &self.generator {
			Some(g) => g.name().to_string(),
			None => "none".to_string(),
		}
	}

	/// True when any realtime (network-backed) provider is in the set.
	pub fn realtime(&self) -> bool {
		self.map_poi.is_some() || self.router.name() != "fixture"
	}
}
