/*
 * src/config.rs
 *
 * Read-only configuration record built once at startup from the environment,
 * passed by reference into each pipeline stage. Mutable runtime flags live in
 * [RuntimeFlags] and are read once per request.
 */

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use tracing::warn;

use crate::global::*;

/// Which route-time source the scheduler uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingProviderKind {
	/// Always call the real map provider.
	Real,
	/// Deterministic haversine-based estimates; no network.
	Fixture,
	/// Real when a map key is configured, fixture otherwise.
	Auto,
}

#[derive(Debug, Clone)]
pub struct Config {
	pub bind_address: String,
	pub frontend_url: Option<String>,

	pub poi_provider_key: Option<String>,
	pub llm_provider_key: Option<String>,
	/// Ordered model preference for the LLM provider; the first recognized
	/// entry wins, unknown names are skipped.
	pub llm_provider_priority: Vec<String>,
	pub routing_provider: RoutingProviderKind,
	/// Forbids silent fallback to heuristic data: missing required external
	/// data becomes a hard failure instead of a degraded itinerary.
	pub strict_external_data: bool,

	pub food_min_per_person_per_day: f64,
	pub spring_festival_date: NaiveDate,
	pub max_repair_rounds: u32,
	pub request_deadline: Duration,

	pub api_bearer_token: Option<String>,
	pub allow_unauthenticated_api: bool,
	pub rate_limit_max: u32,
	pub rate_limit_window: Duration,

	pub poi_dataset_path: String,
	/// Where the configuration came from, recorded in the run fingerprint.
	pub env_source: String,
}

fn env_opt(key: &str) -> Option<String> {
	std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(key: &str) -> bool {
	matches!(
		std::env::var(key).unwrap_or_default().trim(),
		"1" | "true" | "TRUE" | "yes"
	)
}

fn env_list(key: &str) -> Vec<String> {
	env_opt(key)
		.map(|raw| {
			raw.split(',')
				.map(|s| s.trim().to_ascii_lowercase())
				.filter(|s| !s.is_empty())
				.collect()
		})
		.unwrap_or_default()
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
	match env_opt(key) {
		Some(raw) => raw.parse().unwrap_or_else(|_| {
			warn!(target: "config", key, raw = %raw, "unparseable value, using default");
			default
		}),
		None => default,
	}
}

impl Config {
	pub fn from_env() -> Self {
		let env_source = if std::path::Path::new(".env").exists() {
			"dotenv".to_string()
		} else {
			"process".to_string()
		};

		let routing_provider = match env_opt("ROUTING_PROVIDER").as_deref() {
			Some("real") => RoutingProviderKind::Real,
			Some("fixture") => RoutingProviderKind::Fixture,
			Some("auto") | None => RoutingProviderKind::Auto,
			Some(other) => {
				warn!(target: "config", value = other, "unknown ROUTING_PROVIDER, using auto");
				RoutingProviderKind::Auto
			}
		};

		let spring_festival_date = env_opt("DEFAULT_SPRING_FESTIVAL_DATE")
			.and_then(|raw| {
				NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
					.map_err(|e| {
						warn!(target: "config", raw = %raw, error = %e, "bad DEFAULT_SPRING_FESTIVAL_DATE");
						e
					})
					.ok()
			})
			.unwrap_or_else(|| NaiveDate::from_ymd_opt(2026, 2, 17).unwrap());

		Self {
			bind_address: env_opt("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3001".to_string()),
			frontend_url: env_opt("FRONTEND_URL"),
			poi_provider_key: env_opt("POI_PROVIDER_KEY").or_else(|| env_opt("GOOGLE_MAPS_API_KEY")),
			llm_provider_key: env_opt("LLM_PROVIDER_KEY").or_else(|| env_opt("OPENAI_API_KEY")),
			llm_provider_priority: env_list("LLM_PROVIDER_PRIORITY"),
			routing_provider,
			strict_external_data: env_flag("STRICT_EXTERNAL_DATA"),
			food_min_per_person_per_day: env_parse(
				"FOOD_MIN_PER_PERSON_PER_DAY",
				FOOD_MIN_PER_PERSON_PER_DAY_DEFAULT,
			),
			spring_festival_date,
			max_repair_rounds: env_parse("MAX_REPAIR_ROUNDS", MAX_REPAIR_ROUNDS_DEFAULT),
			request_deadline: Duration::from_secs(env_parse(
				"REQUEST_DEADLINE_SECS",
				REQUEST_DEADLINE_SECS_DEFAULT,
			)),
			api_bearer_token: env_opt("API_BEARER_TOKEN"),
			allow_unauthenticated_api: env_flag("ALLOW_UNAUTHENTICATED_API"),
			rate_limit_max: env_parse("RATE_LIMIT_MAX", RATE_LIMIT_MAX_DEFAULT),
			rate_limit_window: Duration::from_secs(env_parse(
				"RATE_LIMIT_WINDOW",
				RATE_LIMIT_WINDOW_SECS_DEFAULT,
			)),
			poi_dataset_path: env_opt("POI_DATASET_PATH")
				.unwrap_or_else(|| POI_DATASET_PATH_DEFAULT.to_string()),
			env_source,
		}
	}

	/// True when the real map provider can be used for POI search/enrichment.
	pub fn map_provider_available(&self) -> bool {
		self.poi_provider_key.is_some() && self.routing_provider != RoutingProviderKind::Fixture
	}

	/// True when the scheduler should ask the real route provider for leg times.
	pub fn real_routing(&self) -> bool {
		match self.routing_provider {
			RoutingProviderKind::Real => true,
			RoutingProviderKind::Fixture => false,
			RoutingProviderKind::Auto => self.poi_provider_key.is_some(),
		}
	}
}

impl Default for Config {
	fn default() -> Self {
		Self {
			bind_address: "127.0.0.1:0".to_string(),
			frontend_url: None,
			poi_provider_key: None,
			llm_provider_key: None,
			llm_provider_priority: Vec::new(),
			routing_provider: RoutingProviderKind::Fixture,
			strict_external_data: false,
			food_min_per_person_per_day: FOOD_MIN_PER_PERSON_PER_DAY_DEFAULT,
			spring_festival_date: NaiveDate::from_ymd_opt(2026, 2, 17).unwrap(),
			max_repair_rounds: MAX_REPAIR_ROUNDS_DEFAULT,
			request_deadline: Duration::from_secs(REQUEST_DEADLINE_SECS_DEFAULT),
			api_bearer_token: None,
			allow_unauthenticated_api: true,
			rate_limit_max: RATE_LIMIT_MAX_DEFAULT,
			rate_limit_window: Duration::from_secs(RATE_LIMIT_WINDOW_SECS_DEFAULT),
			poi_dataset_path: POI_DATASET_PATH_DEFAULT.to_string(),
			env_source: "default".to_string(),
		}
	}
}

/// Flags that can flip at runtime without a restart. Read once per request.
#[derive(Debug)]
pub struct RuntimeFlags {
	pub engine_version: AtomicU32,
	pub strict_required_fields: AtomicBool,
}

impl Default for RuntimeFlags {
	fn default() -> Self {
		Self {
			engine_version: AtomicU32::new(1),
			strict_required_fields: AtomicBool::new(true),
		}
	}
}

impl RuntimeFlags {
	pub fn snapshot(&self) -> (u32, bool) {
		(
			self.engine_version.load(Ordering::Relaxed),
			self.strict_required_fields.load(Ordering::Relaxed),
		)
	}
}
