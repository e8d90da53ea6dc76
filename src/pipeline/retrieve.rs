/*
 * src/pipeline/retrieve.rs
 *
 * Builds the ranked candidate pool the scheduler draws from.
 *
 * Source order: curated dataset, then the map provider (when configured and
 * not in fixture mode), then LLM generation as a fallback when the pool is
 * still too small. The curated and map lookups run concurrently and are
 * joined before merging. Facts from different sources are fused attribute by
 * attribute, higher provenance winning.
 */

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cache::{LruTtlCache, poi_query_key};
use crate::config::Config;
use crate::error::PlanError;
use crate::models::{FactSource, Poi, TripConstraints, UserProfile, poi::normalize_name};
use crate::providers::llm::strip_code_fences;
use crate::providers::retry::{CallPolicy, call_external};
use crate::providers::{PoiSearch, ProviderSet, RouteEstimate};

pub type PoiQueryCache = LruTtlCache<String, Vec<Poi>>;
pub type RouteCache = LruTtlCache<String, RouteEstimate>;

#[derive(Debug, Default)]
pub struct RetrievedPool {
	/// Ranked candidates, best first. Pinned must-visits are always present.
	pub pois: Vec<Poi>,
	pub used_map_provider: bool,
	pub used_llm_fallback: bool,
}

/// Pool size: `ceil(days * pace_multiplier * 1.5)`.
pub fn pool_size(constraints: &TripConstraints) -> usize {
	let base = constraints.days as f64 * constraints.pace.multiplier() as f64 * 1.5;
	base.ceil() as usize
}

fn min_pool(constraints: &TripConstraints) -> usize {
	2 * constraints.days as usize
}

// --- Fusion ---

fn pick<'a>(attr: &str, a: &'a Poi, b: &'a Poi) -> &'a Poi {
	if b.source_of(attr) > a.source_of(attr) { b } else { a }
}

/// Merges two records of the same place. Total and deterministic: for every
/// attribute the higher-provenance side wins, ties keep the earlier (`a`)
/// side; themes are unioned.
fn fuse(a: &Poi, b: &Poi) -> Poi {
	let mut out = Poi {
		id: pick("name", a, b).id.clone(),
		name: pick("name", a, b).name.clone(),
		city: a.city.clone(),
		lat: pick("location", a, b).lat,
		lon: pick("location", a, b).lon,
		themes: a.themes.clone(),
		typical_duration: pick("typical_duration", a, b).typical_duration,
		cost: pick("cost", a, b).cost,
		indoor: pick("indoor", a, b).indoor,
		ticket_price: pick("ticket_price", a, b).ticket_price,
		reservation_required: pick("reservation_required", a, b).reservation_required,
		closed_rules: pick("closed_rules", a, b).closed_rules.clone(),
		open_hours: pick("open_hours", a, b).open_hours,
		description: pick("description", a, b).description.clone(),
		popularity: a.popularity.max(b.popularity),
		fact_sources: BTreeMap::new(),
		pinned: a.pinned || b.pinned,
	};
	for theme in &b.themes {
		if !out.themes.iter().any(|t| t.eq_ignore_ascii_case(theme)) {
			out.themes.push(theme.clone());
		}
	}
	// Provenance of each attribute is the max of both sides; a verified fact
	// can never come out downgraded.
	for (attr, source) in a.fact_sources.iter().chain(b.fact_sources.iter()) {
		let entry = out.fact_sources.entry(attr.clone()).or_default();
		if *source > *entry {
			*entry = *source;
		}
	}
	out
}

fn merge_into(pool: &mut Vec<Poi>, incoming: Vec<Poi>) {
	for poi in incoming {
		let key = poi.normalized_name();
		match pool.iter_mut().find(|p| p.normalized_name() == key) {
			Some(existing) => *existing = fuse(existing, &poi),
			None => pool.push(poi),
		}
	}
}

// --- Ranking ---

fn theme_match(poi: &Poi, themes: &[String]) -> f64 {
	if themes.is_empty() {
		return 0.5;
	}
	let matched = themes.iter().filter(|t| poi.has_theme(t)).count();
	matched as f64 / themes.len() as f64
}

/// Candidate score: `theme_match*3 + indoor_bonus + popularity - cost_share*0.5`.
pub fn score(poi: &Poi, themes: &[String], daily_budget: Option<f64>) -> f64 {
	let indoor_bonus = if poi.indoor { 1.0 } else { 0.0 };
	let cost_share = match daily_budget {
		Some(budget) if budget > 0.0 => poi.cost / budget,
		_ => 0.0,
	};
	theme_match(poi, themes) * 3.0 + indoor_bonus + poi.popularity - cost_share * 0.5
}

fn rank(pool: &mut [Poi], themes: &[String], daily_budget: Option<f64>) {
	pool.sort_by(|a, b| {
		score(b, themes, daily_budget)
			.total_cmp(&score(a, themes, daily_budget))
			.then_with(|| a.name.cmp(&b.name))
	});
}

// --- LLM fallback ---

#[derive(Debug, Deserialize)]
struct LlmPoi {
	name: String,
	lat: Option<f64>,
	lon: Option<f64>,
	#[serde(default)]
	themes: Vec<String>,
	typical_duration: Option<f64>,
	cost: Option<f64>,
	#[serde(default)]
	indoor: bool,
	ticket_price: Option<f64>,
	#[serde(default)]
	reservation_required: bool,
	#[serde(default)]
	description: String,
}

async fn llm_fallback(
	providers: &ProviderSet,
	constraints: &TripConstraints,
	themes: &[String],
	want: usize,
	deadline: Option<Instant>,
) -> Vec<Poi> {
	let Some(generator) = providers.generator.as_deref() else {
		return Vec::new();
	};

	// One re-prompt with a sterner instruction when the reply fails to parse.
	let mut parsed: Vec<LlmPoi> = Vec::new();
	for strict in [false, true] {
		let stern = if strict {
			"Your previous reply was not valid JSON. Reply with the JSON array ONLY, no prose, no code fences."
		} else {
			"Reply with a JSON array only."
		};
		let prompt = format!(
			r#"List {want} real points of interest in {city} for a traveler interested in: {themes}.
{stern} Each element:
{{"name": string, "lat": number, "lon": number, "themes": [string], "typical_duration": hours,
"cost": number, "indoor": bool, "ticket_price": number, "reservation_required": bool, "description": string}}"#,
			city = constraints.city,
			themes = if themes.is_empty() { "general sightseeing".to_string() } else { themes.join(", ") },
		);

		let reply = match call_external("llm", CallPolicy::llm(), deadline, || {
			generator.generate(&prompt)
		})
		.await
		{
			Ok(reply) => reply,
			Err(e) => {
				warn!(target: "retriever", error = %e, "llm fallback unavailable");
				return Vec::new();
			}
		};

		match serde_json::from_str(strip_code_fences(&reply)) {
			Ok(ok) => {
				parsed = ok;
				break;
			}
			Err(e) => {
				warn!(target: "retriever", strict, error = %e, "llm fallback reply unparseable");
			}
		}
	}

	parsed
		.into_iter()
		.filter(|p| !p.name.trim().is_empty())
		.map(|p| {
			let mut poi = Poi {
				id: format!("llm-{}", normalize_name(&p.name)),
				name: p.name,
				city: constraints.city.clone(),
				lat: p.lat.unwrap_or(0.0),
				lon: p.lon.unwrap_or(0.0),
				themes: p.themes,
				typical_duration: p.typical_duration.unwrap_or(1.5),
				cost: p.cost.unwrap_or(0.0),
				indoor: p.indoor,
				ticket_price: p.ticket_price.unwrap_or(0.0),
				reservation_required: p.reservation_required,
				description: p.description,
				popularity: 0.4,
				..Default::default()
			};
			poi.tag_all_facts(FactSource::Heuristic);
			poi
		})
		.collect()
}

/// Ensures every must-visit name exists in the pool, pinned. Unknown names
/// become fallback stubs so the plan can still carry them (and the validator
/// can complain about their missing facts).
fn pin_must_visits(pool: &mut Vec<Poi>, constraints: &TripConstraints) {
	for name in &constraints.must_visit {
		let key = normalize_name(name);
		// "Panda Base" should pin "Chengdu Panda Base"; substring is enough.
		match pool
			.iter_mut()
			.find(|p| p.normalized_name() == key || p.normalized_name().contains(&key))
		{
			Some(poi) => poi.pinned = true,
			None => {
				debug!(target: "retriever", name = %name, "must-visit not found in any source, stubbing");
				let mut stub = Poi {
					id: format!("stub-{key}"),
					name: name.clone(),
					city: constraints.city.clone(),
					typical_duration: 2.0,
					popularity: 0.5,
					pinned: true,
					..Default::default()
				};
				stub.tag_all_facts(FactSource::Fallback);
				pool.push(stub);
			}
		}
	}
}

/// Produces the ranked candidate pool.
pub async fn run(
	constraints: &TripConstraints,
	profile: &UserProfile,
	providers: &ProviderSet,
	config: &Config,
	poi_cache: &PoiQueryCache,
	deadline: Option<Instant>,
) -> Result<RetrievedPool, PlanError> {
	let want = pool_size(constraints);
	let themes = &profile.themes;
	let mut used_map = false;

	// Strict mode refuses to plan from curated/heuristic data alone.
	if config.strict_external_data && providers.map_poi.is_none() {
		return Err(PlanError::ProviderUnavailable(
			"strict mode requires the map provider".into(),
		));
	}

	let cache_key = poi_query_key(&constraints.city, themes);
	let map_limit = want.max(min_pool(constraints));

	// Curated lookup and map search fan out together.
	let curated_call = providers
		.curated
		.search_pois(&constraints.city, themes, map_limit);
	let map_call = async {
		match providers.map_poi.as_deref() {
			Some(map) => {
				if let Some(hit) = poi_cache.get(&cache_key) {
					debug!(target: "retriever", "poi cache hit");
					return Some(Ok(hit));
				}
				Some(
					call_external("map", CallPolicy::map(), deadline, || {
						map.search_pois(&constraints.city, themes, map_limit)
					})
					.await,
				)
			}
			None => None,
		}
	};
	let (curated_res, map_res) = futures::join!(curated_call, map_call);

	let mut pool: Vec<Poi> = Vec::new();
	match curated_res {
		Ok(pois) => merge_into(&mut pool, pois),
		Err(e) => warn!(target: "retriever", error = %e, "curated lookup failed"),
	}
	match map_res {
		Some(Ok(pois)) => {
			poi_cache.put(cache_key, pois.clone());
			used_map = true;
			merge_into(&mut pool, pois);
		}
		Some(Err(e)) => {
			if config.strict_external_data {
				return Err(PlanError::ProviderUnavailable(format!("map provider: {e}")));
			}
			warn!(target: "retriever", error = %e, "map provider failed, degrading");
		}
		None => {}
	}

	// Drop avoided names before deciding whether the pool is big enough.
	pool.retain(|p| {
		!constraints
			.avoid
			.iter()
			.any(|name| normalize_name(name) == p.normalized_name())
	});

	let mut used_llm = false;
	if pool.len() < min_pool(constraints) {
		let missing = min_pool(constraints) - pool.len();
		info!(target: "retriever", have = pool.len(), missing, "pool too small, invoking llm fallback");
		let generated = llm_fallback(providers, constraints, themes, missing.max(4), deadline).await;
		used_llm = !generated.is_empty();
		merge_into(&mut pool, generated);
		pool.retain(|p| {
			!constraints
				.avoid
				.iter()
				.any(|name| normalize_name(name) == p.normalized_name())
		});
	}

	pin_must_visits(&mut pool, constraints);
	rank(&mut pool, themes, constraints.daily_budget);
	pool.truncate(want.max(min_pool(constraints)) + constraints.must_visit.len());

	info!(
		target: "retriever",
		pool = pool.len(),
		want,
		used_map,
		used_llm,
		"candidate pool ready"
	);

	Ok(RetrievedPool {
		pois: pool,
		used_map_provider: used_map,
		used_llm_fallback: used_llm,
	})
}
