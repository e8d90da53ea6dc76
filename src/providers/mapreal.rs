/*
 * src/providers/mapreal.rs
 *
 * Realtime map-backed providers: POI search via Places nearby search (with a
 * geocoding hop to anchor on the city center) and leg times via Directions.
 *
 * Response payloads are walked as JSON values rather than through the typed
 * structs; the subset of fields we read is stable across API revisions and a
 * missing field must degrade to a heuristic fact, not fail the request.
 */

use async_trait::async_trait;
use google_maps::places_new::{Field, FieldMask};
use num_traits::ToPrimitive;
use serde_json::Value;
use tracing::{debug, warn};

use super::{PoiSearch, ProviderError, RouteBetween, RouteEstimate};
use crate::models::{FactSource, Poi, TransportMode};

pub struct MapPoiProvider {
	api_key: String,
}

impl MapPoiProvider {
	pub fn new(api_key: String) -> Self {
		Self { api_key }
	}

	fn client(&self) -> Result<google_maps::Client, ProviderError> {
		google_maps::Client::try_new(self.api_key.clone())
			.map_err(|e| ProviderError::Unavailable(format!("map client: {e}")))
	}

	/// Resolves a city name to its center coordinates.
	async fn geocode_city(&self, city: &str) -> Result<(f64, f64), ProviderError> {
		let client = self.client()?;
		let res = client
			.geocoding()
			.with_address(city)
			.execute()
			.await
			.map_err(|e| ProviderError::Unavailable(format!("geocoding: {e}")))?;
		if let Some(err) = res.error_message {
			return Err(ProviderError::Unavailable(format!("geocoding: {err}")));
		}
		let Some(first) = res.results.first() else {
			return Err(ProviderError::Malformed(format!("no geocode result for {city}")));
		};
		let lat = first.geometry.location.lat.to_f64();
		let lng = first.geometry.location.lng.to_f64();
		match (lat, lng) {
			(Some(lat), Some(lng)) => Ok((lat, lng)),
			_ => Err(ProviderError::Malformed("geocode coordinates unreadable".into())),
		}
	}
}

/// Visit length guess by place type, in hours.
fn duration_for_themes(themes: &[String]) -> f64 {
	if themes.iter().any(|t| t == "history" || t == "art") {
		2.5
	} else if themes.iter().any(|t| t == "nature") {
		2.0
	} else if themes.iter().any(|t| t == "food") {
		1.0
	} else {
		1.5
	}
}

fn themes_from_types(types: &[String]) -> Vec<String> {
	let mut themes = Vec::new();
	for t in types {
		let theme = match t.as_str() {
			"museum" | "historical_landmark" | "cultural_center" => "history",
			"art_gallery" | "performing_arts_theater" => "art",
			"park" | "national_park" | "garden" | "hiking_area" | "zoo" => "nature",
			"restaurant" | "cafe" | "bakery" | "food_court" | "bar" => "food",
			"shopping_mall" | "market" => "shopping",
			"amusement_park" | "aquarium" => "family",
			"church" | "hindu_temple" | "mosque" | "synagogue" | "place_of_worship" => "temple",
			_ => continue,
		};
		if !themes.iter().any(|existing| existing == theme) {
			themes.push(theme.to_string());
		}
	}
	themes
}

fn price_level_estimate(value: &Value) -> f64 {
	match value.as_str().unwrap_or_default() {
		"PRICE_LEVEL_FREE" => 0.0,
		"PRICE_LEVEL_INEXPENSIVE" => 10.0,
		"PRICE_LEVEL_MODERATE" => 25.0,
		"PRICE_LEVEL_EXPENSIVE" => 60.0,
		"PRICE_LEVEL_VERY_EXPENSIVE" => 120.0,
		_ => 15.0,
	}
}

/// Builds a [Poi] from one place payload. Returns None when the payload lacks
/// the facts nothing downstream can work without (name, coordinates).
fn poi_from_place(place: &Value, city: &str) -> Option<Poi> {
	let name = place["displayName"]["text"]
		.as_str()
		.or_else(|| place["displayName"].as_str())?
		.to_string();
	let lat = place["location"]["latitude"].as_f64()?;
	let lon = place["location"]["longitude"].as_f64()?;
	let id = place["id"]
		.as_str()
		.map(|s| format!("gm-{s}"))
		.unwrap_or_else(|| format!("gm-{}", crate::models::poi::normalize_name(&name)));

	let types: Vec<String> = place["types"]
		.as_array()
		.map(|arr| {
			arr.iter()
				.filter_map(|v| v.as_str().map(str::to_string))
				.collect()
		})
		.unwrap_or_default();
	let themes = themes_from_types(&types);
	let cost = price_level_estimate(&place["priceLevel"]);
	let description = place["editorialSummary"]["text"]
		.as_str()
		.unwrap_or_default()
		.to_string();

	let mut poi = Poi {
		id,
		name,
		city: city.to_string(),
		lat,
		lon,
		typical_duration: duration_for_themes(&themes),
		themes,
		cost,
		indoor: types.iter().any(|t| t == "museum" || t == "art_gallery" || t == "aquarium"),
		ticket_price: cost,
		reservation_required: false,
		closed_rules: Vec::new(),
		open_hours: None,
		description,
		popularity: 0.5,
		..Default::default()
	};

	// Identity facts come straight from the provider; the rest are estimates.
	poi.tag_missing_facts(FactSource::Heuristic);
	poi.fact_sources.insert("name".into(), FactSource::Verified);
	poi.fact_sources.insert("location".into(), FactSource::Verified);
	if !poi.description.is_empty() {
		poi.fact_sources.insert("description".into(), FactSource::Verified);
	}
	Some(poi)
}

#[async_trait]
impl PoiSearch for MapPoiProvider {
	fn name(&self) -> &'static str {
		"mapreal"
	}

	async fn search_pois(
		&self,
		city: &str,
		themes: &[String],
		limit: usize,
	) -> Result<Vec<Poi>, ProviderError> {
		let (lat, lng) = self.geocode_city(city).await?;
		let client = self.client()?;

		let search_res = client
			.nearby_search((lat, lng, 50_000.))
			.map_err(|e| ProviderError::Unavailable(format!("nearby search: {e}")))?
			.field_mask(FieldMask::Specific(vec![
				Field::PlacesDisplayName,
				Field::PlacesId,
				Field::PlacesLocation,
				Field::PlacesTypes,
				Field::PlacesPriceLevel,
				Field::PlacesRegularOpeningHours,
				Field::PlacesEditorialSummary,
			]))
			.execute()
			.await
			.map_err(|e| ProviderError::Unavailable(format!("nearby search: {e}")))?;

		if let Some(err) = search_res.error() {
			return Err(ProviderError::Unavailable(format!("nearby search: {err}")));
		}

		let places = search_res.places();
		debug!(target: "providers", city, places = places.len(), "nearby search returned");

		let mut pois: Vec<Poi> = places
			.iter()
			.filter_map(|place| {
				let value = serde_json::to_value(place).ok()?;
				poi_from_place(&value, city)
			})
			.collect();

		// Theme matches first so truncation drops the least relevant.
		if !themes.is_empty() {
			pois.sort_by_key(|p| {
				let matched = themes.iter().any(|t| p.has_theme(t));
				(!matched, p.name.clone())
			});
		}
		pois.truncate(limit);
		Ok(pois)
	}
}

pub struct MapRouteProvider {
	api_key: String,
}

impl MapRouteProvider {
	pub fn new(api_key: String) -> Self {
		Self { api_key }
	}
}

fn travel_mode_of(mode: TransportMode) -> google_maps::directions::TravelMode {
	use google_maps::directions::TravelMode;
	match mode {
		TransportMode::Walking => TravelMode::Walking,
		TransportMode::PublicTransit => TravelMode::Transit,
		TransportMode::Taxi | TransportMode::Driving => TravelMode::Driving,
	}
}

#[async_trait]
impl RouteBetween for MapRouteProvider {
	fn name(&self) -> &'static str {
		"mapreal"
	}

	fn confidence(&self) -> f64 {
		1.0
	}

	async fn route_minutes(
		&self,
		origin: (f64, f64),
		dest: (f64, f64),
		mode: TransportMode,
	) -> Result<RouteEstimate, ProviderError> {
		use google_maps::directions::Location;
		use google_maps::LatLng;

		let client = google_maps::Client::try_new(self.api_key.clone())
			.map_err(|e| ProviderError::Unavailable(format!("map client: {e}")))?;

		let from = LatLng::try_from_f64(origin.0, origin.1)
			.map_err(|e| ProviderError::Malformed(format!("origin: {e}")))?;
		let to = LatLng::try_from_f64(dest.0, dest.1)
			.map_err(|e| ProviderError::Malformed(format!("destination: {e}")))?;

		let res = client
			.directions(Location::LatLng(from), Location::LatLng(to))
			.with_travel_mode(travel_mode_of(mode))
			.execute()
			.await
			.map_err(|e| ProviderError::Unavailable(format!("directions: {e}")))?;

		// Read the first leg's duration out of the JSON shape; a payload
		// without one is a provider bug we degrade on, not crash on.
		let value = serde_json::to_value(&res)
			.map_err(|e| ProviderError::Malformed(format!("directions payload: {e}")))?;
		let seconds = value["routes"][0]["legs"][0]["duration"]["value"]
			.as_i64()
			.or_else(|| value["routes"][0]["legs"][0]["duration"].as_i64());
		match seconds {
			Some(seconds) => Ok(RouteEstimate {
				minutes: (seconds / 60).max(1),
				confidence: 1.0,
			}),
			None => {
				warn!(target: "providers", "directions response had no duration");
				Err(ProviderError::Malformed("directions without duration".into()))
			}
		}
	}
}
