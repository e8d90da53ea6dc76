/*
 * src/models/poi.rs
 *
 * Points of interest and the provenance tags on their facts.
 *
 * Purpose:
 *   [Poi] is immutable once created; every attribute that reaches an output
 *   carries a [FactSource] in `fact_sources`. POIs live in a [PoiArena]
 *   keyed by id and schedule items refer to them by id only.
 */

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Provenance tier of a single fact. Ordering is the fusion rank: when two
/// sources disagree, the higher tier wins and a higher tier is never
/// overwritten by a lower one.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
	Default,
)]
#[serde(rename_all = "snake_case")]
pub enum FactSource {
	#[default]
	Unknown,
	Fallback,
	Heuristic,
	Curated,
	Verified,
}

impl FactSource {
	pub fn is_trusted(self) -> bool {
		matches!(self, FactSource::Verified | FactSource::Curated)
	}
}

/// Daily opening window. POIs without one are flagged by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OpenHours {
	pub open: NaiveTime,
	pub close: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Default)]
pub struct Poi {
	pub id: String,
	pub name: String,
	pub city: String,
	pub lat: f64,
	pub lon: f64,
	pub themes: Vec<String>,
	/// Typical visit length in hours.
	pub typical_duration: f64,
	/// All-in per-person cost of the visit.
	pub cost: f64,
	pub indoor: bool,
	pub ticket_price: f64,
	pub reservation_required: bool,
	/// Textual closure predicates, e.g. "monday" or "2026-02-17..2026-02-19".
	pub closed_rules: Vec<String>,
	pub open_hours: Option<OpenHours>,
	pub description: String,
	/// Relative popularity in [0, 1], used by candidate ranking.
	pub popularity: f64,
	/// Per-attribute provenance. Attributes not listed are [FactSource::Unknown].
	pub fact_sources: BTreeMap<String, FactSource>,
	/// Set for must-visit POIs; pinned items survive every repair rung.
	#[serde(default)]
	pub pinned: bool,
}

static DATE_RANGE_RULE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})\.\.(\d{4}-\d{2}-\d{2})$").unwrap());
static DATE_RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

fn weekday_of(token: &str) -> Option<Weekday> {
	match token {
		"mon" | "monday" | "mondays" => Some(Weekday::Mon),
		"tue" | "tuesday" | "tuesdays" => Some(Weekday::Tue),
		"wed" | "wednesday" | "wednesdays" => Some(Weekday::Wed),
		"thu" | "thursday" | "thursdays" => Some(Weekday::Thu),
		"fri" | "friday" | "fridays" => Some(Weekday::Fri),
		"sat" | "saturday" | "saturdays" => Some(Weekday::Sat),
		"sun" | "sunday" | "sundays" => Some(Weekday::Sun),
		_ => None,
	}
}

impl Poi {
	/// Evaluates the textual closure predicates against a concrete date.
	/// Unrecognized rules are ignored rather than closing the POI.
	pub fn is_closed_on(&self, date: NaiveDate) -> bool {
		self.closed_rules.iter().any(|rule| {
			let rule = rule.trim().to_ascii_lowercase();
			let rule = rule.strip_prefix("closed:").unwrap_or(&rule).trim().to_string();
			if let Some(weekday) = weekday_of(&rule) {
				return date.weekday() == weekday;
			}
			if DATE_RULE.is_match(&rule) {
				return NaiveDate::parse_from_str(&rule, "%Y-%m-%d")
					.map(|d| d == date)
					.unwrap_or(false);
			}
			if let Some(caps) = DATE_RANGE_RULE.captures(&rule) {
				let from = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d");
				let to = NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d");
				if let (Ok(from), Ok(to)) = (from, to) {
					return from <= date && date <= to;
				}
			}
			false
		})
	}

	/// True when the POI is closed on every one of the given dates. Empty date
	/// lists (no concrete trip dates known) count as never closed.
	pub fn is_closed_on_all(&self, dates: &[NaiveDate]) -> bool {
		!dates.is_empty() && dates.iter().all(|d| self.is_closed_on(*d))
	}

	pub fn has_theme(&self, theme: &str) -> bool {
		self.themes.iter().any(|t| t.eq_ignore_ascii_case(theme))
	}

	pub fn shares_theme(&self, other: &Poi) -> bool {
		self.themes.iter().any(|t| other.has_theme(t))
	}

	/// Name normalized for dedup: lowercase alphanumerics only.
	pub fn normalized_name(&self) -> String {
		normalize_name(&self.name)
	}

	pub fn source_of(&self, attr: &str) -> FactSource {
		self.fact_sources.get(attr).copied().unwrap_or_default()
	}

	/// Tags attributes that carry no provenance yet, leaving explicit tags
	/// (higher or lower) untouched.
	pub fn tag_missing_facts(&mut self, source: FactSource) {
		for attr in Self::FACT_ATTRS {
			self.fact_sources.entry(attr.to_string()).or_insert(source);
		}
	}

	/// Tags every currently known attribute with the same provenance tier,
	/// without downgrading any attribute already tagged higher.
	pub fn tag_all_facts(&mut self, source: FactSource) {
		for attr in Self::FACT_ATTRS {
			let entry = self.fact_sources.entry(attr.to_string()).or_default();
			if source > *entry {
				*entry = source;
			}
		}
	}

	const FACT_ATTRS: [&'static str; 11] = [
		"name",
		"location",
		"themes",
		"typical_duration",
		"cost",
		"indoor",
		"ticket_price",
		"reservation_required",
		"closed_rules",
		"open_hours",
		"description",
	];
}

pub fn normalize_name(name: &str) -> String {
	name.chars()
		.filter(|c| c.is_alphanumeric())
		.flat_map(|c| c.to_lowercase())
		.collect()
}

/// Arena of POIs for one planning request. Schedule items hold ids into this
/// arena, which keeps the itinerary cheap to copy and free of reference cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PoiArena {
	pois: BTreeMap<String, Poi>,
}

impl PoiArena {
	pub fn insert(&mut self, poi: Poi) -> String {
		let id = poi.id.clone();
		self.pois.insert(id.clone(), poi);
		id
	}

	pub fn get(&self, id: &str) -> Option<&Poi> {
		self.pois.get(id)
	}

	pub fn contains(&self, id: &str) -> bool {
		self.pois.contains_key(id)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Poi> {
		self.pois.values()
	}

	pub fn len(&self) -> usize {
		self.pois.len()
	}

	pub fn is_empty(&self) -> bool {
		self.pois.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn poi_closed(rules: &[&str]) -> Poi {
		Poi {
			id: "p1".into(),
			name: "Test Museum".into(),
			closed_rules: rules.iter().map(|s| s.to_string()).collect(),
			..Default::default()
		}
	}

	#[test]
	fn weekday_closure_rule() {
		let poi = poi_closed(&["monday"]);
		// 2026-04-06 is a Monday
		assert!(poi.is_closed_on(NaiveDate::from_ymd_opt(2026, 4, 6).unwrap()));
		assert!(!poi.is_closed_on(NaiveDate::from_ymd_opt(2026, 4, 7).unwrap()));
	}

	#[test]
	fn date_range_closure_rule() {
		let poi = poi_closed(&["2026-02-17..2026-02-19"]);
		assert!(poi.is_closed_on(NaiveDate::from_ymd_opt(2026, 2, 18).unwrap()));
		assert!(!poi.is_closed_on(NaiveDate::from_ymd_opt(2026, 2, 20).unwrap()));
	}

	#[test]
	fn unknown_rules_do_not_close() {
		let poi = poi_closed(&["during renovations"]);
		assert!(!poi.is_closed_on(NaiveDate::from_ymd_opt(2026, 4, 6).unwrap()));
	}

	#[test]
	fn closed_on_all_requires_dates() {
		let poi = poi_closed(&["monday"]);
		assert!(!poi.is_closed_on_all(&[]));
		assert!(poi.is_closed_on_all(&[NaiveDate::from_ymd_opt(2026, 4, 6).unwrap()]));
	}

	#[test]
	fn tag_all_facts_never_downgrades() {
		let mut poi = poi_closed(&[]);
		poi.fact_sources.insert("name".into(), FactSource::Verified);
		poi.tag_all_facts(FactSource::Heuristic);
		assert_eq!(poi.source_of("name"), FactSource::Verified);
		assert_eq!(poi.source_of("cost"), FactSource::Heuristic);
	}

	#[test]
	fn name_normalization() {
		assert_eq!(normalize_name("The  Great-Wall!"), "thegreatwall");
	}
}
