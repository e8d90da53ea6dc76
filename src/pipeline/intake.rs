/*
 * src/pipeline/intake.rs
 *
 * Turns the free-form request message (plus any structured constraints the
 * caller sent) into [TripConstraints] and [UserProfile].
 *
 * Two strategies run in order: an LLM-guided parse when a generator is
 * configured, then a regex/heuristic pass that always runs and fills whatever
 * is still missing. Required fields are {city, days}; when either is absent
 * the orchestrator hands off to clarify.
 */

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{
	Pace, TransportMode, TravelersType, TripConstraints, UserProfile,
};
use crate::providers::llm::strip_code_fences;
use crate::providers::retry::{CallPolicy, call_external};
use crate::providers::{Generate, ProviderSet};

/// Fields clarify can ask about, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClarifyField {
	City,
	Days,
	Dates,
	Budget,
	Themes,
}

#[derive(Debug, Default)]
pub struct IntakeOutcome {
	pub constraints: Option<TripConstraints>,
	pub profile: UserProfile,
	/// All absent fields in priority order; a plan can proceed as long as
	/// neither City nor Days is among them.
	pub missing: Vec<ClarifyField>,
	/// Which part of the input supported each extracted field.
	pub field_evidence: BTreeMap<String, String>,
}

/// Partially-specified constraints, either sent by the caller alongside the
/// message or parsed out of an LLM reply. Numeric fields accept strings.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct IntakeDraft {
	pub city: Option<String>,
	pub days: Option<Value>,
	pub date_start: Option<String>,
	pub date_end: Option<String>,
	pub daily_budget: Option<Value>,
	pub transport_mode: Option<String>,
	pub pace: Option<String>,
	#[serde(default)]
	pub must_visit: Vec<String>,
	#[serde(default)]
	pub avoid: Vec<String>,
	pub travelers_type: Option<String>,
	#[serde(default)]
	pub themes: Vec<String>,
	#[serde(default)]
	pub dietary: Vec<String>,
	#[serde(default)]
	pub mobility_limits: Vec<String>,
}

fn coerce_u32(value: &Value) -> Option<u32> {
	match value {
		Value::Number(n) => n.as_u64().map(|v| v as u32),
		Value::String(s) => s.trim().parse().ok(),
		_ => None,
	}
}

fn coerce_f64(value: &Value) -> Option<f64> {
	match value {
		Value::Number(n) => n.as_f64(),
		Value::String(s) => s.trim().parse().ok(),
		_ => None,
	}
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
	NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Working state while strategies fill fields one by one.
#[derive(Debug, Default)]
struct DraftState {
	city: Option<String>,
	days: Option<u32>,
	date_start: Option<NaiveDate>,
	date_end: Option<NaiveDate>,
	daily_budget: Option<f64>,
	transport_mode: Option<TransportMode>,
	pace: Option<Pace>,
	must_visit: BTreeSet<String>,
	avoid: BTreeSet<String>,
	travelers_type: Option<TravelersType>,
	themes: Vec<String>,
	dietary: Vec<String>,
	mobility_limits: Vec<String>,
	evidence: BTreeMap<String, String>,
}

impl DraftState {
	fn note(&mut self, field: &str, evidence: impl Into<String>) {
		self.evidence.entry(field.to_string()).or_insert(evidence.into());
	}

	fn absorb_draft(&mut self, draft: &IntakeDraft, origin: &str) {
		if self.city.is_none() {
			if let Some(city) = draft.city.as_ref().filter(|c| !c.trim().is_empty()) {
				self.city = Some(city.trim().to_string());
				self.note("city", origin);
			}
		}
		if self.days.is_none() {
			if let Some(days) = draft.days.as_ref().and_then(coerce_u32).filter(|d| *d >= 1) {
				self.days = Some(days);
				self.note("days", origin);
			}
		}
		if self.date_start.is_none() {
			if let Some(date) = draft.date_start.as_deref().and_then(parse_date) {
				self.date_start = Some(date);
				self.note("dates", origin);
			}
		}
		if self.date_end.is_none() {
			self.date_end = draft.date_end.as_deref().and_then(parse_date);
		}
		if self.daily_budget.is_none() {
			if let Some(budget) = draft
				.daily_budget
				.as_ref()
				.and_then(coerce_f64)
				.filter(|b| *b > 0.0)
			{
				self.daily_budget = Some(budget);
				self.note("daily_budget", origin);
			}
		}
		if self.transport_mode.is_none() {
			self.transport_mode = draft
				.transport_mode
				.as_deref()
				.and_then(transport_of);
		}
		if self.pace.is_none() {
			self.pace = draft.pace.as_deref().and_then(pace_of);
		}
		if self.travelers_type.is_none() {
			self.travelers_type = draft.travelers_type.as_deref().and_then(travelers_of);
		}
		for name in &draft.must_visit {
			if !name.trim().is_empty() {
				self.must_visit.insert(name.trim().to_string());
			}
		}
		for name in &draft.avoid {
			if !name.trim().is_empty() {
				self.avoid.insert(name.trim().to_string());
			}
		}
		for theme in &draft.themes {
			push_theme(&mut self.themes, theme);
		}
		self.dietary.extend(draft.dietary.iter().cloned());
		self.mobility_limits.extend(draft.mobility_limits.iter().cloned());
	}
}

fn transport_of(raw: &str) -> Option<TransportMode> {
	let raw = raw.to_ascii_lowercase();
	if raw.contains("walk") {
		Some(TransportMode::Walking)
	} else if raw.contains("transit") || raw.contains("metro") || raw.contains("subway") || raw.contains("bus") {
		Some(TransportMode::PublicTransit)
	} else if raw.contains("taxi") || raw.contains("cab") {
		Some(TransportMode::Taxi)
	} else if raw.contains("driv") || raw.contains("car") {
		Some(TransportMode::Driving)
	} else {
		None
	}
}

fn pace_of(raw: &str) -> Option<Pace> {
	let raw = raw.to_ascii_lowercase();
	if raw.contains("relax") || raw.contains("slow") || raw.contains("easy") {
		Some(Pace::Relaxed)
	} else if raw.contains("intens") || raw.contains("packed") || raw.contains("busy") {
		Some(Pace::Intensive)
	} else if raw.contains("moderate") {
		Some(Pace::Moderate)
	} else {
		None
	}
}

fn travelers_of(raw: &str) -> Option<TravelersType> {
	let raw = raw.to_ascii_lowercase();
	if raw.contains("solo") || raw.contains("alone") {
		Some(TravelersType::Solo)
	} else if raw.contains("couple") || raw.contains("partner") {
		Some(TravelersType::Couple)
	} else if raw.contains("family") || raw.contains("kids") || raw.contains("children") {
		Some(TravelersType::Family)
	} else if raw.contains("friend") {
		Some(TravelersType::Friends)
	} else if raw.contains("elderly") || raw.contains("senior") || raw.contains("parents") {
		Some(TravelersType::Elderly)
	} else {
		None
	}
}

fn push_theme(themes: &mut Vec<String>, theme: &str) {
	let theme = theme.trim().to_ascii_lowercase();
	if !theme.is_empty() && !themes.contains(&theme) {
		themes.push(theme);
	}
}

// --- Strategy 2: regex/heuristic parse ---

static RE_CITY_LEAD: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^\s*([A-Za-z][A-Za-z .'\-]{1,40}?)\s*[,:]?\s+\d+\s*-?\s*days?\b").unwrap());
static RE_CITY_PREP: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"(?:\b(?:in|to|visit|visiting|around)\s+)([A-Z][a-zA-Z'\-]+(?:\s+[A-Z][a-zA-Z'\-]+)?)").unwrap()
});
static RE_DAYS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\d+)\s*-?\s*days?\b").unwrap());
static RE_BUDGET: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"(?i)budget\s*(?:of\s*|is\s*)?(\d+(?:\.\d+)?)(?:\s*/\s*day|\s*per\s*day)?").unwrap()
});
static RE_PER_DAY: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*/\s*day").unwrap());
static RE_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap());
static RE_MUST_VISIT: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"(?i)must[_\s-]?(?:visit|see)\s*[:=]?\s*([^,;.!?]+)").unwrap()
});
static RE_AVOID: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"(?i)\bavoid\s*[:=]?\s*([^,;.!?]+)").unwrap());

const THEME_KEYWORDS: &[(&str, &str)] = &[
	("history", "history"),
	("historical", "history"),
	("museum", "history"),
	("culture", "history"),
	("temple", "temple"),
	("food", "food"),
	("eat", "food"),
	("cuisine", "food"),
	("restaurant", "food"),
	("art", "art"),
	("gallery", "art"),
	("nature", "nature"),
	("park", "nature"),
	("hik", "nature"),
	("outdoor", "nature"),
	("shopping", "shopping"),
	("market", "shopping"),
	("nightlife", "nightlife"),
	("family", "family"),
];

fn heuristic_parse(message: &str, state: &mut DraftState, gazetteer: &[String], config: &Config) {
	if state.city.is_none() {
		// A known dataset city named anywhere in the message wins.
		let lowered = message.to_ascii_lowercase();
		for city in gazetteer {
			if lowered.contains(&city.to_ascii_lowercase()) {
				state.city = Some(city.clone());
				state.note("city", format!("matched known city \"{city}\""));
				break;
			}
		}
	}
	if state.city.is_none() {
		if let Some(caps) = RE_CITY_LEAD.captures(message) {
			state.city = Some(caps[1].trim().to_string());
			state.note("city", caps[0].trim().to_string());
		} else if let Some(caps) = RE_CITY_PREP.captures(message) {
			state.city = Some(caps[1].trim().to_string());
			state.note("city", caps[0].trim().to_string());
		}
	}

	if state.days.is_none() {
		if let Some(caps) = RE_DAYS.captures(message) {
			if let Ok(days) = caps[1].parse::<u32>() {
				if days >= 1 {
					state.days = Some(days);
					state.note("days", caps[0].trim().to_string());
				}
			}
		}
	}

	if state.daily_budget.is_none() {
		let caps = RE_BUDGET.captures(message).or_else(|| RE_PER_DAY.captures(message));
		if let Some(caps) = caps {
			if let Ok(budget) = caps[1].parse::<f64>() {
				if budget > 0.0 {
					state.daily_budget = Some(budget);
					state.note("daily_budget", caps[0].trim().to_string());
				}
			}
		}
	}

	if state.date_start.is_none() {
		let mut dates = RE_DATE.captures_iter(message).filter_map(|c| parse_date(&c[1]));
		if let Some(first) = dates.next() {
			state.date_start = Some(first);
			state.date_end = dates.next();
			state.note("dates", first.to_string());
		}
	}
	if state.date_start.is_none() && message.to_ascii_lowercase().contains("spring festival") {
		// Anchor on the configured festival date.
		state.date_start = Some(config.spring_festival_date);
		state.note("dates", "spring festival".to_string());
	}

	for caps in RE_MUST_VISIT.captures_iter(message) {
		state.must_visit.insert(caps[1].trim().to_string());
		state.note("must_visit", caps[0].trim().to_string());
	}
	for caps in RE_AVOID.captures_iter(message) {
		state.avoid.insert(caps[1].trim().to_string());
	}

	let lowered = message.to_ascii_lowercase();
	for (keyword, theme) in THEME_KEYWORDS {
		if lowered.contains(keyword) {
			push_theme(&mut state.themes, theme);
			state.note("themes", format!("keyword \"{keyword}\""));
		}
	}

	if state.pace.is_none() {
		state.pace = pace_of(&lowered);
	}
	if state.transport_mode.is_none() {
		state.transport_mode = transport_of(&lowered);
	}
	if state.travelers_type.is_none() {
		state.travelers_type = travelers_of(&lowered);
	}
}

// --- Strategy 1: LLM-guided parse ---

fn llm_prompt(message: &str, strict: bool) -> String {
	let stern = if strict {
		"Your previous reply was not valid JSON. Reply with the JSON object ONLY, no prose, no code fences."
	} else {
		"Reply with a single JSON object and nothing else."
	};
	format!(
		r#"Extract trip planning constraints from the user message.

USER MESSAGE:
{message}

{stern}
Use exactly these keys (omit or null the unknown ones):
{{"city": string, "days": integer, "date_start": "YYYY-MM-DD", "date_end": "YYYY-MM-DD",
"daily_budget": number, "transport_mode": "walking|public_transit|taxi|driving",
"pace": "relaxed|moderate|intensive", "must_visit": [string], "avoid": [string],
"travelers_type": "solo|couple|family|friends|elderly", "themes": [string],
"dietary": [string], "mobility_limits": [string]}}"#
	)
}

async fn llm_parse(
	generator: &dyn Generate,
	message: &str,
	deadline: Option<Instant>,
) -> Option<IntakeDraft> {
	// One retry with a sterner prompt when the reply fails to parse.
	for strict in [false, true] {
		let prompt = llm_prompt(message, strict);
		let reply = match call_external("llm", CallPolicy::llm(), deadline, || {
			generator.generate(&prompt)
		})
		.await
		{
			Ok(reply) => reply,
			Err(e) => {
				warn!(target: "intake", error = %e, "llm parse unavailable, falling back to heuristics");
				return None;
			}
		};
		match serde_json::from_str::<IntakeDraft>(strip_code_fences(&reply)) {
			Ok(draft) => return Some(draft),
			Err(e) => {
				debug!(target: "intake", strict, error = %e, "llm reply was not valid JSON");
			}
		}
	}
	None
}

/// Days assumed when `strict_required_fields` is off and only the city is known.
const DEFAULT_DAYS: u32 = 3;

/// Runs both strategies and assembles the outcome. With
/// `strict_required_fields` off, a missing day count defaults instead of
/// forcing a clarify round (the city can never be defaulted).
pub async fn run(
	message: &str,
	seed: Option<&IntakeDraft>,
	providers: &ProviderSet,
	config: &Config,
	strict_required_fields: bool,
	deadline: Option<Instant>,
) -> IntakeOutcome {
	let mut state = DraftState::default();

	// Structured constraints from the caller outrank both parse strategies.
	if let Some(seed) = seed {
		state.absorb_draft(seed, "caller constraints");
	}

	if let Some(generator) = providers.generator.as_deref() {
		if let Some(draft) = llm_parse(generator, message, deadline).await {
			state.absorb_draft(&draft, "llm parse");
		}
	}

	let gazetteer: Vec<String> = providers.curated.cities().map(str::to_string).collect();
	heuristic_parse(message, &mut state, &gazetteer, config);

	if !strict_required_fields && state.city.is_some() && state.days.is_none() {
		state.days = Some(DEFAULT_DAYS);
		state.note("days", format!("defaulted to {DEFAULT_DAYS}"));
	}

	let mut missing = Vec::new();
	if state.city.is_none() {
		missing.push(ClarifyField::City);
	}
	if state.days.is_none() {
		missing.push(ClarifyField::Days);
	}
	if state.date_start.is_none() {
		missing.push(ClarifyField::Dates);
	}
	if state.daily_budget.is_none() {
		missing.push(ClarifyField::Budget);
	}
	if state.themes.is_empty() {
		missing.push(ClarifyField::Themes);
	}

	let profile = UserProfile {
		travelers_type: state.travelers_type.unwrap_or_default(),
		themes: state.themes.clone(),
		dietary: state.dietary.clone(),
		mobility_limits: state.mobility_limits.clone(),
	};

	let constraints = match (&state.city, state.days) {
		(Some(city), Some(days)) => {
			let date_end = state.date_end.or_else(|| {
				state
					.date_start
					.and_then(|start| start.checked_add_days(chrono::Days::new(days as u64 - 1)))
			});
			Some(TripConstraints {
				city: city.clone(),
				days,
				date_start: state.date_start,
				date_end,
				daily_budget: state.daily_budget,
				transport_mode: state.transport_mode.unwrap_or_default(),
				pace: state.pace.unwrap_or_default(),
				must_visit: state.must_visit.clone(),
				avoid: state.avoid.clone(),
			})
		}
		_ => None,
	};

	info!(
		target: "intake",
		city = state.city.as_deref().unwrap_or("?"),
		days = state.days.unwrap_or(0),
		missing = missing.len(),
		"intake finished"
	);

	IntakeOutcome {
		constraints,
		profile,
		missing,
		field_evidence: state.evidence,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::providers::ProviderSet;

	fn fixture_providers() -> ProviderSet {
		let config = Config::default();
		ProviderSet::from_config(&config)
	}

	#[tokio::test]
	async fn parses_city_days_budget_themes() {
		let config = Config::default();
		let providers = fixture_providers();
		let out = run(
			"Beijing 4 days, Spring Festival, history+food, budget 600/day",
			None,
			&providers,
			&config,
			true,
			None,
		)
		.await;
		let constraints = out.constraints.expect("constraints");
		assert_eq!(constraints.city, "Beijing");
		assert_eq!(constraints.days, 4);
		assert_eq!(constraints.daily_budget, Some(600.0));
		assert_eq!(constraints.date_start, Some(config.spring_festival_date));
		assert!(out.field_evidence.contains_key("city"));
		let themes = out.profile.themes;
		assert!(themes.contains(&"history".to_string()));
		assert!(themes.contains(&"food".to_string()));
	}

	#[tokio::test]
	async fn vague_message_reports_missing_required() {
		let config = Config::default();
		let providers = fixture_providers();
		let out = run("I want to travel", None, &providers, &config, true, None).await;
		assert!(out.constraints.is_none());
		assert_eq!(out.missing[0], ClarifyField::City);
		assert!(out.missing.contains(&ClarifyField::Days));
	}

	#[tokio::test]
	async fn must_visit_is_extracted() {
		let config = Config::default();
		let providers = fixture_providers();
		let out = run(
			"Chengdu 3 days, must_visit=Panda Base",
			None,
			&providers,
			&config,
			true,
			None,
		)
		.await;
		let constraints = out.constraints.unwrap();
		assert!(constraints.must_visit.contains("Panda Base"));
	}

	#[tokio::test]
	async fn caller_constraints_outrank_parsing() {
		let config = Config::default();
		let providers = fixture_providers();
		let seed = IntakeDraft {
			city: Some("Shanghai".into()),
			days: Some(serde_json::json!(2)),
			..Default::default()
		};
		let out = run("Beijing 4 days", Some(&seed), &providers, &config, true, None).await;
		let constraints = out.constraints.unwrap();
		assert_eq!(constraints.city, "Shanghai");
		assert_eq!(constraints.days, 2);
	}

	#[test]
	fn draft_coercions() {
		assert_eq!(coerce_u32(&serde_json::json!("4")), Some(4));
		assert_eq!(coerce_u32(&serde_json::json!(4)), Some(4));
		assert_eq!(coerce_f64(&serde_json::json!("600.5")), Some(600.5));
	}
}
