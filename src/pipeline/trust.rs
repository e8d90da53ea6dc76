/*
 * src/pipeline/trust.rs
 *
 * Provenance accounting over the facts a plan rests on, the confidence score
 * derived from it, and the run fingerprint emitted with every response.
 * Provenance only ever goes up through the pipeline: a verified fact is never
 * downgraded (the fusion rules in retrieve enforce it; this module reports it).
 */

use tracing::info;

use crate::config::Config;
use crate::models::{
	DegradeLevel, FactSource, Itinerary, PoiArena, RunFingerprint, RunMode,
};
use crate::providers::ProviderSet;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustReport {
	pub verified_fact_ratio: f64,
	pub fallback_rate: f64,
	pub confidence_score: f64,
	pub degrade_level: DegradeLevel,
}

/// Scores the itinerary from the provenance of the facts it schedules.
pub fn assess(
	itinerary: &Itinerary,
	arena: &PoiArena,
	routing_confidence: f64,
	realtime_used: bool,
) -> TrustReport {
	let mut total = 0usize;
	let mut trusted = 0usize;
	let mut fallback = 0usize;

	for poi_id in itinerary.scheduled_poi_ids() {
		let Some(poi) = arena.get(poi_id) else {
			continue;
		};
		for source in poi.fact_sources.values() {
			total += 1;
			if source.is_trusted() {
				trusted += 1;
			}
			if matches!(source, FactSource::Fallback) {
				fallback += 1;
			}
		}
	}

	let denominator = total.max(1) as f64;
	let verified_fact_ratio = trusted as f64 / denominator;
	let fallback_rate = if total == 0 {
		1.0
	} else {
		fallback as f64 / denominator
	};

	let confidence_score = (0.6 * verified_fact_ratio
		+ 0.3 * (1.0 - fallback_rate)
		+ 0.1 * routing_confidence)
		.clamp(0.0, 1.0);

	let degrade_level = if realtime_used && confidence_score >= 0.85 {
		DegradeLevel::L0
	} else if confidence_score >= 0.7 {
		DegradeLevel::L1
	} else if confidence_score >= 0.5 {
		DegradeLevel::L2
	} else {
		DegradeLevel::L3
	};

	info!(
		target: "trust",
		verified_fact_ratio,
		fallback_rate,
		confidence_score,
		degrade_level = ?degrade_level,
		"trust assessment"
	);

	TrustReport {
		verified_fact_ratio,
		fallback_rate,
		confidence_score,
		degrade_level,
	}
}

pub fn fingerprint(
	config: &Config,
	providers: &ProviderSet,
	realtime_used: bool,
	trace_id: &str,
) -> RunFingerprint {
	RunFingerprint {
		run_mode: if realtime_used {
			RunMode::Realtime
		} else {
			RunMode::Degraded
		},
		poi_provider: providers.poi_provider_name(),
		route_provider: providers.route_provider_name(),
		llm_provider: providers.llm_provider_name(),
		strict_external_data: config.strict_external_data,
		env_source: config.env_source.clone(),
		trace_id: trace_id.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::models::{ItineraryDay, Poi, ScheduleItem, TimeSlot};
	use chrono::NaiveTime;

	fn itinerary_with(ids: &[&str]) -> Itinerary {
		Itinerary {
			days: vec![ItineraryDay {
				day_number: 1,
				items: ids
					.iter()
					.map(|id| ScheduleItem {
						poi_id: id.to_string(),
						time_slot: TimeSlot::Morning,
						start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
						end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
						travel_minutes: 0,
						notes: vec![],
						is_backup: false,
					})
					.collect(),
				..Default::default()
			}],
			..Default::default()
		}
	}

	fn arena_of(source: FactSource) -> PoiArena {
		let mut arena = PoiArena::default();
		let mut poi = Poi {
			id: "p".into(),
			name: "P".into(),
			..Default::default()
		};
		poi.tag_all_facts(source);
		arena.insert(poi);
		arena
	}

	#[test]
	fn curated_facts_score_high() {
		let report = assess(&itinerary_with(&["p"]), &arena_of(FactSource::Curated), 0.5, false);
		assert!(report.verified_fact_ratio > 0.99);
		assert_eq!(report.fallback_rate, 0.0);
		// 0.6 + 0.3 + 0.05
		assert!((report.confidence_score - 0.95).abs() < 1e-9);
		// High confidence but no realtime provider: L1, not L0.
		assert_eq!(report.degrade_level, DegradeLevel::L1);
	}

	#[test]
	fn realtime_unlocks_l0() {
		let report = assess(&itinerary_with(&["p"]), &arena_of(FactSource::Curated), 1.0, true);
		assert_eq!(report.degrade_level, DegradeLevel::L0);
	}

	#[test]
	fn fallback_facts_degrade_hard() {
		let report = assess(&itinerary_with(&["p"]), &arena_of(FactSource::Fallback), 0.5, false);
		assert_eq!(report.verified_fact_ratio, 0.0);
		assert_eq!(report.fallback_rate, 1.0);
		assert_eq!(report.degrade_level, DegradeLevel::L3);
	}

	#[test]
	fn empty_plan_has_no_confidence() {
		let report = assess(&itinerary_with(&[]), &PoiArena::default(), 0.5, false);
		assert!(report.confidence_score < 0.5);
		assert_eq!(report.degrade_level, DegradeLevel::L3);
	}
}
